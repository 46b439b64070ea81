//! Assistant stage
//!
//! Runs after the HTTP result is already persisted, so nothing here can
//! delay or fail a search. The model gets one attempt inside a hard
//! timeout; invalid or late output degrades to the deterministic template
//! in the required language.

use std::sync::Arc;

use crate::models::{AssistantContext, AssistantPayload, Language};
use crate::services::llm::ScenarioRunner;
use crate::services::llm::scenarios::assistant::{
    AssistantRequest, AssistantResponse, fallback, validate,
};

pub struct AssistantStage {
    llm: Arc<ScenarioRunner>,
}

impl AssistantStage {
    pub fn new(llm: Arc<ScenarioRunner>) -> Self {
        Self { llm }
    }

    /// Always returns a payload; the fallback template is the floor.
    pub async fn generate(
        &self,
        context: AssistantContext,
        language: Language,
        query: &str,
        result_count: Option<usize>,
        top_names: Vec<String>,
    ) -> AssistantPayload {
        let request = AssistantRequest {
            context,
            language,
            query: query.to_string(),
            result_count,
            top_names,
        };

        let response: Result<AssistantResponse, _> =
            self.llm.call(&request, self.llm.timeouts().assistant_ms).await;

        match response {
            Ok(response) => match validate(response, context, language) {
                Ok(payload) => payload,
                Err(reason) => {
                    tracing::debug!("assistant output rejected ({}), using template", reason);
                    fallback(context, language)
                }
            },
            Err(e) => {
                tracing::debug!("assistant generation failed ({}), using template", e);
                fallback(context, language)
            }
        }
    }
}
