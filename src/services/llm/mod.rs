//! LLM service module
//!
//! One HTTP client, one scenario-request trait, and a runner that owns
//! per-stage timeouts, usage accounting, and the single-retry policy for
//! the stages that are allowed one. Scenario modules define the prompts and
//! wire shapes; stage semantics (fallbacks, skips) live with the pipeline.

mod client;
mod models;
pub mod scenarios;

pub use client::LlmClient;
pub use models::{
    ChatBackend, LlmError, LlmScenario, LlmScenarioRequest, LlmUsageStats, ScenarioUsage,
};

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{LlmConfig, LlmTimeouts};
use crate::utils::retry::{RetryClass, retry_once};

pub struct ScenarioRunner {
    backend: Arc<dyn ChatBackend>,
    timeouts: LlmTimeouts,
    stats: LlmUsageStats,
}

impl ScenarioRunner {
    pub fn new(config: LlmConfig) -> Self {
        let timeouts = config.timeouts.clone();
        Self::with_backend(Arc::new(LlmClient::new(config)), timeouts)
    }

    /// Custom transport, used by tests to script model output.
    pub fn with_backend(backend: Arc<dyn ChatBackend>, timeouts: LlmTimeouts) -> Self {
        Self { backend, timeouts, stats: LlmUsageStats::new() }
    }

    pub fn timeouts(&self) -> &LlmTimeouts {
        &self.timeouts
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn usage(&self, scenario: LlmScenario) -> ScenarioUsage {
        self.stats.snapshot(scenario)
    }

    /// One call, no retry. The per-stage timeout is the only budget.
    pub async fn call<Req, Resp>(&self, request: &Req, timeout_ms: u64) -> Result<Resp, LlmError>
    where
        Req: LlmScenarioRequest,
        Resp: DeserializeOwned,
    {
        let started = Instant::now();
        let result = self.call_inner::<Req, Resp>(request, timeout_ms).await;
        match result {
            Ok((response, input_tokens, output_tokens)) => {
                self.stats.record(
                    request.scenario(),
                    &Ok((input_tokens, output_tokens)),
                    started.elapsed(),
                );
                Ok(response)
            }
            Err(e) => {
                self.stats.record(request.scenario(), &Err(&e), started.elapsed());
                Err(e)
            }
        }
    }

    async fn call_inner<Req, Resp>(
        &self,
        request: &Req,
        timeout_ms: u64,
    ) -> Result<(Resp, i32, i32), LlmError>
    where
        Req: LlmScenarioRequest,
        Resp: DeserializeOwned,
    {
        let user_prompt =
            serde_json::to_string_pretty(request).map_err(LlmError::SerializationError)?;
        let (content, input_tokens, output_tokens) = self
            .backend
            .complete(request.scenario(), &request.system_prompt(), &user_prompt, timeout_ms)
            .await?;
        let response: Resp = serde_json::from_str(&content).map_err(|e| {
            LlmError::ParseError(format!(
                "Failed to parse LLM response: {}. Content: {}",
                e, content
            ))
        })?;
        Ok((response, input_tokens, output_tokens))
    }

    /// One call plus exactly one jittered retry on transient failure. Only
    /// the gate and intent stages use this.
    pub async fn call_with_retry<Req, Resp>(
        &self,
        request: &Req,
        timeout_ms: u64,
    ) -> Result<Resp, LlmError>
    where
        Req: LlmScenarioRequest,
        Resp: DeserializeOwned,
    {
        let scenario = request.scenario().as_str();
        retry_once(
            scenario,
            |e: &LlmError| {
                if e.is_retriable() { RetryClass::Retriable } else { RetryClass::NonRetriable }
            },
            || self.call(request, timeout_ms),
        )
        .await
    }
}
