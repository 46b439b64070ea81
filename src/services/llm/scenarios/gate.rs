//! Gate scenario
//!
//! Decides whether a query is plausibly a food search before the rest of
//! the pipeline spends anything on it. Fails open: a timeout or API error
//! yields MAYBE and the pipeline proceeds.

use serde::{Deserialize, Serialize};

use crate::services::llm::models::{LlmScenario, LlmScenarioRequest};

const SYSTEM_PROMPT: &str = r#"You classify whether a user query is a request to find food venues (restaurants, cafes, bars, street food, delivery).

Respond with a single JSON object:
{"is_food_search": bool, "reason": "<short explanation>", "food_signal": "YES" | "NO" | "MAYBE"}

Rules:
- "YES" when the query clearly asks for places to eat or drink, in any language.
- "NO" when the query is clearly about something else (weather, directions, shopping, chit-chat).
- "MAYBE" when it could plausibly be about food but is ambiguous.
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct GateRequest {
    pub query: String,
}

impl LlmScenarioRequest for GateRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::Gate
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FoodSignal {
    Yes,
    No,
    Maybe,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateResponse {
    pub is_food_search: bool,
    #[serde(default)]
    pub reason: String,
    pub food_signal: FoodSignal,
}

/// The gate's effect on the pipeline.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub food_signal: FoodSignal,
    pub reason: String,
    /// True when the LLM did not answer and the gate failed open.
    pub failed_open: bool,
}

impl GateDecision {
    pub fn from_response(response: GateResponse) -> Self {
        // `is_food_search` and the signal can disagree in sloppy model
        // output; the signal is authoritative, a bare false downgrades
        // YES to MAYBE.
        let food_signal = match (response.food_signal, response.is_food_search) {
            (FoodSignal::Yes, false) => FoodSignal::Maybe,
            (signal, _) => signal,
        };
        Self { food_signal, reason: response.reason, failed_open: false }
    }

    pub fn failed_open() -> Self {
        Self {
            food_signal: FoodSignal::Maybe,
            reason: "gate unavailable".to_string(),
            failed_open: true,
        }
    }

    pub fn blocks_pipeline(&self) -> bool {
        self.food_signal == FoodSignal::No
    }
}
