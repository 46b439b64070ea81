//! LLM service types
//!
//! Scenario identifiers, the request trait every scenario implements, the
//! error taxonomy, and lightweight usage accounting.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Scenarios
// ============================================================================

/// One LLM call site in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmScenario {
    Gate,
    Intent,
    PostConstraints,
    BaseFilters,
    RouteMapper,
    QueryRewrite,
    CuisineEnforcer,
    Assistant,
}

impl LlmScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gate => "gate",
            Self::Intent => "intent",
            Self::PostConstraints => "post_constraints",
            Self::BaseFilters => "base_filters",
            Self::RouteMapper => "route_mapper",
            Self::QueryRewrite => "query_rewrite",
            Self::CuisineEnforcer => "cuisine_enforcer",
            Self::Assistant => "assistant",
        }
    }
}

/// Implemented by each scenario's request type. The request body is
/// serialised as the user prompt; the system prompt carries the schema the
/// model must answer with.
pub trait LlmScenarioRequest: Serialize + Send + Sync {
    fn scenario(&self) -> LlmScenario;

    fn system_prompt(&self) -> String;
}

/// Transport seam under the scenario runner. Production is the
/// chat-completions HTTP client; tests script canned JSON per scenario.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn complete(
        &self,
        scenario: LlmScenario,
        system_prompt: &str,
        user_prompt: &str,
        timeout_ms: u64,
    ) -> Result<(String, i32, i32), LlmError>;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM call timed out after {0}ms")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parse error: {0}")]
    ParseError(String),

    #[error("LLM request serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("LLM is not configured")]
    NotConfigured,
}

impl LlmError {
    /// Timeouts and rate limits are transient; everything else would fail
    /// the same way again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_))
    }
}

// ============================================================================
// Usage accounting
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct ScenarioUsage {
    pub calls: u64,
    pub failures: u64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_latency_ms: u64,
}

/// In-process token and latency counters per scenario. Surfaced in logs;
/// nothing here is persisted.
#[derive(Default)]
pub struct LlmUsageStats {
    inner: Mutex<std::collections::HashMap<LlmScenario, ScenarioUsage>>,
}

impl LlmUsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        scenario: LlmScenario,
        outcome: &Result<(i32, i32), &LlmError>,
        latency: Duration,
    ) {
        let mut inner = self.inner.lock().expect("usage mutex poisoned");
        let usage = inner.entry(scenario).or_default();
        usage.calls += 1;
        usage.total_latency_ms += latency.as_millis() as u64;
        match outcome {
            Ok((input, output)) => {
                usage.input_tokens += *input as i64;
                usage.output_tokens += *output as i64;
            }
            Err(_) => usage.failures += 1,
        }
    }

    pub fn snapshot(&self, scenario: LlmScenario) -> ScenarioUsage {
        self.inner
            .lock()
            .expect("usage mutex poisoned")
            .get(&scenario)
            .copied()
            .unwrap_or_default()
    }
}
