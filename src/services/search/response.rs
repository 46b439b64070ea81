//! Response assembly
//!
//! Builds the terminal HTTP payloads. The shapes are total: a failed job
//! with an empty result slot still renders every field, and clients never
//! see a transport-level error for a terminal job.

use crate::models::{
    ErrorCode, FailedResponse, Job, JobStatus, LanguageContext, OrderExplain, RankedPlace,
    ResponseMeta, SearchResponse,
};

/// Assemble the success payload persisted into the job's result slot.
#[allow(clippy::too_many_arguments)]
pub fn build_success(
    request_id: &str,
    results: Vec<RankedPlace>,
    language_context: LanguageContext,
    order_explain: OrderExplain,
    took_ms: i64,
    cuisine_enforcement_failed: bool,
) -> SearchResponse {
    let total_results = results.len();
    SearchResponse {
        request_id: request_id.to_string(),
        status: JobStatus::DoneSuccess,
        results,
        meta: ResponseMeta {
            took_ms,
            source: "route2".to_string(),
            language_context,
            order_explain,
            cuisine_enforcement_failed: cuisine_enforcement_failed.then_some(true),
            total_results,
        },
    }
}

/// Assemble the failure payload persisted into a failing job's result slot.
pub fn build_failure(request_id: &str, code: ErrorCode, message: &str) -> FailedResponse {
    FailedResponse::new(request_id, code, message)
}

/// Safe-default body for a terminal job whose result slot is empty. The
/// slot normally carries the success or failure payload; its absence means
/// a result write was lost, which is reported as RESULT_MISSING rather
/// than whatever the pipeline recorded.
pub fn result_missing(job: &Job) -> FailedResponse {
    let message = match &job.error {
        Some(error) => format!(
            "job is terminal but no result was stored (last error: {})",
            error.kind
        ),
        None => "job is terminal but no result was stored".to_string(),
    };
    FailedResponse::new(&job.request_id, ErrorCode::ResultMissing, message)
}
