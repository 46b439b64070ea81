//! Search API handlers
//!
//! Accepts asynchronous search requests and serves their results. A
//! terminal job always answers with HTTP 200 and a complete body, failed or
//! not; polling clients never have to parse a transport error.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::middleware::SessionPrincipal;
use crate::models::{PendingMeta, PendingResponse, SearchAccepted, SearchRequest};
use crate::services::search::response::result_missing;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct SearchMode {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Pagination of a stored result is a read-time slice; it never affects
/// which job a request deduplicates onto.
#[derive(Debug, Deserialize)]
pub struct ResultSlice {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Accept a search request
/// POST /api/search?mode=async
#[utoipa::path(
    post,
    path = "/api/search",
    params(("mode" = Option<String>, Query, description = "Must be 'async'")),
    request_body = SearchRequest,
    responses(
        (status = 202, description = "Search accepted", body = SearchAccepted),
        (status = 400, description = "Invalid request")
    ),
    tag = "Search"
)]
pub async fn accept_search(
    State(state): State<Arc<AppState>>,
    Query(mode): Query<SearchMode>,
    Extension(principal): Extension<SessionPrincipal>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Response> {
    if mode.mode.as_deref() != Some("async") {
        return Err(ApiError::validation("only mode=async is supported"));
    }
    request.validate()?;

    // When an authenticated principal is present it must match the body's
    // session; silently trusting the body would let one session poll
    // another's jobs.
    if let Some(session) = principal.0.as_deref() {
        if session != request.session_id {
            return Err(ApiError::unauthorized("session mismatch"));
        }
    }

    let accepted = state
        .orchestrator
        .accept(request)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::info!(
        "search_accepted request_id={} status={}",
        accepted.request_id,
        accepted.status.as_str()
    );
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

/// Poll a search result
/// GET /api/search/:request_id/result
#[utoipa::path(
    get,
    path = "/api/search/{request_id}/result",
    params(
        ("request_id" = String, Path, description = "Request id from the accept response"),
        ("limit" = Option<usize>, Query, description = "Result page size"),
        ("offset" = Option<usize>, Query, description = "Result page offset")
    ),
    responses(
        (status = 200, description = "Terminal result (success or stable failure shape)"),
        (status = 202, description = "Still running", body = PendingResponse),
        (status = 404, description = "Unknown request id")
    ),
    tag = "Search"
)]
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Query(slice): Query<ResultSlice>,
    Extension(principal): Extension<SessionPrincipal>,
) -> ApiResult<Response> {
    let session_id = principal.require()?;

    // Ownership mismatches read as absent on purpose.
    let job = state
        .store
        .get(&request_id, session_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("job not found"))?;

    if !job.is_terminal() {
        let now = Utc::now();
        let updated_age_ms = job.updated_age_ms(now);
        let is_stale = updated_age_ms > state.config.store.max_running_job_age_ms;
        let body = PendingResponse {
            request_id: job.request_id.clone(),
            status: job.status,
            progress: job.progress,
            meta: Some(PendingMeta {
                is_stale,
                age_ms: job.age_ms(now),
                updated_age_ms,
                message: if is_stale {
                    "job heartbeat is overdue; keep polling or resubmit".to_string()
                } else {
                    "search in progress".to_string()
                },
            }),
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    // Terminal jobs carry their full payload (success or stable failure
    // shape) in the result slot; both are served as HTTP 200.
    if let Some(result) = &job.result {
        return Ok((StatusCode::OK, Json(paginate(result.clone(), &slice))).into_response());
    }

    // The result write was lost; answer with safe defaults.
    Ok((StatusCode::OK, Json(result_missing(&job))).into_response())
}

/// Slice the stored `results` array in place; every other field of the
/// persisted response is returned untouched.
fn paginate(mut result: serde_json::Value, slice: &ResultSlice) -> serde_json::Value {
    if slice.limit.is_none() && slice.offset.is_none() {
        return result;
    }
    if let Some(results) = result.get_mut("results").and_then(|r| r.as_array_mut()) {
        let offset = slice.offset.unwrap_or(0).min(results.len());
        let limit = slice.limit.unwrap_or(results.len() - offset);
        *results = results.iter().skip(offset).take(limit).cloned().collect();
    }
    result
}
