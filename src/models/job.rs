//! Job lifecycle records
//!
//! A job is the unit of work behind one accepted search request. Jobs move
//! QUEUED -> RUNNING -> {DONE_SUCCESS | DONE_FAILED} and never backwards;
//! terminal jobs are immutable apart from store-TTL expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::filters::SoftFilters;
use super::mapping::Route;
use super::place::{LatLng, Place};
use crate::utils::hash::sha256_hex;

// ============================================================================
// Status and error codes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    DoneSuccess,
    DoneFailed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DoneSuccess | Self::DoneFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::DoneSuccess => "DONE_SUCCESS",
            Self::DoneFailed => "DONE_FAILED",
        }
    }
}

/// Stable error codes carried verbatim in HTTP and WS payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    GateFail,
    MapperFailed,
    ProviderFailed,
    SearchFailed,
    StaleRunning,
    ResultMissing,
    WsTicketRedisUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::GateFail => "GATE_FAIL",
            Self::MapperFailed => "MAPPER_FAILED",
            Self::ProviderFailed => "PROVIDER_FAILED",
            Self::SearchFailed => "SEARCH_FAILED",
            Self::StaleRunning => "STALE_RUNNING",
            Self::ResultMissing => "RESULT_MISSING",
            Self::WsTicketRedisUnavailable => "WS_TICKET_REDIS_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error slot of a failed job. `route` is recorded when known so failures
/// can be broken down per route in log pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub kind: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

// ============================================================================
// Search context
// ============================================================================

/// The anchor a search was resolved around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Anchor {
    City {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        center: Option<LatLng>,
    },
    User {
        location: LatLng,
    },
    None,
}

impl Anchor {
    pub fn city_text(&self) -> Option<&str> {
        match self {
            Self::City { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn user_location(&self) -> Option<LatLng> {
        match self {
            Self::User { location } => Some(*location),
            _ => None,
        }
    }
}

/// Immutable snapshot of what the provider was asked, attached to a
/// candidate pool so a later request can decide whether the pool is
/// reusable. Hard fields (query, route, anchor, radius) force a provider
/// call when they change materially; soft fields are served from the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    pub query_text: String,
    pub route: Route,
    pub anchor: Anchor,
    pub region_code: String,
    pub radius_meters: f64,
    pub soft_filters: SoftFilters,
}

impl SearchContext {
    pub fn soft_signature(&self) -> String {
        self.soft_filters.signature()
    }
}

// ============================================================================
// Candidate pool
// ============================================================================

/// Raw provider results retained with the context they were fetched under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePool {
    pub context: SearchContext,
    pub places: Vec<Place>,
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// Job
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub request_id: String,
    pub session_id: String,
    pub status: JobStatus,
    /// 0..=100, monotone non-decreasing over the job's lifetime.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    /// Heartbeat timestamp; bumped on every status/progress write.
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_pool: Option<CandidatePool>,
}

impl Job {
    pub fn new(request_id: String, session_id: String, idempotency_key: String) -> Self {
        let now = Utc::now();
        Self {
            request_id,
            session_id,
            status: JobStatus::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            idempotency_key,
            candidate_pool: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }

    pub fn updated_age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_milliseconds()
    }
}

// ============================================================================
// Idempotency key
// ============================================================================

/// Dedup key for a search request. Pagination is deliberately excluded:
/// paging slices the stored ranked result of the same job.
pub fn idempotency_key(
    session_id: &str,
    normalized_query: &str,
    mode: &str,
    user_location: Option<LatLng>,
    soft_signature: &str,
) -> String {
    let location_bucket =
        user_location.map(|l| l.bucket_key()).unwrap_or_else(|| "-".to_string());
    sha256_hex(&format!(
        "{session_id}\u{1f}{normalized_query}\u{1f}{mode}\u{1f}{location_bucket}\u{1f}{soft_signature}"
    ))
}
