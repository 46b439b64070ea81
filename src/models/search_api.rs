//! HTTP and WebSocket wire types
//!
//! Everything a client sends or receives lives here. Response shapes are
//! total: a terminally failed job still renders every field, and polling
//! clients never have to parse an exception.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::job::{ErrorCode, JobStatus};
use super::language::{Language, LanguageContext};
use super::mapping::{RankingProfile, RankingWeights};
use super::place::{LatLng, Place};

/// Version tag clients use to detect contract changes.
pub const CONTRACTS_VERSION: &str = "search_contracts_v1";

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[validate(range(min = 1, max = 50))]
    pub limit: usize,
    #[validate(range(min = 0, max = 500))]
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: 20, offset: 0 }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Free-form natural-language query.
    #[validate(length(min = 1, max = 500))]
    pub query: String,
    /// Client display preference. The server owns provider-language policy;
    /// this field never reaches the places API.
    #[serde(default)]
    pub ui_language: Option<Language>,
    #[serde(default)]
    pub user_location: Option<LatLng>,
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[serde(default)]
    #[validate(nested)]
    pub pagination: Option<Pagination>,
    /// Client-pinned soft filters. Merged over the extracted ones and part
    /// of the dedup identity, unlike pagination.
    #[serde(default)]
    pub filters: Option<super::filters::SoftFilters>,
}

// ============================================================================
// Accept / poll responses
// ============================================================================

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchAccepted {
    pub request_id: String,
    pub result_url: String,
    pub status: JobStatus,
}

/// 202 body returned while a job is still running.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingResponse {
    pub request_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PendingMeta>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingMeta {
    pub is_stale: bool,
    pub age_ms: i64,
    pub updated_age_ms: i64,
    pub message: String,
}

// ============================================================================
// Terminal success response
// ============================================================================

/// One weighted component of a place's score: the normalised input times its
/// weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub place_id: String,
    pub rating_component: f64,
    pub reviews_component: f64,
    pub distance_component: f64,
    pub open_component: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_now: Option<bool>,
}

/// How the final ordering was produced. Carried in `meta.order_explain`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderExplain {
    pub profile: RankingProfile,
    pub weights: RankingWeights,
    pub distance_origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_ref: Option<LatLng>,
    pub reordered: bool,
    pub top_breakdown: Vec<ScoreBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankedPlace {
    #[serde(flatten)]
    pub place: Place,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub took_ms: i64,
    pub source: String,
    pub language_context: LanguageContext,
    pub order_explain: OrderExplain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine_enforcement_failed: Option<bool>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub request_id: String,
    pub status: JobStatus,
    pub results: Vec<RankedPlace>,
    pub meta: ResponseMeta,
}

// ============================================================================
// Terminal failure response
// ============================================================================

/// Stable failure body. Served with HTTP 200 so polling clients always read
/// a shape, never a transport error. `terminal: true` tells them to stop.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedResponse {
    pub request_id: String,
    pub status: JobStatus,
    pub code: ErrorCode,
    pub message: String,
    pub error_type: String,
    pub terminal: bool,
    pub contracts_version: String,
}

impl FailedResponse {
    pub fn new(request_id: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: JobStatus::DoneFailed,
            code,
            message: message.into(),
            error_type: code.as_str().to_lowercase(),
            terminal: true,
            contracts_version: CONTRACTS_VERSION.to_string(),
        }
    }
}

// ============================================================================
// WebSocket protocol
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Subscribe { channel: String, request_id: String },
    Unsubscribe { channel: String, request_id: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssistantContext {
    GateFail,
    Clarify,
    Summary,
    SearchFailed,
    GenericQueryNarration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssistantPayload {
    #[serde(rename = "type")]
    pub context: AssistantContext,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub blocks_search: bool,
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    SubAck {
        channel: String,
        request_id: String,
        /// Number of backlog events replayed right after this ack.
        pending: usize,
    },
    SubNack {
        channel: String,
        request_id: String,
        reason: String,
    },
    StatusRunning {
        request_id: String,
        progress: u8,
    },
    StatusTerminal {
        request_id: String,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
    },
    Assistant {
        request_id: String,
        payload: AssistantPayload,
    },
}

impl WsServerMessage {
    pub fn request_id(&self) -> &str {
        match self {
            Self::SubAck { request_id, .. }
            | Self::SubNack { request_id, .. }
            | Self::StatusRunning { request_id, .. }
            | Self::StatusTerminal { request_id, .. }
            | Self::Assistant { request_id, .. } => request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_response_is_total() {
        let body = FailedResponse::new("r1", ErrorCode::ResultMissing, "result slot empty");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "DONE_FAILED");
        assert_eq!(json["code"], "RESULT_MISSING");
        assert_eq!(json["terminal"], true);
        assert_eq!(json["contractsVersion"], CONTRACTS_VERSION);
    }

    #[test]
    fn ws_subscribe_round_trip() {
        let raw = r#"{"type":"subscribe","channel":"search","request_id":"abc"}"#;
        let msg: WsClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            WsClientMessage::Subscribe { channel, request_id } => {
                assert_eq!(channel, "search");
                assert_eq!(request_id, "abc");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn request_validation_bounds() {
        let req = SearchRequest {
            query: String::new(),
            ui_language: None,
            user_location: None,
            session_id: "s".into(),
            pagination: None,
            filters: None,
        };
        assert!(req.validate().is_err());

        let req = SearchRequest {
            query: "pizza".into(),
            ui_language: Some(Language::He),
            user_location: None,
            session_id: "s".into(),
            pagination: Some(Pagination { limit: 10, offset: 0 }),
            filters: None,
        };
        assert!(req.validate().is_ok());
    }
}
