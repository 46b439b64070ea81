//! API error responder
//!
//! One error type for every handler. Domain errors map onto the stable
//! error-code taxonomy; the HTTP layer renders them as JSON bodies with the
//! code carried verbatim so clients can switch on it.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::models::ErrorCode;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Shared store unreachable while issuing a WS ticket. Served as 503
    /// with a Retry-After so clients back off to HTTP polling.
    #[error("ticket store unavailable: {0}")]
    TicketStoreUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Validation(_) => Some(ErrorCode::ValidationError),
            Self::Unauthorized(_) => Some(ErrorCode::Unauthorized),
            Self::NotFound(_) => None,
            Self::TicketStoreUnavailable(_) => Some(ErrorCode::WsTicketRedisUnavailable),
            Self::Internal(_) => Some(ErrorCode::SearchFailed),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TicketStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.code() {
            Some(code) => json!({ "code": code.as_str(), "message": self.to_string() }),
            None => json!({ "message": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!("API error {}: {}", status, self);
        } else {
            tracing::debug!("API error {}: {}", status, self);
        }

        let mut response = (status, Json(body)).into_response();
        if matches!(self, Self::TicketStoreUnavailable(_)) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("2"));
        }
        response
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_store_error_carries_retry_after() {
        let response = ApiError::TicketStoreUnavailable("redis down".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "2"
        );
    }

    #[test]
    fn ownership_mismatch_renders_plain_not_found() {
        let response = ApiError::not_found("job not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
