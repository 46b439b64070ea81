//! Session principal extraction
//!
//! The authentication front-end proper lives outside this service; what
//! arrives here is a session principal in the `x-session-id` header. The
//! middleware lifts it into request extensions so handlers never read the
//! header themselves. WebSocket connections get their principal from the
//! redeemed ticket instead and never pass through this path.

use axum::{extract::Request, middleware::Next, response::Response};

pub const SESSION_HEADER: &str = "x-session-id";

/// The caller's session, when one was presented.
#[derive(Clone, Debug)]
pub struct SessionPrincipal(pub Option<String>);

impl SessionPrincipal {
    /// The session id, or an unauthorized error for endpoints that need one.
    pub fn require(&self) -> Result<&str, crate::utils::ApiError> {
        self.0
            .as_deref()
            .ok_or_else(|| crate::utils::ApiError::unauthorized("missing session"))
    }
}

pub async fn session_middleware(mut req: Request, next: Next) -> Response {
    let session = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    req.extensions_mut().insert(SessionPrincipal(session));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_missing_session() {
        assert!(SessionPrincipal(None).require().is_err());
        assert_eq!(
            SessionPrincipal(Some("s1".to_string())).require().unwrap(),
            "s1"
        );
    }
}
