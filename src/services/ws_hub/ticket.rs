//! Single-use WebSocket tickets
//!
//! A ticket binds a short random token to the session principal in the
//! shared store. Redemption is a get-and-delete, so a ticket authenticates
//! exactly one connection. The connection never reads the session from the
//! client again after redemption.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::services::cache::SharedKv;

const TICKET_PREFIX: &str = "wsticket:";

#[derive(Debug, Error)]
pub enum TicketError {
    /// Shared store unreachable. Surfaced as 503 + Retry-After so clients
    /// fall back to HTTP polling instead of retry-storming.
    #[error("ticket store unavailable: {0}")]
    StoreUnavailable(String),
}

pub struct TicketIssuer {
    kv: Arc<dyn SharedKv>,
    ttl_s: u64,
}

impl TicketIssuer {
    pub fn new(kv: Arc<dyn SharedKv>, ttl_s: u64) -> Self {
        Self { kv, ttl_s }
    }

    /// Issue a ticket bound to `session_id`, valid for the configured TTL.
    pub async fn issue(&self, session_id: &str) -> Result<String, TicketError> {
        let ticket = Uuid::new_v4().simple().to_string();
        self.kv
            .set_ex(&format!("{TICKET_PREFIX}{ticket}"), session_id, self.ttl_s)
            .await
            .map_err(|e| TicketError::StoreUnavailable(e.to_string()))?;
        tracing::debug!("ws ticket issued for session {}", session_id);
        Ok(ticket)
    }

    /// Redeem a ticket, returning the bound session. `None` means unknown,
    /// expired, or already redeemed.
    pub async fn redeem(&self, ticket: &str) -> Result<Option<String>, TicketError> {
        self.kv
            .take(&format!("{TICKET_PREFIX}{ticket}"))
            .await
            .map_err(|e| TicketError::StoreUnavailable(e.to_string()))
    }
}
