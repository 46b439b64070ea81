//! WebSocket handlers
//!
//! Ticket issuance over HTTP and the upgraded per-connection loop. The
//! principal comes exclusively from the redeemed ticket; nothing the client
//! sends after connecting can change whose events it sees.

use axum::{
    Json,
    extract::{
        Extension, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::AppState;
use crate::middleware::SessionPrincipal;
use crate::models::{WsClientMessage, WsServerMessage};
use crate::services::ws_hub::{SEARCH_CHANNEL, TicketError};
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub ticket: String,
    pub expires_in_s: u64,
}

/// Issue a single-use WebSocket ticket
/// POST /api/ws-ticket
#[utoipa::path(
    post,
    path = "/api/ws-ticket",
    responses(
        (status = 200, description = "Ticket issued", body = TicketResponse),
        (status = 401, description = "No session"),
        (status = 503, description = "Ticket store unavailable; Retry-After is set")
    ),
    tag = "WebSocket"
)]
pub async fn issue_ticket(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<SessionPrincipal>,
) -> ApiResult<Json<TicketResponse>> {
    let session_id = principal.require()?;
    let ticket = state.tickets.issue(session_id).await.map_err(|e| match e {
        TicketError::StoreUnavailable(msg) => ApiError::TicketStoreUnavailable(msg),
    })?;
    Ok(Json(TicketResponse { ticket, expires_in_s: state.config.ws.ticket_ttl_s }))
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub ticket: String,
}

/// Upgrade a WebSocket connection
/// GET /api/ws?ticket=...
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let session_id = state
        .tickets
        .redeem(&query.ticket)
        .await
        .map_err(|e| match e {
            TicketError::StoreUnavailable(msg) => ApiError::TicketStoreUnavailable(msg),
        })?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired ticket"))?;

    Ok(upgrade.on_upgrade(move |socket| connection_loop(state, socket, session_id)))
}

async fn connection_loop(state: Arc<AppState>, socket: WebSocket, session_id: String) {
    let hub = state.hub.clone();
    let conn_id = hub.allocate_conn_id();
    tracing::debug!("ws connected conn_id={} session={}", conn_id, session_id);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsServerMessage>();

    // Writer task: everything the hub (or the subscribe path) emits goes
    // out through one serialised sender.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("ws serialize failed: {}", e),
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let Ok(frame) = frame else { break };
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<WsClientMessage>(&text) {
            Ok(WsClientMessage::Subscribe { channel, request_id }) => {
                if channel != SEARCH_CHANNEL {
                    let _ = tx.send(WsServerMessage::SubNack {
                        channel,
                        request_id,
                        reason: "unknown channel".to_string(),
                    });
                    continue;
                }

                // Register first, ack second, replay third: nothing
                // published after registration can be missed, and the ack
                // always precedes replayed history.
                let backlog = hub.subscribe(&request_id, &session_id, conn_id, tx.clone());
                let _ = tx.send(WsServerMessage::SubAck {
                    channel,
                    request_id: request_id.clone(),
                    pending: backlog.len(),
                });
                for event in backlog {
                    let _ = tx.send(event);
                }
            }
            Ok(WsClientMessage::Unsubscribe { channel, request_id }) => {
                if channel == SEARCH_CHANNEL {
                    hub.unsubscribe(&request_id, conn_id);
                }
            }
            Err(e) => {
                tracing::debug!("ws message ignored conn_id={}: {}", conn_id, e);
            }
        }
    }

    hub.drop_connection(conn_id);
    writer.abort();
    tracing::debug!("ws disconnected conn_id={}", conn_id);
}
