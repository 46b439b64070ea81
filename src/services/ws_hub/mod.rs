//! WebSocket hub
//!
//! Owns the per-request subscription maps and backlog queues. Subscriptions
//! are channel-scoped (`search` channel, keyed by request id) and isolated
//! per session: an event published for `(request_id, session)` is delivered
//! only to subscribers holding that session. A bounded backlog per request
//! is replayed, in publish order, to subscribers that attach after early
//! events fired. Publishing never blocks and never fails the pipeline.

mod ticket;

pub use ticket::{TicketError, TicketIssuer};

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::models::WsServerMessage;
use crate::services::job_store::staleness::SubscriberProbe;

pub const SEARCH_CHANNEL: &str = "search";

/// One attached client connection.
struct Subscriber {
    conn_id: u64,
    session_id: String,
    sender: mpsc::UnboundedSender<WsServerMessage>,
}

/// A backlog event remembers the session it was published for, so replay
/// never leaks events across sessions.
struct BacklogEntry {
    session_id: String,
    message: WsServerMessage,
}

pub struct WsHub {
    subscriptions: DashMap<String, Vec<Subscriber>>,
    backlog: DashMap<String, Mutex<VecDeque<BacklogEntry>>>,
    backlog_max: usize,
    next_conn_id: AtomicU64,
}

impl WsHub {
    pub fn new(backlog_max: usize) -> Self {
        Self {
            subscriptions: DashMap::new(),
            backlog: DashMap::new(),
            backlog_max,
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a subscription and return the backlog events to replay.
    /// The caller must send the ack before the replayed events; both happen
    /// after registration, so no published event can fall in between.
    /// Re-subscribing the same connection is idempotent.
    pub fn subscribe(
        &self,
        request_id: &str,
        session_id: &str,
        conn_id: u64,
        sender: mpsc::UnboundedSender<WsServerMessage>,
    ) -> Vec<WsServerMessage> {
        let mut subs = self.subscriptions.entry(request_id.to_string()).or_default();
        let already = subs.iter().any(|s| s.conn_id == conn_id);
        if !already {
            subs.push(Subscriber {
                conn_id,
                session_id: session_id.to_string(),
                sender,
            });
        }
        drop(subs);

        self.backlog
            .get(request_id)
            .map(|entry| {
                let queue = entry.lock().expect("backlog mutex poisoned");
                queue
                    .iter()
                    .filter(|e| e.session_id == session_id)
                    .map(|e| e.message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn unsubscribe(&self, request_id: &str, conn_id: u64) {
        if let Some(mut subs) = self.subscriptions.get_mut(request_id) {
            subs.retain(|s| s.conn_id != conn_id);
        }
    }

    /// Drop every subscription held by a closing connection.
    pub fn drop_connection(&self, conn_id: u64) {
        for mut entry in self.subscriptions.iter_mut() {
            entry.value_mut().retain(|s| s.conn_id != conn_id);
        }
    }

    /// Publish an event for `(request_id, session_id)`. Errors are logged
    /// and swallowed; the pipeline never observes them.
    pub fn publish(&self, request_id: &str, session_id: &str, message: WsServerMessage) {
        // Backlog first, so a subscriber attaching mid-publish replays it.
        {
            let entry = self
                .backlog
                .entry(request_id.to_string())
                .or_insert_with(|| Mutex::new(VecDeque::new()));
            let mut queue = entry.lock().expect("backlog mutex poisoned");
            if queue.len() >= self.backlog_max {
                queue.pop_front();
            }
            queue.push_back(BacklogEntry {
                session_id: session_id.to_string(),
                message: message.clone(),
            });
        }

        let Some(subs) = self.subscriptions.get(request_id) else {
            return;
        };
        for sub in subs.iter().filter(|s| s.session_id == session_id) {
            if let Err(e) = sub.sender.send(message.clone()) {
                tracing::debug!(
                    "ws_publish_dropped request_id={} conn_id={}: {}",
                    request_id,
                    sub.conn_id,
                    e
                );
            }
        }
    }

    /// Forget a finished request's backlog and subscriptions. Called when a
    /// job's retention lapses; live subscribers are dropped.
    pub fn forget_request(&self, request_id: &str) {
        self.subscriptions.remove(request_id);
        self.backlog.remove(request_id);
    }

    pub fn has_active_subscribers(&self, request_id: &str, session_id: &str) -> bool {
        self.subscriptions
            .get(request_id)
            .map(|subs| {
                subs.iter()
                    .any(|s| s.session_id == session_id && !s.sender.is_closed())
            })
            .unwrap_or(false)
    }
}

impl SubscriberProbe for WsHub {
    fn has_active_subscribers(&self, request_id: &str, session_id: &str) -> bool {
        WsHub::has_active_subscribers(self, request_id, session_id)
    }
}
