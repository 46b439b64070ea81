//! Stale-job sweeper
//!
//! The only mechanism that terminates a job without its worker's
//! cooperation. A RUNNING job is stale iff its heartbeat AND its creation
//! are both older than the threshold AND nobody is watching it over the
//! WebSocket hub. The per-store `mark_stale` keeps the transition
//! at-most-once under concurrent sweepers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use super::JobStore;
use crate::utils::PeriodicTask;

/// Subscriber presence probe, implemented by the WebSocket hub. A separate
/// trait keeps the sweeper testable without a live hub.
pub trait SubscriberProbe: Send + Sync {
    fn has_active_subscribers(&self, request_id: &str, session_id: &str) -> bool;
}

pub struct StaleSweeper {
    store: Arc<dyn JobStore>,
    probe: Arc<dyn SubscriberProbe>,
    max_age_ms: i64,
}

impl StaleSweeper {
    pub fn new(store: Arc<dyn JobStore>, probe: Arc<dyn SubscriberProbe>, max_age_ms: i64) -> Self {
        Self { store, probe, max_age_ms }
    }

    pub async fn sweep(&self) -> Result<usize, anyhow::Error> {
        let now = Utc::now();
        let running = self.store.list_running().await?;
        let mut marked = 0;

        for job in running {
            let updated_age_ms = job.updated_age_ms(now);
            let age_ms = job.age_ms(now);
            if updated_age_ms <= self.max_age_ms || age_ms <= self.max_age_ms {
                continue;
            }

            if self.probe.has_active_subscribers(&job.request_id, &job.session_id) {
                tracing::info!(
                    "dedup_kept_alive_by_subscribers request_id={} updated_age_ms={}",
                    job.request_id,
                    updated_age_ms
                );
                continue;
            }

            match self.store.mark_stale(&job.request_id).await {
                Ok(true) => {
                    marked += 1;
                    tracing::warn!(
                        "stale_job_marked request_id={} age_ms={} updated_age_ms={}",
                        job.request_id,
                        age_ms,
                        updated_age_ms
                    );
                }
                Ok(false) => {
                    // Lost the race to a completion or another sweeper.
                }
                Err(e) => {
                    tracing::warn!(
                        "stale_mark_failed request_id={}: {}",
                        job.request_id,
                        e
                    );
                }
            }
        }

        Ok(marked)
    }
}

impl PeriodicTask for StaleSweeper {
    fn tick(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            let marked = self.sweep().await?;
            if marked > 0 {
                tracing::info!("stale sweep marked {} job(s)", marked);
            }
            Ok(())
        })
    }
}
