//! Job store
//!
//! Single source of truth for job lifecycle. Two implementations honour one
//! contract: [`MemoryJobStore`] for dev and [`KvJobStore`] over the shared
//! Redis store for production.
//!
//! Contract highlights:
//! - Status transitions are one-way; writes against a terminal job return
//!   [`StoreError::AlreadyTerminal`] instead of mutating it.
//! - Progress is monotone: a lower value than the stored one is ignored.
//! - Reads that return job content require the caller's session to match
//!   the job's; a mismatch reads as absent, not as forbidden.
//! - `update_heartbeat` bumps `updated_at` only and is a no-op on terminal
//!   jobs.
//! - `mark_stale` is at-most-once under concurrent sweepers.

mod memory;
mod redis_store;
pub mod staleness;

pub use memory::MemoryJobStore;
pub use redis_store::KvJobStore;
pub use staleness::StaleSweeper;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CandidatePool, ErrorCode, Job, JobStatus, Route};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already exists: {0}")]
    AlreadyExists(String),

    #[error("job is terminal: {0}")]
    AlreadyTerminal(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> Result<(), StoreError>;

    /// Transition status and optionally raise progress. Also bumps
    /// `updated_at`, so a status write counts as a heartbeat.
    async fn set_status(
        &self,
        request_id: &str,
        status: JobStatus,
        progress: Option<u8>,
    ) -> Result<Job, StoreError>;

    async fn set_result(
        &self,
        request_id: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn set_error(
        &self,
        request_id: &str,
        kind: ErrorCode,
        message: &str,
        route: Option<Route>,
    ) -> Result<(), StoreError>;

    async fn update_heartbeat(&self, request_id: &str) -> Result<(), StoreError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError>;

    async fn set_candidate_pool(
        &self,
        request_id: &str,
        pool: CandidatePool,
    ) -> Result<(), StoreError>;

    /// Session-checked candidate pool read.
    async fn get_candidate_pool(
        &self,
        request_id: &str,
        session_id: &str,
    ) -> Result<Option<CandidatePool>, StoreError>;

    /// The session's most recently fetched candidate pool, across jobs.
    /// This is what lets a soft-filter-only follow-up request reuse the
    /// pool its predecessor fetched.
    async fn latest_session_pool(
        &self,
        session_id: &str,
    ) -> Result<Option<CandidatePool>, StoreError>;

    /// Session-checked job read. Ownership mismatch reads as `None`.
    async fn get(&self, request_id: &str, session_id: &str) -> Result<Option<Job>, StoreError>;

    /// All currently RUNNING jobs. Sweeper-only; not a hot path.
    async fn list_running(&self) -> Result<Vec<Job>, StoreError>;

    /// Transition a RUNNING job to DONE_FAILED(STALE_RUNNING). Returns true
    /// iff this call performed the transition. The job is re-read inside
    /// the write path so a completion that raced us wins.
    async fn mark_stale(&self, request_id: &str) -> Result<bool, StoreError>;
}

/// Transition guard shared by both implementations.
pub(crate) fn check_transition(current: JobStatus, next: JobStatus) -> Result<(), StoreError> {
    use JobStatus::*;
    let ok = matches!(
        (current, next),
        (Queued, Running)
            | (Queued, DoneFailed)
            | (Running, Running)
            | (Running, DoneSuccess)
            | (Running, DoneFailed)
    );
    if ok { Ok(()) } else { Err(StoreError::AlreadyTerminal(format!("{current:?} -> {next:?}"))) }
}

#[cfg(test)]
mod contract_tests {
    //! The same assertions run against both store implementations.

    use super::*;
    use crate::models::idempotency_key;
    use crate::services::cache::MemoryKv;
    use std::sync::Arc;

    fn job(request_id: &str, session_id: &str) -> Job {
        let key = idempotency_key(session_id, "pizza", "async", None, "-");
        Job::new(request_id.to_string(), session_id.to_string(), key)
    }

    async fn stores() -> Vec<Arc<dyn JobStore>> {
        vec![
            Arc::new(MemoryJobStore::new()),
            Arc::new(KvJobStore::new(Arc::new(MemoryKv::new()), 3600)),
        ]
    }

    #[tokio::test]
    async fn create_get_and_ownership() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();

            let found = store.get("r1", "s1").await.unwrap();
            assert!(found.is_some());

            // Wrong session reads as absent.
            assert!(store.get("r1", "other").await.unwrap().is_none());
            // Unknown id reads as absent.
            assert!(store.get("nope", "s1").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            assert!(matches!(
                store.create(job("r1", "s1")).await,
                Err(StoreError::AlreadyExists(_))
            ));
        }
    }

    #[tokio::test]
    async fn transitions_are_one_way_and_progress_monotone() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            store.set_status("r1", JobStatus::Running, Some(10)).await.unwrap();
            store.set_status("r1", JobStatus::Running, Some(60)).await.unwrap();

            // A lower progress value is ignored.
            let updated = store.set_status("r1", JobStatus::Running, Some(25)).await.unwrap();
            assert_eq!(updated.progress, 60);

            store.set_status("r1", JobStatus::DoneSuccess, Some(100)).await.unwrap();
            assert!(matches!(
                store.set_status("r1", JobStatus::Running, None).await,
                Err(StoreError::AlreadyTerminal(_))
            ));
        }
    }

    #[tokio::test]
    async fn heartbeat_bumps_updated_at_and_skips_terminal() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            store.set_status("r1", JobStatus::Running, Some(10)).await.unwrap();

            let before = store.get("r1", "s1").await.unwrap().unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            store.update_heartbeat("r1").await.unwrap();
            let after = store.get("r1", "s1").await.unwrap().unwrap();
            assert!(after.updated_at > before.updated_at);
            assert_eq!(after.status, JobStatus::Running);

            store.set_status("r1", JobStatus::DoneSuccess, Some(100)).await.unwrap();
            let terminal = store.get("r1", "s1").await.unwrap().unwrap();
            store.update_heartbeat("r1").await.unwrap();
            let after_terminal = store.get("r1", "s1").await.unwrap().unwrap();
            assert_eq!(terminal.updated_at, after_terminal.updated_at);
        }
    }

    #[tokio::test]
    async fn idempotency_lookup_round_trips() {
        for store in stores().await {
            let j = job("r1", "s1");
            let key = j.idempotency_key.clone();
            store.create(j).await.unwrap();

            let found = store.find_by_idempotency_key(&key).await.unwrap().unwrap();
            assert_eq!(found.request_id, "r1");
            assert!(store.find_by_idempotency_key("missing").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn error_slot_and_result_slot() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            store.set_status("r1", JobStatus::Running, Some(10)).await.unwrap();
            store
                .set_error("r1", ErrorCode::ProviderFailed, "quota", Some(Route::Nearby))
                .await
                .unwrap();

            let failed = store.get("r1", "s1").await.unwrap().unwrap();
            assert_eq!(failed.status, JobStatus::DoneFailed);
            let err = failed.error.unwrap();
            assert_eq!(err.kind, ErrorCode::ProviderFailed);
            assert_eq!(err.route, Some(Route::Nearby));

            // Result write on a terminal job is refused.
            assert!(
                store.set_result("r1", serde_json::json!({"x": 1})).await.is_err()
            );
        }
    }

    #[tokio::test]
    async fn mark_stale_is_at_most_once() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            store.set_status("r1", JobStatus::Running, Some(10)).await.unwrap();

            let mut wins = 0;
            for _ in 0..8 {
                if store.mark_stale("r1").await.unwrap() {
                    wins += 1;
                }
            }
            assert_eq!(wins, 1);

            let failed = store.get("r1", "s1").await.unwrap().unwrap();
            assert_eq!(failed.status, JobStatus::DoneFailed);
            assert_eq!(failed.error.unwrap().kind, ErrorCode::StaleRunning);
        }
    }

    #[tokio::test]
    async fn mark_stale_never_overwrites_success() {
        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            store.set_status("r1", JobStatus::Running, Some(10)).await.unwrap();
            store.set_status("r1", JobStatus::DoneSuccess, Some(100)).await.unwrap();

            assert!(!store.mark_stale("r1").await.unwrap());
            let j = store.get("r1", "s1").await.unwrap().unwrap();
            assert_eq!(j.status, JobStatus::DoneSuccess);
        }
    }

    #[tokio::test]
    async fn candidate_pool_is_session_scoped() {
        use crate::models::{Anchor, SearchContext, SoftFilters};
        use chrono::Utc;

        for store in stores().await {
            store.create(job("r1", "s1")).await.unwrap();
            let pool = CandidatePool {
                context: SearchContext {
                    query_text: "pizza".into(),
                    route: Route::TextSearch,
                    anchor: Anchor::None,
                    region_code: "IL".into(),
                    radius_meters: 10_000.0,
                    soft_filters: SoftFilters::default(),
                },
                places: vec![],
                fetched_at: Utc::now(),
            };
            store.set_candidate_pool("r1", pool).await.unwrap();

            assert!(store.get_candidate_pool("r1", "s1").await.unwrap().is_some());
            assert!(store.get_candidate_pool("r1", "other").await.unwrap().is_none());

            // The session-level pointer finds the same pool across jobs.
            assert!(store.latest_session_pool("s1").await.unwrap().is_some());
            assert!(store.latest_session_pool("other").await.unwrap().is_none());
        }
    }
}
