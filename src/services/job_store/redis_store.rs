//! Shared-store job store
//!
//! Persists jobs as JSON documents in the shared key-value store, with a
//! secondary index from idempotency key to request id. Writes are
//! read-modify-write under a per-request async lock, and every write
//! re-checks terminality after the re-read so a racing completion or
//! stale-mark is never overwritten. The stale-mark itself takes a
//! store-level NX marker first, which is what makes it at-most-once across
//! processes.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{JobStore, StoreError, check_transition};
use crate::models::{CandidatePool, ErrorCode, Job, JobError, JobStatus, Route};
use crate::services::cache::SharedKv;

const JOB_PREFIX: &str = "job:";
const IDEMPOTENCY_PREFIX: &str = "jobidx:";
const STALE_MARK_PREFIX: &str = "stale_mark:";
const SESSION_POOL_PREFIX: &str = "sessionpool:";

pub struct KvJobStore {
    kv: Arc<dyn SharedKv>,
    job_ttl_s: u64,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KvJobStore {
    pub fn new(kv: Arc<dyn SharedKv>, job_ttl_s: u64) -> Self {
        Self { kv, job_ttl_s, write_locks: DashMap::new() }
    }

    fn job_key(request_id: &str) -> String {
        format!("{JOB_PREFIX}{request_id}")
    }

    fn write_lock(&self, request_id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, request_id: &str) -> Result<Option<Job>, StoreError> {
        let raw = self
            .kv
            .get(&Self::job_key(request_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Backend(format!("corrupt job record: {e}"))),
            None => Ok(None),
        }
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let raw = serde_json::to_string(job)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.kv
            .set_ex(&Self::job_key(&job.request_id), &raw, self.job_ttl_s)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Read-modify-write under the per-request lock.
    async fn mutate<T>(
        &self,
        request_id: &str,
        mutate: impl FnOnce(&mut Job) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock = self.write_lock(request_id);
        let _guard = lock.lock().await;
        let mut job = self
            .load(request_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        let out = mutate(&mut job)?;
        self.save(&job).await?;
        Ok(out)
    }
}

#[async_trait]
impl JobStore for KvJobStore {
    async fn create(&self, job: Job) -> Result<(), StoreError> {
        let lock = self.write_lock(&job.request_id);
        let _guard = lock.lock().await;
        if self.load(&job.request_id).await?.is_some() {
            return Err(StoreError::AlreadyExists(job.request_id));
        }
        self.save(&job).await?;
        self.kv
            .set_ex(
                &format!("{IDEMPOTENCY_PREFIX}{}", job.idempotency_key),
                &job.request_id,
                self.job_ttl_s,
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_status(
        &self,
        request_id: &str,
        status: JobStatus,
        progress: Option<u8>,
    ) -> Result<Job, StoreError> {
        self.mutate(request_id, |job| {
            check_transition(job.status, status)?;
            job.status = status;
            if let Some(progress) = progress {
                job.progress = job.progress.max(progress.min(100));
            }
            job.updated_at = Utc::now();
            Ok(job.clone())
        })
        .await
    }

    async fn set_result(
        &self,
        request_id: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.mutate(request_id, |job| {
            if job.is_terminal() {
                return Err(StoreError::AlreadyTerminal(request_id.to_string()));
            }
            job.result = Some(result);
            job.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn set_error(
        &self,
        request_id: &str,
        kind: ErrorCode,
        message: &str,
        route: Option<Route>,
    ) -> Result<(), StoreError> {
        self.mutate(request_id, |job| {
            check_transition(job.status, JobStatus::DoneFailed)?;
            job.status = JobStatus::DoneFailed;
            job.error = Some(JobError { kind, message: message.to_string(), route });
            job.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn update_heartbeat(&self, request_id: &str) -> Result<(), StoreError> {
        self.mutate(request_id, |job| {
            if !job.is_terminal() {
                job.updated_at = Utc::now();
            }
            Ok(())
        })
        .await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError> {
        let request_id = self
            .kv
            .get(&format!("{IDEMPOTENCY_PREFIX}{key}"))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match request_id {
            Some(request_id) => self.load(&request_id).await,
            None => Ok(None),
        }
    }

    async fn set_candidate_pool(
        &self,
        request_id: &str,
        pool: CandidatePool,
    ) -> Result<(), StoreError> {
        let session_id = self
            .mutate(request_id, |job| {
                job.candidate_pool = Some(pool);
                Ok(job.session_id.clone())
            })
            .await?;
        self.kv
            .set_ex(&format!("{SESSION_POOL_PREFIX}{session_id}"), request_id, self.job_ttl_s)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_candidate_pool(
        &self,
        request_id: &str,
        session_id: &str,
    ) -> Result<Option<CandidatePool>, StoreError> {
        Ok(self
            .load(request_id)
            .await?
            .filter(|job| job.session_id == session_id)
            .and_then(|job| job.candidate_pool))
    }

    async fn latest_session_pool(
        &self,
        session_id: &str,
    ) -> Result<Option<CandidatePool>, StoreError> {
        let pointer = self
            .kv
            .get(&format!("{SESSION_POOL_PREFIX}{session_id}"))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match pointer {
            Some(request_id) => self.get_candidate_pool(&request_id, session_id).await,
            None => Ok(None),
        }
    }

    async fn get(&self, request_id: &str, session_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.load(request_id).await?.filter(|job| job.session_id == session_id))
    }

    async fn list_running(&self) -> Result<Vec<Job>, StoreError> {
        let keys = self
            .kv
            .keys_with_prefix(JOB_PREFIX)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut running = Vec::new();
        for key in keys {
            let request_id = key.trim_start_matches(JOB_PREFIX);
            if let Some(job) = self.load(request_id).await? {
                if job.status == JobStatus::Running {
                    running.push(job);
                }
            }
        }
        Ok(running)
    }

    async fn mark_stale(&self, request_id: &str) -> Result<bool, StoreError> {
        // NX marker decides which sweeper performs the transition.
        let won = self
            .kv
            .set_nx_ex(&format!("{STALE_MARK_PREFIX}{request_id}"), "1", self.job_ttl_s)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !won {
            return Ok(false);
        }

        self.mutate(request_id, |job| {
            if job.status != JobStatus::Running {
                return Ok(false);
            }
            job.status = JobStatus::DoneFailed;
            job.error = Some(JobError {
                kind: ErrorCode::StaleRunning,
                message: "job outlived its heartbeat".to_string(),
                route: None,
            });
            job.updated_at = Utc::now();
            Ok(true)
        })
        .await
    }
}
