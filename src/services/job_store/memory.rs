//! In-process job store for dev and tests

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{JobStore, StoreError, check_transition};
use crate::models::{CandidatePool, ErrorCode, Job, JobError, JobStatus, Route};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<String, Job>,
    by_idempotency: DashMap<String, String>,
    session_pools: DashMap<String, String>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `mutate` to the stored job under its entry lock. The re-read
    /// inside the lock is what makes racing writers safe.
    fn with_job<T>(
        &self,
        request_id: &str,
        mutate: impl FnOnce(&mut Job) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match self.jobs.get_mut(request_id) {
            Some(mut entry) => mutate(entry.value_mut()),
            None => Err(StoreError::NotFound(request_id.to_string())),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: Job) -> Result<(), StoreError> {
        let request_id = job.request_id.clone();
        match self.jobs.entry(request_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists(request_id));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.by_idempotency.insert(job.idempotency_key.clone(), request_id);
                slot.insert(job);
            }
        }
        Ok(())
    }

    async fn set_status(
        &self,
        request_id: &str,
        status: JobStatus,
        progress: Option<u8>,
    ) -> Result<Job, StoreError> {
        self.with_job(request_id, |job| {
            check_transition(job.status, status)?;
            job.status = status;
            if let Some(progress) = progress {
                job.progress = job.progress.max(progress.min(100));
            }
            job.updated_at = Utc::now();
            Ok(job.clone())
        })
    }

    async fn set_result(
        &self,
        request_id: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.with_job(request_id, |job| {
            if job.is_terminal() {
                return Err(StoreError::AlreadyTerminal(request_id.to_string()));
            }
            job.result = Some(result);
            job.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn set_error(
        &self,
        request_id: &str,
        kind: ErrorCode,
        message: &str,
        route: Option<Route>,
    ) -> Result<(), StoreError> {
        self.with_job(request_id, |job| {
            check_transition(job.status, JobStatus::DoneFailed)?;
            job.status = JobStatus::DoneFailed;
            job.error = Some(JobError { kind, message: message.to_string(), route });
            job.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn update_heartbeat(&self, request_id: &str) -> Result<(), StoreError> {
        self.with_job(request_id, |job| {
            if !job.is_terminal() {
                job.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError> {
        let Some(request_id) = self.by_idempotency.get(key).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.jobs.get(&request_id).map(|e| e.value().clone()))
    }

    async fn set_candidate_pool(
        &self,
        request_id: &str,
        pool: CandidatePool,
    ) -> Result<(), StoreError> {
        let session_id = self.with_job(request_id, |job| {
            job.candidate_pool = Some(pool);
            Ok(job.session_id.clone())
        })?;
        self.session_pools.insert(session_id, request_id.to_string());
        Ok(())
    }

    async fn get_candidate_pool(
        &self,
        request_id: &str,
        session_id: &str,
    ) -> Result<Option<CandidatePool>, StoreError> {
        Ok(self
            .jobs
            .get(request_id)
            .filter(|e| e.value().session_id == session_id)
            .and_then(|e| e.value().candidate_pool.clone()))
    }

    async fn latest_session_pool(
        &self,
        session_id: &str,
    ) -> Result<Option<CandidatePool>, StoreError> {
        let Some(request_id) = self.session_pools.get(session_id).map(|e| e.value().clone())
        else {
            return Ok(None);
        };
        self.get_candidate_pool(&request_id, session_id).await
    }

    async fn get(&self, request_id: &str, session_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .get(request_id)
            .filter(|e| e.value().session_id == session_id)
            .map(|e| e.value().clone()))
    }

    async fn list_running(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .iter()
            .filter(|e| e.value().status == JobStatus::Running)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn mark_stale(&self, request_id: &str) -> Result<bool, StoreError> {
        self.with_job(request_id, |job| {
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
    }
}
