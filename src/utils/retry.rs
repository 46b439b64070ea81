//! Centralised retry helper
//!
//! All retry behaviour in the pipeline goes through [`retry_once`]: callers
//! classify their error as retriable or not, and the helper applies a single
//! jittered backoff. Stages that must not retry simply never call it.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classification returned by the caller's error inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retriable,
    NonRetriable,
}

/// Jitter window applied before the single retry attempt.
const BACKOFF_MIN_MS: u64 = 50;
const BACKOFF_MAX_MS: u64 = 150;

/// Run `op`, and if it fails with a retriable error, run it exactly once
/// more after a 50-150 ms jittered pause. Never loops.
pub async fn retry_once<T, E, F, Fut, C>(op_name: &str, classify: C, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> RetryClass,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(err) => {
            if classify(&err) == RetryClass::NonRetriable {
                return Err(err);
            }
            let backoff_ms = rand::thread_rng().gen_range(BACKOFF_MIN_MS..=BACKOFF_MAX_MS);
            tracing::warn!(
                "{} failed ({}), retrying once after {}ms",
                op_name,
                err,
                backoff_ms
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            op().await
        }
    }
}
