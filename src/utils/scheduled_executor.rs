//! Scheduled executor for periodic background tasks
//!
//! Drives the stale-job sweeper. Tasks run on a fixed interval until the
//! shutdown handle fires; a failing tick is logged and the schedule keeps
//! going.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

type TickFuture<'a> = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + 'a>>;

/// Recurring background work, like the stale-job sweep. Each tick returns a
/// boxed future so the executor can drive any task without knowing its
/// concrete type.
pub trait PeriodicTask: Send + Sync + 'static {
    fn tick(&self) -> TickFuture<'_>;

    /// Whether the schedule is done. Sweepers run for the process lifetime,
    /// so the default never finishes.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Tasks are shared with the executor behind an `Arc`; delegate through it
/// so callers keep their own handle.
impl<T: PeriodicTask> PeriodicTask for Arc<T> {
    fn tick(&self) -> TickFuture<'_> {
        self.as_ref().tick()
    }

    fn is_finished(&self) -> bool {
        self.as_ref().is_finished()
    }
}

/// Handle for stopping a running executor from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

pub struct ScheduledExecutor {
    interval: Duration,
    task_name: String,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledExecutor {
    pub fn new(task_name: impl Into<String>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        Self { interval, task_name: task_name.into(), shutdown }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: self.shutdown.clone() }
    }

    /// Run the task on the configured interval until shutdown. The first
    /// tick fires after one full interval, not immediately.
    pub async fn start<T>(self, task: T)
    where
        T: PeriodicTask,
    {
        let task_name = self.task_name;
        let shutdown = self.shutdown;

        tracing::info!("Starting scheduled task '{}' every {:?}", task_name, self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::Relaxed) || task.is_finished() {
                break;
            }
            if let Err(e) = task.tick().await {
                tracing::error!("Scheduled task '{}' failed: {}", task_name, e);
            }
        }

        tracing::info!("Scheduled task '{}' stopped", task_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Counter {
        runs: Arc<AtomicU32>,
    }

    impl PeriodicTask for Counter {
        fn tick(&self) -> TickFuture<'_> {
            let runs = self.runs.clone();
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_interval_and_stops_on_shutdown() {
        let runs = Arc::new(AtomicU32::new(0));
        let executor = ScheduledExecutor::new("counter", Duration::from_secs(10));
        let handle = executor.shutdown_handle();
        let task = Counter { runs: runs.clone() };

        let join = tokio::spawn(executor.start(task));
        tokio::time::sleep(Duration::from_secs(35)).await;
        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(11)).await;
        join.await.unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 3);
    }
}
