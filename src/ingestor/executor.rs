//! Explicitly owned background executor
//!
//! Every background task the service starts (schedule tickers, refresh
//! cycles) is spawned through a [`BackgroundExecutor`] so shutdown can find
//! and join all of them. Two tokens drive teardown:
//!
//! - `shutdown`: stop accepting work and stop tickers
//! - `abort`: cancel in-flight transfers once the grace period runs out

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BackgroundExecutor {
    shutdown: CancellationToken,
    abort: CancellationToken,
    tracker: TaskTracker,
}

impl BackgroundExecutor {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Cancelled when shutdown begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancelled when the shutdown grace period expires
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of tracked tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn a tracked task; `None` once shutdown has begun
    pub fn spawn<F>(&self, task: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutting_down() {
            return None;
        }
        Some(self.tracker.spawn(task))
    }

    /// Stop accepting work and join every tracked task
    ///
    /// Tasks get `grace` to finish on their own; after that the abort token
    /// fires and the executor waits for them to unwind. Returns true if
    /// everything finished inside the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(
            "Shutting down background executor ({} tasks, grace {})",
            self.tracker.len(),
            humantime::format_duration(grace)
        );
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            info!("Background executor stopped cleanly");
            return true;
        }

        warn!(
            "{} background tasks still running after grace period; aborting",
            self.tracker.len()
        );
        self.abort.cancel();
        self.tracker.wait().await;
        info!("Background executor stopped after abort");
        false
    }
}

impl Default for BackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}
