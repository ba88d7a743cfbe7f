//! Tracked fire-and-forget work.
//!
//! Cache refreshes run off the ingestion and read paths. They are spawned
//! through [`BackgroundTasks`] so that shutdown can wait for them, with a
//! bound, before the cache and database connections are released.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("{pending} background task(s) still running after {timeout:?}")]
    Timeout { pending: usize, timeout: Duration },
}

/// Cheap to clone; all clones share one tracker.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task. Tasks spawned after [`shutdown`](Self::shutdown)
    /// has started are still tracked.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            debug!(task = %name, "Spawning background task during shutdown");
        }
        self.tracker.spawn(future);
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Stop accepting tracked work and wait for what is in flight.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            let pending = self.tracker.len();
            warn!(pending, ?timeout, "Background tasks did not finish in time");
            return Err(ShutdownError::Timeout { pending, timeout });
        }
        debug!("All background tasks finished");
        Ok(())
    }
}
