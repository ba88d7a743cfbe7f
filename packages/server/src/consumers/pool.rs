use std::sync::Arc;
use std::time::Duration;

use mq::{MqError, QueueClient};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::orders::{Disposition, OrderMessageHandler};

/// Pause after a failed fetch before asking the broker again.
const FETCH_ERROR_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Queue(#[from] MqError),

    /// Workers still busy when the drain deadline passed. They were aborted;
    /// their messages stay uncommitted.
    #[error("{pending} consumer worker(s) still running after {timeout:?}")]
    Timeout { pending: usize, timeout: Duration },
}

/// A fixed set of sequential fetch → process → commit loops sharing one queue.
///
/// Each worker finishes (or abandons) its current message before fetching the
/// next one. There is no ordering across workers.
pub struct ConsumerPool {
    queue: Arc<dyn QueueClient>,
    stop: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl ConsumerPool {
    /// Spawn `worker_count` workers. They stop when `shutdown` is cancelled or
    /// the pool is closed.
    pub fn start(
        queue: Arc<dyn QueueClient>,
        handler: Arc<OrderMessageHandler>,
        shutdown: &CancellationToken,
        worker_count: usize,
    ) -> Self {
        let stop = shutdown.child_token();
        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    stop.clone(),
                ))
            })
            .collect();

        info!(worker_count, "Consumer pool started");
        Self {
            queue,
            stop,
            workers,
        }
    }

    /// Stop fetching, close the queue client and wait up to `timeout` for
    /// every worker to exit. Workers still running after that are aborted.
    pub async fn close(self, timeout: Duration) -> Result<(), PoolError> {
        self.stop.cancel();
        let closed = self.queue.close().await;

        let mut workers = self.workers;
        let joined = tokio::time::timeout(timeout, async {
            for (worker_id, handle) in workers.iter_mut().enumerate() {
                if let Err(e) = handle.await {
                    error!(worker_id, error = %e, "Consumer worker panicked");
                }
            }
        })
        .await;

        if joined.is_err() {
            let pending = workers.iter().filter(|h| !h.is_finished()).count();
            for handle in &workers {
                handle.abort();
            }
            error!(pending, ?timeout, "Consumer workers did not stop in time, aborted");
            return Err(PoolError::Timeout { pending, timeout });
        }

        info!("Consumer pool stopped");
        closed.map_err(PoolError::from)
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<dyn QueueClient>,
    handler: Arc<OrderMessageHandler>,
    stop: CancellationToken,
) {
    info!(worker_id, "Consumer worker started");

    loop {
        let message = match queue.fetch(&stop).await {
            Ok(message) => message,
            Err(MqError::Closed | MqError::Cancelled) => break,
            Err(e) => {
                error!(worker_id, error = %e, "Failed to fetch message");
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(FETCH_ERROR_PAUSE) => continue,
                }
            }
        };

        match handler.handle(&message, &stop).await {
            Disposition::Commit => {
                if let Err(e) = queue.commit(&message).await {
                    error!(worker_id, offset = %message.offset, error = %e, "Failed to commit message");
                }
            }
            Disposition::Abandon => {
                if let Err(e) = queue.release(&message).await {
                    warn!(worker_id, offset = %message.offset, error = %e, "Failed to release message");
                }
                break;
            }
        }
    }

    info!(worker_id, "Consumer worker stopped");
}
