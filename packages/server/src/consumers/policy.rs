use std::future::Future;
use std::time::Duration;

use common::DlqErrorCode;
use common::retry::{RetryAttempt, RetryDecision, RetryState};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::service::{FailureClass, IngestError};

/// Final state of one message under the [`RetryPolicy`].
#[derive(Debug)]
pub enum Resolution<T> {
    Success(T),
    /// Give up on the message and route it to the dead-letter queue.
    DeadLetter {
        code: DlqErrorCode,
        error: String,
        history: Vec<RetryAttempt>,
    },
    /// Shutdown interrupted a retry wait. The message must not be committed.
    Cancelled,
}

/// Bounded retries with linear backoff.
///
/// Terminal failures end after one attempt. Retryable failures are retried up
/// to `max_retries` times, waiting `base_delay * n` before retry `n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Run `op` until it succeeds, fails terminally, runs out of retries, or
    /// `cancel` fires during a wait. `op` receives the 0-based attempt number.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Resolution<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        let mut state = RetryState::new(self.max_retries, self.base_delay);

        loop {
            let attempt = state.attempt();
            let err = match op(attempt).await {
                Ok(value) => return Resolution::Success(value),
                Err(e) => e,
            };
            let error_str = err.to_string();

            if let FailureClass::Terminal(code) = err.class() {
                warn!(attempt, error = %err, "Non-retryable failure");
                let mut history = state.into_history();
                history.push(RetryAttempt::new(attempt + 1, error_str.as_str()));
                return Resolution::DeadLetter {
                    code,
                    error: error_str,
                    history,
                };
            }

            match state.record_failure(&error_str) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying message processing"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Resolution::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Exhausted { history } => {
                    error!(
                        retry_count = history.len(),
                        error = %err,
                        "Max retries exhausted"
                    );
                    return Resolution::DeadLetter {
                        code: DlqErrorCode::MaxRetriesExceeded,
                        error: error_str,
                        history,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use sea_orm::DbErr;
    use tokio::time::Instant;

    use super::*;
    use crate::store::StoreError;

    fn storage_error() -> IngestError {
        IngestError::Storage(StoreError::Database(DbErr::Custom("connection reset".into())))
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_is_bounded_with_linear_delays() {
        let policy = RetryPolicy::new(3, Duration::from_millis(600));
        let cancel = CancellationToken::new();
        let mut calls = Vec::new();

        let resolution: Resolution<()> = policy
            .execute(&cancel, |attempt| {
                calls.push((attempt, Instant::now()));
                async { Err(storage_error()) }
            })
            .await;

        assert_eq!(calls.len(), 4);
        let gaps: Vec<_> = calls.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert_eq!(
            gaps,
            [
                Duration::from_millis(600),
                Duration::from_millis(1200),
                Duration::from_millis(1800),
            ]
        );
        match resolution {
            Resolution::DeadLetter {
                code,
                history,
                error,
            } => {
                assert_eq!(code, DlqErrorCode::MaxRetriesExceeded);
                assert_eq!(history.len(), 4);
                assert!(error.contains("connection reset"));
            }
            other => panic!("expected DeadLetter, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_failure_is_attempted_once() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let resolution: Resolution<()> = policy
            .execute(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(IngestError::from(common::decode(b"garbage").unwrap_err())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            resolution,
            Resolution::DeadLetter { code: DlqErrorCode::DeserializationError, ref history, .. }
                if history.len() == 1
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let resolution = policy
            .execute(&CancellationToken::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(storage_error())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert!(matches!(resolution, Resolution::Success(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_dead_letters_after_first_failure() {
        let policy = RetryPolicy::new(0, Duration::from_secs(60));
        let resolution: Resolution<()> = policy
            .execute(&CancellationToken::new(), |_| async { Err(storage_error()) })
            .await;

        assert!(matches!(
            resolution,
            Resolution::DeadLetter { code: DlqErrorCode::MaxRetriesExceeded, .. }
        ));
    }

    #[tokio::test]
    async fn cancellation_aborts_retry_wait() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let cancel = cancel.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                policy
                    .execute(&cancel, |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { Err::<(), _>(storage_error()) }
                    })
                    .await
            })
        };

        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let resolution = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(resolution, Resolution::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
