use std::sync::Arc;

use common::retry::RetryAttempt;
use common::{DlqEnvelope, DlqErrorCode};
use mq::{Message, QueueClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::policy::{Resolution, RetryPolicy};
use crate::service::{IngestError, IngestOutcome, OrderService};

/// What the worker does with a message once the pipeline is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Ingested or dead-lettered.
    Commit,
    /// Interrupted by shutdown; release it back to the queue uncommitted.
    Abandon,
}

/// Runs one queue message through decode, ingestion and the retry policy.
pub struct OrderMessageHandler {
    service: OrderService,
    policy: RetryPolicy,
    queue: Arc<dyn QueueClient>,
    dlq_topic: String,
}

impl OrderMessageHandler {
    pub fn new(
        service: OrderService,
        policy: RetryPolicy,
        queue: Arc<dyn QueueClient>,
        dlq_topic: impl Into<String>,
    ) -> Self {
        Self {
            service,
            policy,
            queue,
            dlq_topic: dlq_topic.into(),
        }
    }

    pub async fn handle(&self, message: &Message, cancel: &CancellationToken) -> Disposition {
        let resolution = self
            .policy
            .execute(cancel, |_| self.attempt(&message.value))
            .await;

        match resolution {
            Resolution::Success(outcome) => {
                debug!(offset = %message.offset, ?outcome, "Message processed");
                Disposition::Commit
            }
            Resolution::DeadLetter {
                code,
                error,
                history,
            } => {
                self.dead_letter(message, code, error, history).await;
                Disposition::Commit
            }
            Resolution::Cancelled => {
                warn!(offset = %message.offset, "Shutdown during retry wait, message left uncommitted");
                Disposition::Abandon
            }
        }
    }

    async fn attempt(&self, raw: &[u8]) -> Result<IngestOutcome, IngestError> {
        let event = common::decode(raw)?;
        self.service.process(&event).await
    }

    /// Publish a [`DlqEnvelope`] carrying the original key and payload. A
    /// failed send is logged and the message still counts as handled.
    async fn dead_letter(
        &self,
        message: &Message,
        code: DlqErrorCode,
        error: String,
        history: Vec<RetryAttempt>,
    ) {
        warn!(
            offset = %message.offset,
            error_code = %code,
            attempts = history.len(),
            error = %error,
            "Sending message to DLQ"
        );

        let encoded = DlqEnvelope::new(message.key.clone(), &message.value, code, error, history)
            .and_then(|envelope| serde_json::to_vec(&envelope));
        let body = match encoded {
            Ok(body) => body,
            Err(e) => {
                error!(offset = %message.offset, error = %e, "Failed to encode DLQ envelope");
                return;
            }
        };

        let forwarded = Message::new(message.key.clone(), body);
        if let Err(e) = self.queue.publish(&self.dlq_topic, &forwarded).await {
            error!(
                offset = %message.offset,
                dlq = %self.dlq_topic,
                error = %e,
                "Failed to publish to DLQ"
            );
        }
    }
}
