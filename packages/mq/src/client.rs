use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::MqError;
use crate::models::Message;

/// Consumer-side view of a message queue.
///
/// Delivery is at-least-once: a message that was fetched but never committed
/// is delivered again, either after [`release`](Self::release) or after a
/// restart.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Wait for the next message on the subscribed queue.
    ///
    /// Returns [`MqError::Cancelled`] once `cancel` fires and
    /// [`MqError::Closed`] once [`close`](Self::close) has been called. Neither
    /// loses a message the broker has already handed out.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Message, MqError>;

    /// Mark a fetched message as processed.
    async fn commit(&self, message: &Message) -> Result<(), MqError>;

    /// Return a fetched, uncommitted message to the queue for redelivery.
    async fn release(&self, message: &Message) -> Result<(), MqError>;

    /// Publish `message` to `topic`.
    async fn publish(&self, topic: &str, message: &Message) -> Result<(), MqError>;

    /// Stop handing out messages. Pending fetches return [`MqError::Closed`].
    async fn close(&self) -> Result<(), MqError>;
}
