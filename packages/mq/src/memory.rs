use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::client::QueueClient;
use crate::error::MqError;
use crate::models::Message;

#[derive(Default)]
struct State {
    next_offset: u64,
    pending: VecDeque<Message>,
    in_flight: HashMap<String, Message>,
    committed: Vec<Message>,
    published: HashMap<String, Vec<Message>>,
    fetch_failures: u32,
    fail_publish: bool,
}

/// In-process [`QueueClient`] for a single topic.
///
/// Messages published to the client's own topic are fed back to consumers;
/// everything else is recorded and can be inspected with
/// [`published`](Self::published).
pub struct MemoryQueueClient {
    topic: String,
    state: Mutex<State>,
    notify: Notify,
    closed: CancellationToken,
}

impl MemoryQueueClient {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a payload on the client's topic. Returns its offset.
    pub fn push(&self, key: Option<&str>, value: impl Into<Vec<u8>>) -> String {
        let offset = {
            let mut state = self.lock();
            state.next_offset += 1;
            let offset = format!("{}-{}", self.topic, state.next_offset);
            state.pending.push_back(Message {
                key: key.map(str::to_owned),
                value: value.into(),
                offset: offset.clone(),
            });
            offset
        };
        self.notify.notify_one();
        offset
    }

    /// Make the next `n` fetches fail with an internal error.
    pub fn fail_next_fetches(&self, n: u32) {
        self.lock().fetch_failures = n;
    }

    /// Make publishes to other topics fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.lock().fail_publish = fail;
    }

    pub fn committed(&self) -> Vec<Message> {
        self.lock().committed.clone()
    }

    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.lock().published.get(topic).cloned().unwrap_or_default()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }
}

#[async_trait]
impl QueueClient for MemoryQueueClient {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Message, MqError> {
        loop {
            if self.closed.is_cancelled() {
                return Err(MqError::Closed);
            }
            if cancel.is_cancelled() {
                return Err(MqError::Cancelled);
            }

            {
                let mut state = self.lock();
                if state.fetch_failures > 0 {
                    state.fetch_failures -= 1;
                    return Err(MqError::Internal("injected fetch failure".into()));
                }
                if let Some(message) = state.pending.pop_front() {
                    state
                        .in_flight
                        .insert(message.offset.clone(), message.clone());
                    return Ok(message);
                }
            }

            tokio::select! {
                _ = self.closed.cancelled() => return Err(MqError::Closed),
                _ = cancel.cancelled() => return Err(MqError::Cancelled),
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn commit(&self, message: &Message) -> Result<(), MqError> {
        let mut state = self.lock();
        let message = state
            .in_flight
            .remove(&message.offset)
            .ok_or_else(|| MqError::UnknownOffset(message.offset.clone()))?;
        state.committed.push(message);
        Ok(())
    }

    async fn release(&self, message: &Message) -> Result<(), MqError> {
        {
            let mut state = self.lock();
            let message = state
                .in_flight
                .remove(&message.offset)
                .ok_or_else(|| MqError::UnknownOffset(message.offset.clone()))?;
            state.pending.push_front(message);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn publish(&self, topic: &str, message: &Message) -> Result<(), MqError> {
        if topic == self.topic {
            self.push(message.key.as_deref(), message.value.clone());
            return Ok(());
        }

        let mut state = self.lock();
        if state.fail_publish {
            return Err(MqError::Internal(format!("publish to {topic} failed")));
        }
        state
            .published
            .entry(topic.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), MqError> {
        self.closed.cancel();
        Ok(())
    }
}
