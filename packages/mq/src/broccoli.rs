use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use broccoli_queue::{brokers::broker::BrokerMessage, queue::BroccoliQueue};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::QueueClient;
use crate::error::MqError;
use crate::models::Message;

type Payload = Box<RawValue>;

/// Move one task id from the processing list back into the ready set.
///
/// A score of 0 puts it at the head of the queue. Ids whose message hash is
/// gone were acknowledged concurrently and are dropped.
const REQUEUE_ONE: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed > 0 and redis.call('EXISTS', ARGV[1]) == 1 then
    redis.call('ZADD', KEYS[2], 0, ARGV[1])
end
return removed
"#;

/// Drain the processing list back into the ready set. Returns the number of
/// messages requeued.
const REQUEUE_ALL: &str = r#"
local moved = 0
while true do
    local id = redis.call('RPOP', KEYS[1])
    if not id then
        break
    end
    if redis.call('EXISTS', id) == 1 then
        redis.call('ZADD', KEYS[2], 0, id)
        moved = moved + 1
    end
end
return moved
"#;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
    /// Wait between polls of an empty queue.
    pub poll_interval: Duration,
}

pub async fn init_mq(config: &MqConfig) -> Result<BroccoliQueue, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(MqError::from)
}

/// [`QueueClient`] over a Redis-backed broccoli queue.
///
/// The broker keeps a consumed task id in `<topic>_processing` until it is
/// acknowledged. [`release`](QueueClient::release) and [`recover`](Self::recover)
/// move ids from that list back into the ready set, which is how uncommitted
/// messages get redelivered.
///
/// Payloads are carried as raw JSON, so published and fetched bytes are the
/// producer's own. The broker has no message key: a fetched message is keyed
/// by its task id and a published message's key is dropped.
pub struct BroccoliQueueClient {
    queue: BroccoliQueue,
    redis: ConnectionManager,
    topic: String,
    poll_interval: Duration,
    in_flight: DashMap<String, BrokerMessage<Payload>>,
    closed: AtomicBool,
    closing: CancellationToken,
}

impl BroccoliQueueClient {
    pub async fn connect(config: &MqConfig, topic: impl Into<String>) -> Result<Self, MqError> {
        let queue = init_mq(config).await?;
        let client = redis::Client::open(config.url.as_str())?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            queue,
            redis,
            topic: topic.into(),
            poll_interval: config.poll_interval,
            in_flight: DashMap::new(),
            closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn processing_list(&self) -> String {
        format!("{}_processing", self.topic)
    }

    /// Requeue every message a previous run fetched but never acknowledged.
    ///
    /// Must run before any consumer of this topic starts: ids still being
    /// processed by a live consumer would be delivered twice.
    pub async fn recover(&self) -> Result<u64, MqError> {
        let mut conn = self.redis.clone();
        let moved: u64 = redis::Script::new(REQUEUE_ALL)
            .key(self.processing_list())
            .key(&self.topic)
            .invoke_async(&mut conn)
            .await?;

        if moved > 0 {
            warn!(topic = %self.topic, moved, "Requeued unacknowledged messages");
        }
        Ok(moved)
    }

    fn track(&self, broker_message: BrokerMessage<Payload>) -> Message {
        let offset = broker_message.task_id.to_string();
        let value = broker_message.payload.get().as_bytes().to_vec();
        debug!(topic = %self.topic, offset = %offset, "Fetched message");

        self.in_flight.insert(offset.clone(), broker_message);
        Message {
            key: Some(offset.clone()),
            value,
            offset,
        }
    }
}

#[async_trait]
impl QueueClient for BroccoliQueueClient {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Message, MqError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(MqError::Closed);
            }
            if cancel.is_cancelled() {
                return Err(MqError::Cancelled);
            }

            // Never dropped mid-call: the broker moves the id to the processing
            // list inside `try_consume`.
            if let Some(broker_message) = self.queue.try_consume::<Payload>(&self.topic, None).await? {
                return Ok(self.track(broker_message));
            }

            tokio::select! {
                _ = self.closing.cancelled() => return Err(MqError::Closed),
                _ = cancel.cancelled() => return Err(MqError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn commit(&self, message: &Message) -> Result<(), MqError> {
        let (_, broker_message) = self
            .in_flight
            .remove(&message.offset)
            .ok_or_else(|| MqError::UnknownOffset(message.offset.clone()))?;

        self.queue.acknowledge(&self.topic, broker_message).await?;
        Ok(())
    }

    async fn release(&self, message: &Message) -> Result<(), MqError> {
        self.in_flight
            .remove(&message.offset)
            .ok_or_else(|| MqError::UnknownOffset(message.offset.clone()))?;

        let mut conn = self.redis.clone();
        let removed: u64 = redis::Script::new(REQUEUE_ONE)
            .key(self.processing_list())
            .key(&self.topic)
            .arg(&message.offset)
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            warn!(offset = %message.offset, "Released message was not in the processing list");
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, message: &Message) -> Result<(), MqError> {
        let payload: Payload = serde_json::from_slice(&message.value)?;
        self.queue.publish(topic, None, &payload, None).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MqError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closing.cancel();
            info!(
                topic = %self.topic,
                uncommitted = self.in_flight.len(),
                "Queue client closed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Require a Docker daemon: `cargo test -p mq -- --ignored`.

    use redis::AsyncCommands;
    use testcontainers::ContainerAsync;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::{REDIS_PORT, Redis};

    use super::*;

    struct Harness {
        _container: ContainerAsync<Redis>,
        config: MqConfig,
    }

    async fn harness() -> Harness {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = container
            .get_host_port_ipv4(REDIS_PORT)
            .await
            .expect("Failed to get Redis port");

        Harness {
            _container: container,
            config: MqConfig {
                url: format!("redis://127.0.0.1:{port}"),
                pool_size: 2,
                poll_interval: Duration::from_millis(10),
            },
        }
    }

    async fn processing_len(config: &MqConfig, topic: &str) -> usize {
        let client = redis::Client::open(config.url.as_str()).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        conn.llen(format!("{topic}_processing")).await.unwrap()
    }

    const ORDER: &[u8] = br#"{"order_uid":"A1","zeta":1,"alpha":[1,2]}"#;

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn payload_bytes_survive_publish_and_fetch() {
        let h = harness().await;
        let client = BroccoliQueueClient::connect(&h.config, "orders").await.unwrap();

        client
            .publish("orders", &Message::new(None, ORDER))
            .await
            .unwrap();
        let message = client.fetch(&CancellationToken::new()).await.unwrap();

        assert_eq!(message.value, ORDER);
        client.commit(&message).await.unwrap();
        assert_eq!(processing_len(&h.config, "orders").await, 0);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn released_message_is_fetched_again() {
        let h = harness().await;
        let client = BroccoliQueueClient::connect(&h.config, "orders").await.unwrap();
        client
            .publish("orders", &Message::new(None, ORDER))
            .await
            .unwrap();

        let first = client.fetch(&CancellationToken::new()).await.unwrap();
        client.release(&first).await.unwrap();
        assert_eq!(processing_len(&h.config, "orders").await, 0);

        let again = client.fetch(&CancellationToken::new()).await.unwrap();
        assert_eq!(again.offset, first.offset);
        assert_eq!(again.value, ORDER);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn recover_requeues_messages_from_a_dead_consumer() {
        let h = harness().await;
        let crashed = BroccoliQueueClient::connect(&h.config, "orders").await.unwrap();
        crashed
            .publish("orders", &Message::new(None, ORDER))
            .await
            .unwrap();
        let lost = crashed.fetch(&CancellationToken::new()).await.unwrap();
        drop(crashed);

        let client = BroccoliQueueClient::connect(&h.config, "orders").await.unwrap();
        assert_eq!(client.recover().await.unwrap(), 1);

        let again = client.fetch(&CancellationToken::new()).await.unwrap();
        assert_eq!(again.offset, lost.offset);
        assert_eq!(again.value, ORDER);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn cancelled_fetch_leaves_queue_intact() {
        let h = harness().await;
        let client = BroccoliQueueClient::connect(&h.config, "orders").await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.fetch(&cancel).await.unwrap_err();
        assert!(matches!(err, MqError::Cancelled));

        client
            .publish("orders", &Message::new(None, ORDER))
            .await
            .unwrap();
        let message = client.fetch(&CancellationToken::new()).await.unwrap();
        assert_eq!(message.value, ORDER);
    }
}
