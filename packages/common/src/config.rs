use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Broker connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue the consumers read order events from. Default: "orders".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
    /// Queue that receives messages which cannot be ingested. Default: "orders-dlq".
    #[serde(default = "default_mq_dlq_queue_name")]
    pub dlq_queue_name: String,
    /// Wait between polls of an empty queue. Default: 100.
    #[serde(default = "default_mq_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Return messages left unacknowledged by a previous run to the queue at
    /// startup. Only safe when a single instance consumes the queue. Default: true.
    #[serde(default = "default_mq_recover_on_start")]
    pub recover_on_start: bool,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "orders".into()
}
fn default_mq_dlq_queue_name() -> String {
    "orders-dlq".into()
}
fn default_mq_poll_interval_ms() -> u64 {
    100
}
fn default_mq_recover_on_start() -> bool {
    true
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
            dlq_queue_name: default_mq_dlq_queue_name(),
            poll_interval_ms: default_mq_poll_interval_ms(),
            recover_on_start: default_mq_recover_on_start(),
        }
    }
}
