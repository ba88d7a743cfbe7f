pub mod broccoli;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod models;

pub use broccoli::{BroccoliQueueClient, MqConfig, init_mq};
pub use client::QueueClient;
pub use error::MqError;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryQueueClient;
pub use models::Message;
