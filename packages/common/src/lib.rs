pub mod config;
pub mod dlq;
pub mod event;
pub mod order;
pub mod retry;

pub use dlq::{DlqEnvelope, DlqErrorCode, PayloadFormat};
pub use event::{DecodeError, OrderEvent, ValidatedOrderEvent, decode};
pub use order::{Delivery, Item, Order, Payment, order_cache_key};
