pub mod orders;
pub mod policy;
pub mod pool;

pub use orders::{Disposition, OrderMessageHandler};
pub use policy::{Resolution, RetryPolicy};
pub use pool::{ConsumerPool, PoolError};
