//! Durable order storage.

pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use common::Order;
use sea_orm::DbErr;
use thiserror::Error;

pub use postgres::SeaOrmOrderStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),

    /// The `order_uid` is already stored. Expected under duplicate delivery.
    #[error("order {0} already exists")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Authoritative store for orders.
///
/// `save` is atomic across the order header, delivery, payment and items, and
/// the uniqueness of `order_uid` is enforced by the store itself.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Most recently created orders first, with the total number of orders.
    async fn list_page(&self, limit: u64, offset: u64) -> Result<(Vec<Order>, u64), StoreError>;

    async fn save(&self, order: &Order) -> Result<(), StoreError>;
}
