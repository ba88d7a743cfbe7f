use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key prefix for cached orders.
pub const ORDER_CACHE_PREFIX: &str = "order:";

/// Cache key for an order: `order:<order_uid>`.
pub fn order_cache_key(order_uid: &str) -> String {
    format!("{ORDER_CACHE_PREFIX}{order_uid}")
}

/// Canonical order aggregate.
///
/// `order_uid` is the idempotency key: it is assigned once by the producer and
/// never duplicated in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Order {
    #[schema(example = "b563feb7b2b84b6test")]
    pub order_uid: String,
    #[schema(example = "WBILMTESTTRACK")]
    pub track_number: String,
    #[schema(example = "WBIL")]
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    #[schema(example = "en")]
    pub locale: String,
    pub internal_signature: String,
    #[schema(example = "test")]
    pub customer_id: String,
    #[schema(example = "meest")]
    pub delivery_service: String,
    #[schema(example = "9")]
    pub shardkey: String,
    #[schema(example = 99)]
    pub sm_id: i32,
    #[schema(example = "2021-11-26T06:22:19Z")]
    pub date_created: DateTime<Utc>,
    #[schema(example = "1")]
    pub oof_shard: String,
}

/// Recipient contact and address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Delivery {
    #[schema(example = "Test Testov")]
    pub name: String,
    #[schema(example = "+9720000000")]
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    #[schema(example = "test@gmail.com")]
    pub email: String,
}

/// Payment transaction. Monetary amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    #[schema(example = "USD")]
    pub currency: String,
    pub provider: String,
    #[schema(example = 1817)]
    pub amount: i64,
    /// Unix timestamp (seconds) of the payment.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// A single line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Item {
    /// Catalog identifier.
    pub chrt_id: i64,
    pub track_number: String,
    #[schema(example = 453)]
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Discount in percent.
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}
