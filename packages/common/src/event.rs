//! Inbound order events.
//!
//! Producers publish orders as JSON documents. [`decode`] is the only way to
//! obtain a [`ValidatedOrderEvent`]; anything it rejects is a [`DecodeError`],
//! which is terminal: the same bytes can never decode differently on retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::order::{Delivery, Item, Order, Payment};

/// Order event as published on the queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderEvent {
    #[validate(custom(function = "not_blank", message = "order_uid is required"))]
    pub order_uid: String,
    #[validate(length(min = 1, message = "track_number is required"))]
    pub track_number: String,
    #[validate(length(min = 1, message = "entry is required"))]
    pub entry: String,
    #[validate(nested)]
    pub delivery: DeliveryEvent,
    #[validate(nested)]
    pub payment: PaymentEvent,
    #[validate(length(min = 1, message = "at least one item is required"))]
    #[validate(nested)]
    pub items: Vec<ItemEvent>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub oof_shard: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeliveryEvent {
    #[validate(length(min = 1, message = "delivery.name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "delivery.phone is required"))]
    pub phone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub region: String,
    #[validate(email(message = "delivery.email must be a valid e-mail address"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentEvent {
    #[validate(length(min = 1, message = "payment.transaction is required"))]
    pub transaction: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_id: String,
    #[validate(length(min = 1, message = "payment.currency is required"))]
    pub currency: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub provider: String,
    #[validate(range(min = 0, message = "payment.amount must be >= 0"))]
    pub amount: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_dt: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bank: String,
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(range(min = 0, message = "payment.delivery_cost must be >= 0"))]
    pub delivery_cost: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(range(min = 0, message = "payment.goods_total must be >= 0"))]
    pub goods_total: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(range(min = 0, message = "payment.custom_fee must be >= 0"))]
    pub custom_fee: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub chrt_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub track_number: String,
    #[validate(range(min = 0, message = "item.price must be >= 0"))]
    pub price: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sale: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(default, deserialize_with = "null_as_default")]
    #[validate(range(min = 0, message = "item.total_price must be >= 0"))]
    pub total_price: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nm_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i32,
}

/// Optional fields accept both a missing key and an explicit `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Reasons an event payload is rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not a well-formed JSON document.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Well-formed JSON with a missing field or a field of the wrong type.
    #[error("payload does not match the order schema: {0}")]
    Schema(String),

    /// Schema-conformant but fails field validation.
    #[error("order validation failed: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() {
            DecodeError::Schema(e.to_string())
        } else {
            DecodeError::Malformed(e.to_string())
        }
    }
}

/// An [`OrderEvent`] that passed schema and field validation.
#[derive(Debug, Clone)]
pub struct ValidatedOrderEvent(OrderEvent);

impl ValidatedOrderEvent {
    pub fn order_uid(&self) -> &str {
        &self.0.order_uid
    }

    pub fn event(&self) -> &OrderEvent {
        &self.0
    }

    /// Map the event to the canonical [`Order`] shape.
    pub fn to_order(&self) -> Order {
        Order::from(self.0.clone())
    }
}

/// Parse and validate a raw payload.
pub fn decode(raw: &[u8]) -> Result<ValidatedOrderEvent, DecodeError> {
    let event: OrderEvent = serde_json::from_slice(raw)?;
    event.validate()?;
    Ok(ValidatedOrderEvent(event))
}

impl From<OrderEvent> for Order {
    fn from(e: OrderEvent) -> Self {
        Self {
            order_uid: e.order_uid,
            track_number: e.track_number,
            entry: e.entry,
            delivery: e.delivery.into(),
            payment: e.payment.into(),
            items: e.items.into_iter().map(Into::into).collect(),
            locale: e.locale,
            internal_signature: e.internal_signature,
            customer_id: e.customer_id,
            delivery_service: e.delivery_service,
            shardkey: e.shardkey,
            sm_id: e.sm_id,
            date_created: e.date_created,
            oof_shard: e.oof_shard,
        }
    }
}

impl From<DeliveryEvent> for Delivery {
    fn from(d: DeliveryEvent) -> Self {
        Self {
            name: d.name,
            phone: d.phone,
            zip: d.zip,
            city: d.city,
            address: d.address,
            region: d.region,
            email: d.email,
        }
    }
}

impl From<PaymentEvent> for Payment {
    fn from(p: PaymentEvent) -> Self {
        Self {
            transaction: p.transaction,
            request_id: p.request_id,
            currency: p.currency,
            provider: p.provider,
            amount: p.amount,
            payment_dt: p.payment_dt,
            bank: p.bank,
            delivery_cost: p.delivery_cost,
            goods_total: p.goods_total,
            custom_fee: p.custom_fee,
        }
    }
}

impl From<ItemEvent> for Item {
    fn from(i: ItemEvent) -> Self {
        Self {
            chrt_id: i.chrt_id,
            track_number: i.track_number,
            price: i.price,
            rid: i.rid,
            name: i.name,
            sale: i.sale,
            size: i.size,
            total_price: i.total_price,
            nm_id: i.nm_id,
            brand: i.brand,
            status: i.status,
        }
    }
}
