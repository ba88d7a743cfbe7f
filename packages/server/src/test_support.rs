//! In-memory store and cache used by unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{Order, ValidatedOrderEvent};
use sea_orm::DbErr;

use crate::cache::{CacheError, OrderCache};
use crate::store::{OrderStore, StoreError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A valid order event payload.
pub fn sample_payload(order_uid: &str) -> serde_json::Value {
    serde_json::json!({
        "order_uid": order_uid,
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": order_uid,
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": 100,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 30,
            "size": "0",
            "total_price": 317,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": 202
        }],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    })
}

pub fn sample_event(order_uid: &str) -> ValidatedOrderEvent {
    let raw = serde_json::to_vec(&sample_payload(order_uid)).expect("sample payload encodes");
    common::decode(&raw).expect("sample payload is valid")
}

pub fn sample_order(order_uid: &str) -> Order {
    sample_event(order_uid).to_order()
}

#[derive(Default)]
struct StoreState {
    orders: Vec<Order>,
    save_calls: usize,
    get_calls: usize,
    failing_saves: u32,
    failing_reads: bool,
    hanging_saves: bool,
}

/// [`OrderStore`] over a vector, enforcing `order_uid` uniqueness.
#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<StoreState>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert directly, bypassing uniqueness checks and counters.
    pub fn insert(&self, order: Order) {
        lock(&self.state).orders.push(order);
    }

    /// Fail the next `n` saves with a database error.
    pub fn fail_saves(&self, n: u32) {
        lock(&self.state).failing_saves = n;
    }

    /// Make every save (after counting it) wait forever.
    pub fn hang_saves(&self, hang: bool) {
        lock(&self.state).hanging_saves = hang;
    }

    /// Fail every read with a database error.
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.state).failing_reads = fail;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_uid(&self, order_uid: &str) -> usize {
        lock(&self.state)
            .orders
            .iter()
            .filter(|o| o.order_uid == order_uid)
            .count()
    }

    pub fn save_calls(&self) -> usize {
        lock(&self.state).save_calls
    }

    pub fn get_calls(&self) -> usize {
        lock(&self.state).get_calls
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StoreError> {
        let mut state = lock(&self.state);
        state.get_calls += 1;
        if state.failing_reads {
            return Err(StoreError::Database(DbErr::Custom("injected read failure".into())));
        }
        state
            .orders
            .iter()
            .find(|o| o.order_uid == order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn list_page(&self, limit: u64, offset: u64) -> Result<(Vec<Order>, u64), StoreError> {
        let state = lock(&self.state);
        if state.failing_reads {
            return Err(StoreError::Database(DbErr::Custom("injected read failure".into())));
        }
        let mut orders: Vec<Order> = state.orders.iter().rev().cloned().collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));

        let total = orders.len() as u64;
        let page = orders
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let hang = {
            let mut state = lock(&self.state);
            state.save_calls += 1;
            state.hanging_saves
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = lock(&self.state);
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(StoreError::Database(DbErr::Custom("injected save failure".into())));
        }
        if state.orders.iter().any(|o| o.order_uid == order.order_uid) {
            return Err(StoreError::AlreadyExists(order.order_uid.clone()));
        }
        state.orders.push(order.clone());
        Ok(())
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Order>,
    failing: bool,
    failing_keys: HashSet<String>,
    hanging: bool,
    get_calls: usize,
    set_calls: usize,
}

/// [`OrderCache`] over a map. TTLs are accepted and ignored.
#[derive(Default)]
pub struct MemoryOrderCache {
    state: Mutex<CacheState>,
}

impl MemoryOrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, order: Order) {
        lock(&self.state).entries.insert(key.to_string(), order);
    }

    /// Read an entry without counting a call.
    pub fn peek(&self, key: &str) -> Option<Order> {
        lock(&self.state).entries.get(key).cloned()
    }

    /// Sorted keys of all entries.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = lock(&self.state).entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Fail every call with a timeout error.
    pub fn fail(&self, fail: bool) {
        lock(&self.state).failing = fail;
    }

    /// Make every write wait forever.
    pub fn hang(&self, hang: bool) {
        lock(&self.state).hanging = hang;
    }

    /// Fail writes for the given keys.
    pub fn fail_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.state)
            .failing_keys
            .extend(keys.into_iter().map(Into::into));
    }

    pub fn get_calls(&self) -> usize {
        lock(&self.state).get_calls
    }

    pub fn set_calls(&self) -> usize {
        lock(&self.state).set_calls
    }
}

#[async_trait]
impl OrderCache for MemoryOrderCache {
    async fn get(&self, key: &str) -> Result<Option<Order>, CacheError> {
        let mut state = lock(&self.state);
        state.get_calls += 1;
        if state.failing {
            return Err(CacheError::Timeout(Duration::ZERO));
        }
        Ok(state.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, order: &Order, _ttl: Duration) -> Result<(), CacheError> {
        let hang = {
            let mut state = lock(&self.state);
            state.set_calls += 1;
            state.hanging
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = lock(&self.state);
        if state.failing || state.failing_keys.contains(key) {
            return Err(CacheError::Timeout(Duration::ZERO));
        }
        state.entries.insert(key.to_string(), order.clone());
        Ok(())
    }
}
