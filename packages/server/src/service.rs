//! Order ingestion and the cache-aside read path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{DecodeError, DlqErrorCode, Order, ValidatedOrderEvent, order_cache_key};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheError, OrderCache};
use crate::store::{OrderStore, StoreError};
use crate::tasks::BackgroundTasks;

/// Successful result of ingesting one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    /// The order was already ingested; nothing was written.
    AlreadyExists,
}

/// How the retry policy must treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    /// Retrying cannot help; dead-letter with this reason.
    Terminal(DlqErrorCode),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl IngestError {
    pub fn class(&self) -> FailureClass {
        match self {
            IngestError::Decode(_) => FailureClass::Terminal(DlqErrorCode::DeserializationError),
            IngestError::Storage(_) => FailureClass::Retryable,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub loaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    tasks: BackgroundTasks,
    timeouts: ServiceTimeouts,
}

/// Bounds on calls the service makes to its backends.
#[derive(Debug, Clone, Copy)]
pub struct ServiceTimeouts {
    pub store: Duration,
    pub cache: Duration,
    pub cache_ttl: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        tasks: BackgroundTasks,
        timeouts: ServiceTimeouts,
    ) -> Self {
        Self {
            store,
            cache,
            tasks,
            timeouts,
        }
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Ingest a validated event.
    ///
    /// A cache hit only saves a store round trip; the unique `order_uid` in
    /// the store decides whether the order is new.
    #[instrument(skip_all, fields(order_uid = %event.order_uid()))]
    pub async fn process(&self, event: &ValidatedOrderEvent) -> Result<IngestOutcome, IngestError> {
        let key = order_cache_key(event.order_uid());
        if self.cached(&key).await.is_some() {
            info!("Order already exists (found in cache), skipping");
            return Ok(IngestOutcome::AlreadyExists);
        }

        let order = event.to_order();
        match self.bounded(self.store.save(&order)).await {
            Ok(()) => {
                info!(items = order.items.len(), "Order created");
                self.refresh_cache(key, order);
                Ok(IngestOutcome::Created)
            }
            Err(StoreError::AlreadyExists(_)) => {
                info!("Order already exists, skipping");
                self.refresh_cache(key, order);
                Ok(IngestOutcome::AlreadyExists)
            }
            Err(e) => Err(IngestError::Storage(e)),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StoreError> {
        let key = order_cache_key(order_uid);
        if let Some(order) = self.cached(&key).await {
            debug!("Cache hit");
            return Ok(order);
        }

        let order = self.bounded(self.store.get_by_uid(order_uid)).await?;
        self.refresh_cache(key, order.clone());
        Ok(order)
    }

    /// A page of orders, newest first. Always served by the store.
    ///
    /// `page` is 1-based.
    pub async fn list_orders(&self, page: u64, limit: u64) -> Result<OrderPage, StoreError> {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let (orders, total) = self.bounded(self.store.list_page(limit, offset)).await?;
        Ok(OrderPage { orders, total })
    }

    /// Load the `n` most recent orders into the cache.
    ///
    /// Individual cache failures are counted, not returned.
    pub async fn warm_cache(&self, n: u64) -> Result<WarmupReport, StoreError> {
        info!(n, "Warming up cache");
        let (orders, _) = self.bounded(self.store.list_page(n, 0)).await?;

        let mut report = WarmupReport::default();
        for order in &orders {
            let key = order_cache_key(&order.order_uid);
            match self.write_cache(&key, order).await {
                Ok(()) => report.loaded += 1,
                Err(e) => {
                    warn!(order_uid = %order.order_uid, error = %e, "Failed to cache order during warmup");
                    report.failed += 1;
                }
            }
        }

        info!(loaded = report.loaded, failed = report.failed, "Cache warmup completed");
        Ok(report)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.timeouts.store;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout(limit))?
    }

    /// Cache lookup where every failure reads as a miss.
    async fn cached(&self, key: &str) -> Option<Order> {
        match tokio::time::timeout(self.timeouts.cache, self.cache.get(key)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!(key, error = %e, "Failed to get order from cache");
                None
            }
            Err(_) => {
                warn!(key, "Cache lookup timed out");
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, order: &Order) -> Result<(), CacheError> {
        let limit = self.timeouts.cache;
        tokio::time::timeout(limit, self.cache.set(key, order, self.timeouts.cache_ttl))
            .await
            .map_err(|_| CacheError::Timeout(limit))?
    }

    fn refresh_cache(&self, key: String, order: Order) {
        let this = self.clone();
        self.tasks.spawn("cache_refresh", async move {
            if let Err(e) = this.write_cache(&key, &order).await {
                warn!(key = %key, error = %e, "Async cache write failed");
            }
        });
    }
}
