//! Wiring and lifecycle of the ingestion pipeline.

use std::sync::Arc;
use std::time::Duration;

use mq::{BroccoliQueueClient, MqConfig, MqError, QueueClient};
use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{CacheError, OrderCache, RedisOrderCache};
use crate::config::AppConfig;
use crate::consumers::{ConsumerPool, OrderMessageHandler, PoolError, RetryPolicy};
use crate::database::init_db;
use crate::service::{OrderService, ServiceTimeouts};
use crate::state::AppState;
use crate::store::{OrderStore, SeaOrmOrderStore};
use crate::tasks::{BackgroundTasks, ShutdownError};

#[derive(Debug, Error)]
pub enum StartError {
    #[error("database: {0}")]
    Database(#[from] DbErr),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("queue: {0}")]
    Queue(#[from] MqError),
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("stopping consumers failed: {0}")]
    Consumers(#[from] PoolError),

    #[error(transparent)]
    Tasks(#[from] ShutdownError),

    #[error("closing the database failed: {0}")]
    Database(DbErr),
}

/// Collaborators the pipeline runs against.
pub struct Components {
    pub store: Arc<dyn OrderStore>,
    pub cache: Arc<dyn OrderCache>,
    pub queue: Arc<dyn QueueClient>,
    /// Closed last during [`App::stop`], if present.
    pub db: Option<DatabaseConnection>,
}

/// A running ingestion pipeline and the state shared with the read API.
pub struct App {
    config: Arc<AppConfig>,
    service: OrderService,
    shutdown: CancellationToken,
    pool: ConsumerPool,
    db: Option<DatabaseConnection>,
}

impl App {
    /// Connect to Postgres, Redis and the broker, then [`launch`](Self::launch).
    pub async fn start(config: AppConfig) -> Result<Self, StartError> {
        let db = init_db(&config.database).await?;
        info!("Connected to database");

        let cache = RedisOrderCache::connect(&config.cache.url, config.cache.op_timeout()).await?;

        let mq_config = MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
            poll_interval: Duration::from_millis(config.mq.poll_interval_ms),
        };
        let queue = BroccoliQueueClient::connect(&mq_config, &config.mq.queue_name).await?;
        info!(queue = %config.mq.queue_name, "Connected to message queue");

        if config.mq.recover_on_start {
            queue.recover().await?;
        }

        let components = Components {
            store: Arc::new(SeaOrmOrderStore::new(db.clone())),
            cache: Arc::new(cache),
            queue: Arc::new(queue),
            db: Some(db),
        };

        Ok(Self::launch(config, components).await)
    }

    /// Build the service, warm the cache and start the consumer pool.
    pub async fn launch(config: AppConfig, components: Components) -> Self {
        let config = Arc::new(config);
        let service = OrderService::new(
            components.store,
            components.cache,
            BackgroundTasks::new(),
            ServiceTimeouts {
                store: config.database.op_timeout(),
                cache: config.cache.op_timeout(),
                cache_ttl: config.cache.ttl(),
            },
        );

        if let Err(e) = service.warm_cache(config.cache.warmup_size).await {
            warn!(error = %e, "Cache warmup failed, continuing with a cold cache");
        }

        let handler = Arc::new(OrderMessageHandler::new(
            service.clone(),
            RetryPolicy::new(config.ingest.max_retries, config.ingest.retry_delay()),
            Arc::clone(&components.queue),
            config.mq.dlq_queue_name.clone(),
        ));

        let shutdown = CancellationToken::new();
        let pool = ConsumerPool::start(
            components.queue,
            handler,
            &shutdown,
            config.ingest.consumer_count,
        );

        Self {
            config,
            service,
            shutdown,
            pool,
            db: components.db,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            service: self.service.clone(),
            config: Arc::clone(&self.config),
        }
    }

    pub fn service(&self) -> &OrderService {
        &self.service
    }

    /// Ordered drain: stop consumers, wait for background cache writes, then
    /// release the database. The first two steps are each bounded by
    /// `shutdown.timeout_secs`.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned.
    pub async fn stop(self) -> Result<(), StopError> {
        info!("Stopping ingestion pipeline");
        self.shutdown.cancel();

        let mut first_error: Option<StopError> = None;

        if let Err(e) = self.pool.close(self.config.shutdown.timeout()).await {
            error!(error = %e, "Consumers did not stop cleanly");
            first_error.get_or_insert(StopError::Consumers(e));
        }

        if let Err(e) = self
            .service
            .tasks()
            .shutdown(self.config.shutdown.timeout())
            .await
        {
            error!(error = %e, "Background tasks did not drain");
            first_error.get_or_insert(StopError::Tasks(e));
        }

        if let Some(db) = self.db {
            info!("Closing DB connection");
            if let Err(e) = db.close().await {
                error!(error = %e, "Failed to close database");
                first_error.get_or_insert(StopError::Database(e));
            }
        }

        match first_error {
            None => {
                info!("Ingestion pipeline stopped");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }
}
