use std::sync::Arc;

use anyhow::Context;

use catalog_infra::{
    ApiConfig, CatalogStore, EventPublisher, InMemoryCatalogStore, InMemoryQueue, MessageSender,
    PostgresCatalogStore, RedisStreamsQueue,
};

/// Backing services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn CatalogStore>,
    pub publisher: EventPublisher,
}

impl AppServices {
    pub fn new(store: Arc<dyn CatalogStore>, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            store,
            publisher: EventPublisher::new(sender),
        }
    }
}

/// Wires the store and broker selected by `USE_PERSISTENT_STORES`.
///
/// Both modes seed the default categories before serving.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let services = if config.use_persistent_stores {
        build_persistent_services(config).await?
    } else {
        tracing::info!("using in-memory store and queue");
        build_in_memory_services(config)
    };

    let seeded = services
        .store
        .seed_categories()
        .await
        .context("failed to seed categories")?;
    if seeded > 0 {
        tracing::info!(count = seeded, "seeded default categories");
    }

    Ok(services)
}

fn build_in_memory_services(config: &ApiConfig) -> AppServices {
    AppServices::new(
        Arc::new(InMemoryCatalogStore::new()),
        Arc::new(InMemoryQueue::new(config.queue.max_delivery_count)),
    )
}

async fn build_persistent_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let store = PostgresCatalogStore::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    store.migrate().await.context("failed to run migrations")?;

    let queue = RedisStreamsQueue::connect(&config.queue)
        .await
        .context("failed to connect to Redis")?;

    tracing::info!(queue = %config.queue.queue_name, "using Postgres store and Redis Streams queue");
    Ok(AppServices::new(Arc::new(store), Arc::new(queue)))
}
