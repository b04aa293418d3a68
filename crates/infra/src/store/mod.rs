//! Relational store seam for items and categories.
//!
//! Handlers talk to `dyn CatalogStore`; the concrete backend (in-memory or
//! Postgres) is chosen once at startup.

use async_trait::async_trait;
use thiserror::Error;

use catalog_core::{Category, CategoryId, Item, ItemId, ItemSummary, Page, PageRequest};

pub mod in_memory;
pub mod postgres;
pub mod seed;

pub use in_memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;
pub use seed::DEFAULT_CATEGORIES;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced category does not exist (foreign key violation).
    #[error("category {0} does not exist")]
    UnknownCategory(CategoryId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Filtered page of item summaries, ordered by name in byte order
    /// (uppercase before lowercase), then id.
    ///
    /// The name filter is a case-sensitive substring match; `%` and `_` in
    /// the filter are matched literally.
    async fn list_items(&self, page: &PageRequest) -> StoreResult<Page<ItemSummary>>;

    async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>>;

    async fn insert_item(&self, item: &Item) -> StoreResult<()>;

    /// Returns `false` when no item with `item.id` exists.
    async fn update_item(&self, item: &Item) -> StoreResult<bool>;

    /// Deletes by id, returning the number of rows removed (0 or 1).
    async fn delete_item(&self, id: ItemId) -> StoreResult<u64>;

    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    /// Inserts the default categories if the category table is empty.
    /// Returns how many were inserted.
    async fn seed_categories(&self) -> StoreResult<usize>;

    /// Round-trips to the backend; used by the readiness probe.
    async fn ping(&self) -> StoreResult<()>;
}
