//! Postgres-backed catalog store.
//!
//! Queries are runtime-checked (`sqlx::query` + `Row::try_get`) so the crate
//! builds without a live database. Schema lives in `migrations/` and is
//! applied by [`PostgresCatalogStore::migrate`] at startup.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{info, instrument};

use catalog_core::page::total_pages;
use catalog_core::{Category, CategoryId, Item, ItemId, ItemSummary, Page, PageRequest};

use super::seed::{default_categories, escape_like};
use super::{CatalogStore, StoreError, StoreResult};

// Names sort in byte order (collation "C"), the same order as the in-memory store.
const LIST_ITEMS_SQL: &str = r#"
    SELECT i.id, i.name, c.name AS category, i.price, i.release_date, i.last_updated_by
    FROM items i
    JOIN categories c ON c.id = i.category_id
    WHERE ($1::text IS NULL OR i.name LIKE $1 ESCAPE '\')
    ORDER BY i.name COLLATE "C", i.id
    OFFSET $2
    LIMIT $3
"#;

const LIST_CATEGORIES_SQL: &str = r#"SELECT id, name FROM categories ORDER BY name COLLATE "C""#;

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        info!("postgres pool initialized");
        Ok(Self::new(pool))
    }

    /// Applies embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_write_error(err: sqlx::Error, category_id: CategoryId) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::UnknownCategory(category_id)
        }
        _ => StoreError::Database(err),
    }
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        id: ItemId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        category_id: CategoryId::from_uuid(row.try_get("category_id")?),
        price: row.try_get("price")?,
        release_date: row.try_get("release_date")?,
        description: row.try_get("description")?,
        last_updated_by: row.try_get("last_updated_by")?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<ItemSummary, sqlx::Error> {
    Ok(ItemSummary {
        id: ItemId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price: row.try_get("price")?,
        release_date: row.try_get("release_date")?,
        last_updated_by: row.try_get("last_updated_by")?,
    })
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self), err)]
    async fn list_items(&self, page: &PageRequest) -> StoreResult<Page<ItemSummary>> {
        let pattern = page.name_filter().map(|f| format!("%{}%", escape_like(f)));

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM items
            WHERE ($1::text IS NULL OR name LIKE $1 ESCAPE '\')
            "#,
        )
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(LIST_ITEMS_SQL)
        .bind(pattern.as_deref())
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let data = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            total_pages: total_pages(u64::try_from(total).unwrap_or(0), page.page_size),
            data,
        })
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, category_id, price, release_date, description, last_updated_by
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn insert_item(&self, item: &Item) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, category_id, price, release_date, description, last_updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*item.id.as_uuid())
        .bind(&item.name)
        .bind(*item.category_id.as_uuid())
        .bind(item.price)
        .bind(item.release_date)
        .bind(&item.description)
        .bind(&item.last_updated_by)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, item.category_id))?;
        Ok(())
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn update_item(&self, item: &Item) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET name = $2, category_id = $3, price = $4, release_date = $5,
                description = $6, last_updated_by = $7
            WHERE id = $1
            "#,
        )
        .bind(*item.id.as_uuid())
        .bind(&item.name)
        .bind(*item.category_id.as_uuid())
        .bind(item.price)
        .bind(item.release_date)
        .bind(&item.description)
        .bind(&item.last_updated_by)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, item.category_id))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn delete_item(&self, id: ItemId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query(LIST_CATEGORIES_SQL)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: CategoryId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    #[instrument(skip(self), err)]
    async fn seed_categories(&self) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent seeders (several replicas starting at once).
        sqlx::query("LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query("SELECT COUNT(*) AS total FROM categories")
            .fetch_one(&mut *tx)
            .await?
            .try_get("total")?;
        if existing > 0 {
            tx.commit().await?;
            return Ok(0);
        }

        let defaults = default_categories();
        for category in &defaults {
            sqlx::query("INSERT INTO categories (id, name) VALUES ($1, $2)")
                .bind(*category.id.as_uuid())
                .bind(&category.name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(count = defaults.len(), "seeded default categories");
        Ok(defaults.len())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
