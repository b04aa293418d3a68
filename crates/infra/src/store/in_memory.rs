use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use catalog_core::page::total_pages;
use catalog_core::{Category, CategoryId, Item, ItemId, ItemSummary, Page, PageRequest};

use super::seed::default_categories;
use super::{CatalogStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<ItemId, Item>,
    categories: HashMap<CategoryId, Category>,
}

/// In-memory store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<Tables>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_items(&self, page: &PageRequest) -> StoreResult<Page<ItemSummary>> {
        let tables = self.read()?;

        let mut matching: Vec<&Item> = tables
            .items
            .values()
            .filter(|item| page.name_filter().is_none_or(|f| item.name.contains(f)))
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);

        let data = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|item| ItemSummary {
                id: item.id,
                name: item.name.clone(),
                category: tables
                    .categories
                    .get(&item.category_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default(),
                price: item.price,
                release_date: item.release_date,
                last_updated_by: item.last_updated_by.clone(),
            })
            .collect();

        Ok(Page {
            total_pages: total_pages(total, page.page_size),
            data,
        })
    }

    async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn insert_item(&self, item: &Item) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.categories.contains_key(&item.category_id) {
            return Err(StoreError::UnknownCategory(item.category_id));
        }
        tables.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_item(&self, item: &Item) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if !tables.items.contains_key(&item.id) {
            return Ok(false);
        }
        if !tables.categories.contains_key(&item.category_id) {
            return Err(StoreError::UnknownCategory(item.category_id));
        }
        tables.items.insert(item.id, item.clone());
        Ok(true)
    }

    async fn delete_item(&self, id: ItemId) -> StoreResult<u64> {
        Ok(u64::from(self.write()?.items.remove(&id).is_some()))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.read()?.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn seed_categories(&self) -> StoreResult<usize> {
        let mut tables = self.write()?;
        if !tables.categories.is_empty() {
            return Ok(0);
        }
        let defaults = default_categories();
        let inserted = defaults.len();
        tables
            .categories
            .extend(defaults.into_iter().map(|c| (c.id, c)));
        Ok(inserted)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }
}
