use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use catalog_core::item;
use catalog_core::page::{DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE};
use catalog_core::{
    Category, CategoryId, DomainResult, Item, ItemDraft, ItemId, ItemSummary, Page, PageRequest,
    ValidationErrors,
};

// -------------------------
// Request DTOs
// -------------------------

/// `GET /items` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemsQuery {
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    pub name: Option<String>,
}

impl From<ListItemsQuery> for PageRequest {
    fn from(q: ListItemsQuery) -> Self {
        PageRequest {
            page_number: q.page_number.unwrap_or(DEFAULT_PAGE_NUMBER),
            page_size: q.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            name: q.name,
        }
    }
}

/// A typed body field that may be absent or fail to parse.
///
/// Both cases surface as validation errors on the field instead of rejecting
/// the whole body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput<T> {
    Missing,
    Invalid,
    Present(T),
}

impl<T> Default for FieldInput<T> {
    fn default() -> Self {
        Self::Missing
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for FieldInput<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Self::Missing);
        }
        Ok(serde_json::from_value(value).map_or(Self::Invalid, Self::Present))
    }
}

impl<T> FieldInput<T> {
    fn take(self, errors: &mut ValidationErrors, field: &str) -> Option<T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Missing => {
                errors.add(field, format!("The {field} field is required."));
                None
            }
            Self::Invalid => {
                errors.add(field, format!("The value for {field} is not valid."));
                None
            }
        }
    }
}

/// Body of `POST /items` and `PUT /items/:id`.
///
/// Only syntactically broken JSON is rejected outright; every field problem
/// is reported through [`ItemRequest::into_draft`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    #[serde(default)]
    pub name: FieldInput<String>,
    #[serde(default)]
    pub category_id: FieldInput<CategoryId>,
    #[serde(default)]
    pub price: FieldInput<Decimal>,
    #[serde(default)]
    pub release_date: FieldInput<NaiveDate>,
    #[serde(default)]
    pub description: FieldInput<String>,
}

impl ItemRequest {
    /// Convert into a validated draft, collecting every field failure.
    pub fn into_draft(self) -> DomainResult<ItemDraft> {
        let mut errors = ValidationErrors::new();

        let name = self.name.take(&mut errors, "name");
        let category_id = self.category_id.take(&mut errors, "categoryId");
        let price = self.price.take(&mut errors, "price");
        let release_date = self.release_date.take(&mut errors, "releaseDate");
        let description = self.description.take(&mut errors, "description");

        if let Some(name) = &name {
            item::validate_name(&mut errors, name);
        }
        if let Some(description) = &description {
            item::validate_description(&mut errors, description);
        }
        if let Some(price) = price {
            item::validate_price(&mut errors, price);
        }

        let (Some(name), Some(category_id), Some(price), Some(release_date), Some(description)) =
            (name, category_id, price, release_date, description)
        else {
            return Err(errors.into());
        };
        errors.into_result()?;

        Ok(ItemDraft {
            name,
            category_id,
            price,
            release_date,
            description,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    pub id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub price: Decimal,
    pub release_date: NaiveDate,
    pub description: String,
    pub last_updated_by: String,
}

impl From<Item> for ItemDetails {
    fn from(i: Item) -> Self {
        Self {
            id: i.id,
            name: i.name,
            category_id: i.category_id,
            price: i.price,
            release_date: i.release_date,
            description: i.description,
            last_updated_by: i.last_updated_by,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummaryResponse {
    pub id: ItemId,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub release_date: NaiveDate,
    pub last_updated_by: String,
}

impl From<ItemSummary> for ItemSummaryResponse {
    fn from(s: ItemSummary) -> Self {
        Self {
            id: s.id,
            name: s.name,
            category: s.category,
            price: s.price,
            release_date: s.release_date,
            last_updated_by: s.last_updated_by,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub total_pages: u64,
    pub data: Vec<T>,
}

impl<T, U: From<T>> From<Page<T>> for PageResponse<U> {
    fn from(p: Page<T>) -> Self {
        let p = p.map(U::from);
        Self {
            total_pages: p.total_pages,
            data: p.data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub id: CategoryId,
    pub name: String,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
        }
    }
}
