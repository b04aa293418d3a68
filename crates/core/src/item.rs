//! Catalog records: items and categories.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{CategoryId, ItemId};
use crate::validation::{ValidationErrors, require_text};

pub const ITEM_NAME_MAX_LEN: usize = 50;
pub const ITEM_DESCRIPTION_MAX_LEN: usize = 500;
pub const CATEGORY_NAME_MAX_LEN: usize = 20;

/// Price bounds, inclusive. Storage is `NUMERIC(5,2)`.
pub const PRICE_MIN: Decimal = Decimal::ONE;
pub const PRICE_MAX: Decimal = Decimal::ONE_HUNDRED;
pub const PRICE_SCALE: u32 = 2;

/// A catalog item as persisted by the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub price: Decimal,
    pub release_date: NaiveDate,
    pub description: String,
    /// Email of the last user that created or modified the item.
    pub last_updated_by: String,
}

impl Item {
    /// Build a new item from a validated draft.
    pub fn create(id: ItemId, draft: ItemDraft, user: impl Into<String>) -> Self {
        Self {
            id,
            name: draft.name,
            category_id: draft.category_id,
            price: draft.price,
            release_date: draft.release_date,
            description: draft.description,
            last_updated_by: user.into(),
        }
    }

    /// Overwrite every mutable field from `draft`, stamping the modifying user.
    pub fn apply(&mut self, draft: ItemDraft, user: impl Into<String>) {
        self.name = draft.name;
        self.category_id = draft.category_id;
        self.price = draft.price;
        self.release_date = draft.release_date;
        self.description = draft.description;
        self.last_updated_by = user.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// List projection of an item joined with its category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub release_date: NaiveDate,
    pub last_updated_by: String,
}

/// Writable item fields, shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub name: String,
    pub category_id: CategoryId,
    pub price: Decimal,
    pub release_date: NaiveDate,
    pub description: String,
}

impl ItemDraft {
    /// Check every field rule and report all failures together.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_name(&mut errors, &self.name);
        validate_description(&mut errors, &self.description);
        validate_price(&mut errors, self.price);
        errors.into_result()
    }
}

pub fn validate_name(errors: &mut ValidationErrors, name: &str) {
    require_text(errors, "name", name, ITEM_NAME_MAX_LEN);
}

pub fn validate_description(errors: &mut ValidationErrors, description: &str) {
    require_text(errors, "description", description, ITEM_DESCRIPTION_MAX_LEN);
}

/// Price must lie in `[PRICE_MIN, PRICE_MAX]` with at most two decimals.
pub fn validate_price(errors: &mut ValidationErrors, price: Decimal) {
    if price < PRICE_MIN || price > PRICE_MAX {
        errors.add(
            "price",
            format!("The field price must be between {PRICE_MIN} and {PRICE_MAX}."),
        );
    } else if price.normalize().scale() > PRICE_SCALE {
        errors.add(
            "price",
            format!("The field price must have at most {PRICE_SCALE} decimal places."),
        );
    }
}

/// Check a category name against the stored column width.
pub fn validate_category_name(name: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    require_text(&mut errors, "name", name, CATEGORY_NAME_MAX_LEN);
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn draft() -> ItemDraft {
        ItemDraft {
            name: "Test Item".to_string(),
            category_id: CategoryId::new(),
            price: Decimal::new(1000, 2),
            release_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            description: "Test Description".to_string(),
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn empty_name_is_rejected() {
        let d = ItemDraft { name: String::new(), ..draft() };
        let errors = d.validate().unwrap_err();
        assert!(errors.contains("name"));
        assert!(!errors.contains("description"));
    }

    #[test]
    fn reports_every_failing_field() {
        let d = ItemDraft {
            name: "x".repeat(ITEM_NAME_MAX_LEN + 1),
            description: " ".to_string(),
            price: Decimal::new(10001, 2),
            ..draft()
        };
        let errors = d.validate().unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["description", "name", "price"]);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        assert!(ItemDraft { price: PRICE_MIN, ..draft() }.validate().is_ok());
        assert!(ItemDraft { price: PRICE_MAX, ..draft() }.validate().is_ok());
        assert!(ItemDraft { price: Decimal::new(99, 2), ..draft() }.validate().is_err());
    }

    #[test]
    fn price_with_three_decimals_is_rejected() {
        let errors = ItemDraft { price: Decimal::new(10125, 3), ..draft() }
            .validate()
            .unwrap_err();
        assert!(errors.contains("price"));

        // Trailing zeros do not count against the scale.
        assert!(ItemDraft { price: Decimal::new(10100, 3), ..draft() }.validate().is_ok());
    }

    #[test]
    fn apply_overwrites_fields_and_stamps_user() {
        let mut item = Item::create(ItemId::new(), draft(), "a@example.com");
        let update = ItemDraft { name: "Renamed".to_string(), ..draft() };

        item.apply(update.clone(), "b@example.com");

        assert_eq!(item.name, "Renamed");
        assert_eq!(item.category_id, update.category_id);
        assert_eq!(item.last_updated_by, "b@example.com");
    }

    #[test]
    fn category_names_are_limited_to_twenty_chars() {
        assert!(validate_category_name("Favorites").is_ok());
        assert!(validate_category_name(&"c".repeat(21)).is_err());
    }

    proptest! {
        /// Any name within the length limit (and not blank) is accepted.
        #[test]
        fn names_within_limit_are_accepted(name in "[a-zA-Z0-9][a-zA-Z0-9 ]{0,49}") {
            let d = ItemDraft { name, ..draft() };
            prop_assert!(d.validate().is_ok());
        }

        /// Whole-cent prices inside [1, 100] are accepted, everything else rejected.
        #[test]
        fn cent_prices_follow_the_range(cents in 0i64..20_000) {
            let price = Decimal::new(cents, 2);
            let ok = ItemDraft { price, ..draft() }.validate().is_ok();
            prop_assert_eq!(ok, (100..=10_000).contains(&cents));
        }
    }
}
