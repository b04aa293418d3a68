//! `catalog-core`: domain building blocks for the item catalog.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod item;
pub mod page;
pub mod validation;

pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, ItemId};
pub use item::{Category, Item, ItemDraft, ItemSummary};
pub use page::{Page, PageRequest};
pub use validation::ValidationErrors;
