//! Integration events published by the catalog API and consumed by workers.

pub mod event;
pub mod item;

pub use event::IntegrationEvent;
pub use item::{DecodeError, ItemCreatedEvent, ItemDeletedEvent, ItemEvent, ItemUpdatedEvent};
