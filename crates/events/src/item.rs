use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use catalog_core::{CategoryId, Item, ItemId};

use crate::event::IntegrationEvent;

/// Published when a new item is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreatedEvent {
    pub item_id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub price: Decimal,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Published when an item is updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdatedEvent {
    pub item_id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub price: Decimal,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Published when an item is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDeletedEvent {
    pub item_id: ItemId,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ItemCreatedEvent {
    /// Snapshot `item` as created by `user_id`, stamped now.
    pub fn new(item: &Item, user_id: impl Into<String>) -> Self {
        Self {
            item_id: item.id,
            name: item.name.clone(),
            category_id: item.category_id,
            price: item.price,
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }
}

impl ItemUpdatedEvent {
    pub fn new(item: &Item, user_id: impl Into<String>) -> Self {
        Self {
            item_id: item.id,
            name: item.name.clone(),
            category_id: item.category_id,
            price: item.price,
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }
}

impl ItemDeletedEvent {
    pub fn new(item_id: ItemId, user_id: impl Into<String>) -> Self {
        Self {
            item_id,
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }
}

macro_rules! impl_integration_event {
    ($t:ty, $tag:literal) => {
        impl IntegrationEvent for $t {
            const EVENT_TYPE: &'static str = $tag;

            fn item_id(&self) -> Option<ItemId> {
                Some(self.item_id)
            }

            fn user_id(&self) -> Option<&str> {
                Some(&self.user_id)
            }

            fn timestamp(&self) -> DateTime<Utc> {
                self.timestamp
            }
        }
    };
}

impl_integration_event!(ItemCreatedEvent, "ItemCreatedEvent");
impl_integration_event!(ItemUpdatedEvent, "ItemUpdatedEvent");
impl_integration_event!(ItemDeletedEvent, "ItemDeletedEvent");

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {subject} body: {source}")]
    Malformed {
        subject: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Any item event, decoded from a broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    Created(ItemCreatedEvent),
    Updated(ItemUpdatedEvent),
    Deleted(ItemDeletedEvent),
}

impl ItemEvent {
    /// Decode a message body according to its subject tag.
    ///
    /// Returns `Ok(None)` for subjects this crate does not know.
    pub fn decode(subject: &str, body: &[u8]) -> Result<Option<Self>, DecodeError> {
        let event = match subject {
            ItemCreatedEvent::EVENT_TYPE => Self::Created(parse(ItemCreatedEvent::EVENT_TYPE, body)?),
            ItemUpdatedEvent::EVENT_TYPE => Self::Updated(parse(ItemUpdatedEvent::EVENT_TYPE, body)?),
            ItemDeletedEvent::EVENT_TYPE => Self::Deleted(parse(ItemDeletedEvent::EVENT_TYPE, body)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => ItemCreatedEvent::EVENT_TYPE,
            Self::Updated(_) => ItemUpdatedEvent::EVENT_TYPE,
            Self::Deleted(_) => ItemDeletedEvent::EVENT_TYPE,
        }
    }

    pub fn item_id(&self) -> ItemId {
        match self {
            Self::Created(e) => e.item_id,
            Self::Updated(e) => e.item_id,
            Self::Deleted(e) => e.item_id,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(subject: &'static str, body: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(body).map_err(|source| DecodeError::Malformed { subject, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item() -> Item {
        Item {
            id: ItemId::new(),
            name: "Widget".to_string(),
            category_id: CategoryId::new(),
            price: Decimal::new(1950, 2),
            release_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            description: "A widget".to_string(),
            last_updated_by: "owner@example.com".to_string(),
        }
    }

    #[test]
    fn created_event_uses_camel_case_fields() {
        let event = ItemCreatedEvent::new(&item(), "user@example.com");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["itemId"], event.item_id.to_string());
        assert_eq!(json["categoryId"], event.category_id.to_string());
        assert_eq!(json["userId"], "user@example.com");
        assert_eq!(json["price"].as_f64(), Some(19.5));
        assert!(json.get("timestamp").is_some());
        assert!(json.get("item_id").is_none());
    }

    #[test]
    fn decode_dispatches_on_subject() {
        let event = ItemDeletedEvent::new(ItemId::new(), "user@example.com");
        let body = serde_json::to_vec(&event).unwrap();

        let decoded = ItemEvent::decode("ItemDeletedEvent", &body).unwrap();
        assert_eq!(decoded, Some(ItemEvent::Deleted(event)));
    }

    #[test]
    fn unknown_subject_is_not_an_error() {
        assert!(ItemEvent::decode("OrderShipped", b"{}").unwrap().is_none());
    }

    #[test]
    fn malformed_body_for_known_subject_is_an_error() {
        let err = ItemEvent::decode("ItemCreatedEvent", b"{\"itemId\":42}").unwrap_err();
        assert!(err.to_string().starts_with("malformed ItemCreatedEvent body"));
    }

    #[test]
    fn updated_event_survives_the_wire() {
        let event = ItemUpdatedEvent::new(&item(), "user@example.com");
        let body = serde_json::to_vec(&event).unwrap();
        match ItemEvent::decode(ItemUpdatedEvent::EVENT_TYPE, &body).unwrap() {
            Some(ItemEvent::Updated(decoded)) => {
                assert_eq!(decoded.price, event.price);
                assert_eq!(decoded.timestamp, event.timestamp);
            }
            other => panic!("expected updated event, got {other:?}"),
        }
    }
}
