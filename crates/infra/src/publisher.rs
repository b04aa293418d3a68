//! Integration event publisher.
//!
//! Wraps a [`MessageSender`] and turns typed events into broker messages with
//! the metadata consumers route on.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::SecondsFormat;
use thiserror::Error;
use tracing::{error, info};

use catalog_events::IntegrationEvent;

use crate::broker::{BrokerError, BrokerMessage, CONTENT_TYPE_JSON, MessageSender};

pub const PROP_EVENT_TYPE: &str = "EventType";
pub const PROP_ITEM_ID: &str = "ItemId";
pub const PROP_USER_ID: &str = "UserId";
pub const PROP_TIMESTAMP: &str = "Timestamp";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize {event_type}: {source}")]
    Serialize {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to send {event_type}: {source}")]
    Send {
        event_type: &'static str,
        #[source]
        source: BrokerError,
    },
}

#[derive(Clone)]
pub struct EventPublisher {
    sender: Arc<dyn MessageSender>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher").finish_non_exhaustive()
    }
}

impl EventPublisher {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }

    /// Publishes one event. Failures are logged and returned; there is no retry.
    pub async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<(), PublishError> {
        let correlation_id = event.item_id().map(|id| id.to_string()).unwrap_or_default();

        match self.send(event).await {
            Ok(message_id) => {
                info!(
                    event_type = E::EVENT_TYPE,
                    message_id = %message_id,
                    correlation_id = %correlation_id,
                    "published event"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    event_type = E::EVENT_TYPE,
                    correlation_id = %correlation_id,
                    error = %e,
                    "failed to publish event"
                );
                Err(e)
            }
        }
    }

    async fn send<E: IntegrationEvent>(&self, event: &E) -> Result<String, PublishError> {
        let message = to_message(event)?;
        let message_id = message.message_id.clone();
        self.sender
            .send(message)
            .await
            .map_err(|source| PublishError::Send {
                event_type: E::EVENT_TYPE,
                source,
            })?;
        Ok(message_id)
    }
}

/// Builds the broker message for `event`.
pub fn to_message<E: IntegrationEvent>(event: &E) -> Result<BrokerMessage, PublishError> {
    let body = serde_json::to_vec(event).map_err(|source| PublishError::Serialize {
        event_type: E::EVENT_TYPE,
        source,
    })?;

    let item_id = event.item_id().map(|id| id.to_string());

    let mut properties = BTreeMap::new();
    properties.insert(PROP_EVENT_TYPE.to_string(), E::EVENT_TYPE.to_string());
    if let Some(item_id) = &item_id {
        properties.insert(PROP_ITEM_ID.to_string(), item_id.clone());
    }
    if let Some(user_id) = event.user_id() {
        properties.insert(PROP_USER_ID.to_string(), user_id.to_string());
    }
    properties.insert(
        PROP_TIMESTAMP.to_string(),
        event.timestamp().to_rfc3339_opts(SecondsFormat::Micros, true),
    );

    Ok(BrokerMessage {
        message_id: uuid::Uuid::new_v4().to_string(),
        subject: E::EVENT_TYPE.to_string(),
        content_type: CONTENT_TYPE_JSON.to_string(),
        correlation_id: item_id,
        application_properties: properties,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryQueue, MessageReceiver};
    use async_trait::async_trait;
    use catalog_core::ItemId;
    use catalog_events::{ItemDeletedEvent, ItemEvent};
    use std::time::Duration;

    struct DownSender;

    #[async_trait]
    impl MessageSender for DownSender {
        async fn send(&self, _message: BrokerMessage) -> crate::broker::BrokerResult<()> {
            Err(BrokerError::Connection("connection refused".to_string()))
        }
    }

    #[test]
    fn message_carries_routing_metadata() {
        let item_id = ItemId::new();
        let event = ItemDeletedEvent::new(item_id, "user@example.com");

        let msg = to_message(&event).unwrap();
        assert_eq!(msg.subject, "ItemDeletedEvent");
        assert_eq!(msg.content_type, "application/json");
        assert_eq!(msg.correlation_id, Some(item_id.to_string()));
        assert_eq!(msg.property(PROP_EVENT_TYPE), Some("ItemDeletedEvent"));
        assert_eq!(msg.property(PROP_ITEM_ID), Some(item_id.to_string().as_str()));
        assert_eq!(msg.property(PROP_USER_ID), Some("user@example.com"));
        assert!(msg.property(PROP_TIMESTAMP).unwrap().ends_with('Z'));

        let body: serde_json::Value = serde_json::from_slice(&msg.body).unwrap();
        assert_eq!(body["itemId"], serde_json::json!(item_id.to_string()));
    }

    #[test]
    fn message_ids_are_unique() {
        let event = ItemDeletedEvent::new(ItemId::new(), "user@example.com");
        assert_ne!(
            to_message(&event).unwrap().message_id,
            to_message(&event).unwrap().message_id
        );
    }

    #[tokio::test]
    async fn published_event_decodes_on_the_consumer_side() {
        let queue = Arc::new(InMemoryQueue::default());
        let publisher = EventPublisher::new(queue.clone());
        let item_id = ItemId::new();

        publisher
            .publish(&ItemDeletedEvent::new(item_id, "user@example.com"))
            .await
            .unwrap();

        let batch = queue.receive(1, Duration::from_millis(10)).await.unwrap();
        let msg = &batch[0].message;
        let decoded = ItemEvent::decode(&msg.subject, &msg.body).unwrap().unwrap();
        assert_eq!(decoded.item_id(), item_id);
    }

    /// Event whose body cannot be serialized.
    struct Unserializable;

    impl serde::Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unsupported payload"))
        }
    }

    impl IntegrationEvent for Unserializable {
        const EVENT_TYPE: &'static str = "UnserializableEvent";

        fn item_id(&self) -> Option<ItemId> {
            None
        }

        fn user_id(&self) -> Option<&str> {
            None
        }

        fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }
    }

    #[tokio::test]
    async fn serialization_failure_is_reported_and_nothing_is_sent() {
        let queue = Arc::new(InMemoryQueue::default());
        let publisher = EventPublisher::new(queue.clone());

        let err = publisher.publish(&Unserializable).await.unwrap_err();

        assert!(matches!(
            err,
            PublishError::Serialize { event_type: "UnserializableEvent", .. }
        ));
        assert!(queue.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_reported() {
        let publisher = EventPublisher::new(Arc::new(DownSender));
        let err = publisher
            .publish(&ItemDeletedEvent::new(ItemId::new(), "user@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Send { event_type: "ItemDeletedEvent", .. }));
    }
}
