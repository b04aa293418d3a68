use chrono::{DateTime, Utc};
use serde::Serialize;

use catalog_core::ItemId;

/// An event meant for external consumers / message brokers.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - serialized as camelCase JSON
/// - routed by their [`IntegrationEvent::EVENT_TYPE`] subject tag
pub trait IntegrationEvent: Serialize + Send + Sync {
    /// Stable subject tag consumers dispatch on (e.g. `"ItemCreatedEvent"`).
    const EVENT_TYPE: &'static str;

    /// The item this event is about; used as the broker correlation id.
    fn item_id(&self) -> Option<ItemId>;

    /// The user that caused the event.
    fn user_id(&self) -> Option<&str>;

    /// When the event was generated.
    fn timestamp(&self) -> DateTime<Utc>;
}
