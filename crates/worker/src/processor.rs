use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use catalog_events::{
    DecodeError, IntegrationEvent, ItemCreatedEvent, ItemDeletedEvent, ItemEvent, ItemUpdatedEvent,
};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("processing of {event_type} was cancelled")]
    Cancelled { event_type: &'static str },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Simulated work per event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorDelays {
    pub created: Duration,
    pub updated: Duration,
    pub deleted: Duration,
}

impl Default for ProcessorDelays {
    fn default() -> Self {
        Self {
            created: Duration::from_millis(100),
            updated: Duration::from_millis(50),
            deleted: Duration::from_millis(30),
        }
    }
}

impl ProcessorDelays {
    pub fn none() -> Self {
        Self::uniform(Duration::ZERO)
    }

    pub fn uniform(delay: Duration) -> Self {
        Self {
            created: delay,
            updated: delay,
            deleted: delay,
        }
    }
}

/// Reacts to item events (notifications, downstream updates).
///
/// Errors are logged and returned so the caller abandons the message.
#[derive(Debug, Clone, Default)]
pub struct ItemEventProcessor {
    delays: ProcessorDelays,
}

impl ItemEventProcessor {
    pub fn new(delays: ProcessorDelays) -> Self {
        Self { delays }
    }

    pub async fn process(
        &self,
        event: &ItemEvent,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        match event {
            ItemEvent::Created(e) => self.process_item_created(e, cancel).await,
            ItemEvent::Updated(e) => self.process_item_updated(e, cancel).await,
            ItemEvent::Deleted(e) => self.process_item_deleted(e, cancel).await,
        }
    }

    pub async fn process_item_created(
        &self,
        event: &ItemCreatedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        info!(item_id = %event.item_id, item_name = %event.name, "processing ItemCreated event");

        if let Err(e) = simulate_work::<ItemCreatedEvent>(self.delays.created, cancel).await {
            error!(item_id = %event.item_id, error = %e, "error processing ItemCreated event");
            return Err(e);
        }

        info!(
            "Notification: New item '{}' created with price ${:.2}",
            event.name, event.price
        );
        info!(item_id = %event.item_id, "successfully processed ItemCreated event");
        Ok(())
    }

    pub async fn process_item_updated(
        &self,
        event: &ItemUpdatedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        info!(item_id = %event.item_id, item_name = %event.name, "processing ItemUpdated event");

        if let Err(e) = simulate_work::<ItemUpdatedEvent>(self.delays.updated, cancel).await {
            error!(item_id = %event.item_id, error = %e, "error processing ItemUpdated event");
            return Err(e);
        }

        info!(
            "Notification: Item '{}' was updated with new price ${:.2}",
            event.name, event.price
        );
        info!(item_id = %event.item_id, "successfully processed ItemUpdated event");
        Ok(())
    }

    pub async fn process_item_deleted(
        &self,
        event: &ItemDeletedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        info!(item_id = %event.item_id, "processing ItemDeleted event");

        if let Err(e) = simulate_work::<ItemDeletedEvent>(self.delays.deleted, cancel).await {
            error!(item_id = %event.item_id, error = %e, "error processing ItemDeleted event");
            return Err(e);
        }

        info!("Notification: Item '{}' has been deleted", event.item_id);
        info!(item_id = %event.item_id, "successfully processed ItemDeleted event");
        Ok(())
    }
}

async fn simulate_work<E: IntegrationEvent>(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), ProcessError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProcessError::Cancelled { event_type: E::EVENT_TYPE }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
