//! Infrastructure layer: configuration, relational store, message broker,
//! and the integration event publisher.

pub mod broker;
pub mod config;
pub mod publisher;
pub mod store;

pub use broker::{
    BrokerError, BrokerMessage, DeadLetter, InMemoryQueue, MessageReceiver, MessageSender,
    ReceivedMessage, RedisStreamsQueue,
};
pub use config::{ApiConfig, ConfigError, Environment, QueueConfig, WorkerConfig};
pub use publisher::{EventPublisher, PublishError};
pub use store::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore, StoreError};
