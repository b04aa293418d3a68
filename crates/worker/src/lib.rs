//! Background consumer for item integration events.
//!
//! - `processor.rs`: per-event business reactions
//! - `worker.rs`: receive loop, concurrency limit, and message settlement

pub mod processor;
pub mod worker;

pub use processor::{ItemEventProcessor, ProcessError, ProcessorDelays};
pub use worker::{Worker, WorkerOptions, WorkerStats};
