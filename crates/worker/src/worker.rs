use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use catalog_events::ItemEvent;
use catalog_infra::config::{DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_PREFETCH_COUNT};
use catalog_infra::{MessageReceiver, ReceivedMessage, WorkerConfig};

use crate::processor::{ItemEventProcessor, ProcessError};

/// Worker loop tuning.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Messages processed at the same time.
    pub max_concurrent_calls: usize,
    /// Messages requested per receive call.
    pub prefetch_count: usize,
    /// How long one receive call waits for messages.
    pub receive_wait: Duration,
    /// Pause after a failed receive.
    pub error_backoff: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            receive_wait: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
            name: "items-events".to_string(),
        }
    }
}

impl WorkerOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max.max(1);
        self
    }

    pub fn with_prefetch_count(mut self, count: usize) -> Self {
        self.prefetch_count = count.max(1);
        self
    }

    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait;
        self
    }
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        WorkerOptions::default()
            .with_name(config.queue.queue_name.clone())
            .with_max_concurrent_calls(config.max_concurrent_calls)
            .with_prefetch_count(config.prefetch_count)
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub completed: u64,
    pub abandoned: u64,
    /// Completed without processing because the subject was not recognized.
    pub unknown_subjects: u64,
    pub receive_errors: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Processed,
    UnknownSubject,
}

/// Consumes the item events queue.
///
/// Messages are settled explicitly: success or an unknown subject completes,
/// any error abandons (the broker decides on redelivery or dead-lettering).
pub struct Worker<R: MessageReceiver + 'static> {
    receiver: Arc<R>,
    processor: Arc<ItemEventProcessor>,
    options: WorkerOptions,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<R: MessageReceiver + 'static> Worker<R> {
    pub fn new(receiver: Arc<R>, processor: ItemEventProcessor, options: WorkerOptions) -> Self {
        Self {
            receiver,
            processor: Arc::new(processor),
            options,
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Runs until `shutdown` is cancelled, then waits for in-flight messages
    /// to be settled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_calls));
        let mut in_flight = JoinSet::new();

        info!(
            worker = %self.options.name,
            max_concurrent_calls = self.options.max_concurrent_calls,
            prefetch_count = self.options.prefetch_count,
            "starting message processor"
        );

        'receive: loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(worker = %self.options.name, error = %e, "message task panicked");
                }
            }

            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.receiver.receive(self.options.prefetch_count, self.options.receive_wait) => r,
            };

            let batch = match received {
                Ok(batch) => batch,
                Err(e) => {
                    error!(worker = %self.options.name, error = %e, "message processor error");
                    update(&self.stats, |s| s.receive_errors += 1);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.options.error_backoff) => continue,
                    }
                }
            };

            let mut pending = batch.into_iter();
            while let Some(message) = pending.next() {
                update(&self.stats, |s| s.received += 1);

                let permit = tokio::select! {
                    _ = shutdown.cancelled() => None,
                    p = semaphore.clone().acquire_owned() => p.ok(),
                };
                let Some(permit) = permit else {
                    // Shutting down: hand the unstarted messages back.
                    for message in std::iter::once(message).chain(pending) {
                        abandon(self.receiver.as_ref(), &message, &self.stats).await;
                    }
                    break 'receive;
                };

                let receiver = self.receiver.clone();
                let processor = self.processor.clone();
                let stats = self.stats.clone();
                let cancel = shutdown.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    update(&stats, |s| {
                        s.in_flight += 1;
                        s.peak_in_flight = s.peak_in_flight.max(s.in_flight);
                    });
                    handle_message(receiver.as_ref(), &processor, &message, &cancel, &stats).await;
                    update(&stats, |s| s.in_flight -= 1);
                });
            }
        }

        info!(worker = %self.options.name, in_flight = in_flight.len(), "stopping message processor");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(worker = %self.options.name, error = %e, "message task panicked");
            }
        }
        info!(worker = %self.options.name, "message processor stopped");
    }
}

async fn handle_message<R: MessageReceiver + ?Sized>(
    receiver: &R,
    processor: &ItemEventProcessor,
    message: &ReceivedMessage,
    cancel: &CancellationToken,
    stats: &Mutex<WorkerStats>,
) {
    let msg = &message.message;
    info!(
        event_type = %msg.subject,
        correlation_id = msg.correlation_id.as_deref().unwrap_or(""),
        message_id = %msg.message_id,
        delivery_count = message.delivery_count,
        "received message"
    );

    match dispatch(processor, &msg.subject, &msg.body, cancel).await {
        Ok(outcome) => {
            if let Err(e) = receiver.complete(message).await {
                error!(message_id = %msg.message_id, error = %e, "failed to complete message");
                return;
            }
            update(stats, |s| {
                s.completed += 1;
                if matches!(outcome, Outcome::UnknownSubject) {
                    s.unknown_subjects += 1;
                }
            });
            info!(
                message_id = %msg.message_id,
                event_type = %msg.subject,
                "successfully processed message"
            );
        }
        Err(e) => {
            error!(
                message_id = %msg.message_id,
                event_type = %msg.subject,
                error = %e,
                "error processing message"
            );
            abandon(receiver, message, stats).await;
        }
    }
}

async fn dispatch(
    processor: &ItemEventProcessor,
    subject: &str,
    body: &[u8],
    cancel: &CancellationToken,
) -> Result<Outcome, ProcessError> {
    match ItemEvent::decode(subject, body)? {
        Some(event) => {
            processor.process(&event, cancel).await?;
            Ok(Outcome::Processed)
        }
        None => {
            warn!(event_type = %subject, "unknown event type");
            Ok(Outcome::UnknownSubject)
        }
    }
}

async fn abandon<R: MessageReceiver + ?Sized>(
    receiver: &R,
    message: &ReceivedMessage,
    stats: &Mutex<WorkerStats>,
) {
    match receiver.abandon(message).await {
        Ok(()) => update(stats, |s| s.abandoned += 1),
        Err(e) => error!(message_id = %message.message.message_id, error = %e, "failed to abandon message"),
    }
}

fn update(stats: &Mutex<WorkerStats>, f: impl FnOnce(&mut WorkerStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}
