use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::warn;

use super::{
    BrokerError, BrokerMessage, BrokerResult, DeadLetter, MessageReceiver, MessageSender,
    ReceivedMessage,
};
use crate::config::DEFAULT_MAX_DELIVERY_COUNT;

#[derive(Debug, Clone)]
struct Entry {
    message: BrokerMessage,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Entry>,
    locked: HashMap<String, Entry>,
    dead_letters: VecDeque<DeadLetter>,
    sent: VecDeque<BrokerMessage>,
    dropped: u64,
    next_lock: u64,
}

/// Messages kept in each of the ready queue, the send history and the
/// dead-letter list.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

fn push_bounded<T>(items: &mut VecDeque<T>, item: T, capacity: usize) -> Option<T> {
    let evicted = if items.len() >= capacity { items.pop_front() } else { None };
    items.push_back(item);
    evicted
}

/// In-process queue for tests/dev.
///
/// Models peek-lock delivery: abandoned messages go back to the front of the
/// queue until `max_delivery_count` deliveries, then move to the dead-letter
/// list.
///
/// Nothing consumes the queue when the API runs without a worker, so every
/// list is bounded by `capacity`: once the ready queue is full the oldest
/// undelivered message is dropped.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    available: Notify,
    max_delivery_count: u32,
    capacity: usize,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELIVERY_COUNT)
    }
}

impl InMemoryQueue {
    pub fn new(max_delivery_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            max_delivery_count: max_delivery_count.max(1),
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn lock(&self) -> BrokerResult<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Connection("in-memory queue lock poisoned".to_string()))
    }

    /// The most recent sends (up to the capacity), in send order.
    pub fn sent(&self) -> Vec<BrokerMessage> {
        self.lock().map(|s| s.sent.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock()
            .map(|s| s.dead_letters.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Undelivered messages dropped because the ready queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().map(|s| s.dropped).unwrap_or(0)
    }

    /// Messages waiting for delivery (excludes locked ones).
    pub fn pending(&self) -> usize {
        self.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    pub fn in_flight(&self) -> usize {
        self.lock().map(|s| s.locked.len()).unwrap_or(0)
    }

    fn take_batch(&self, max: usize) -> BrokerResult<Vec<ReceivedMessage>> {
        let mut state = self.lock()?;
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(mut entry) = state.ready.pop_front() else {
                break;
            };
            entry.delivery_count += 1;
            state.next_lock += 1;
            let lock_token = format!("lock-{}", state.next_lock);

            batch.push(ReceivedMessage {
                message: entry.message.clone(),
                lock_token: lock_token.clone(),
                delivery_count: entry.delivery_count,
            });
            state.locked.insert(lock_token, entry);
        }

        Ok(batch)
    }
}

#[async_trait]
impl MessageSender for InMemoryQueue {
    async fn send(&self, message: BrokerMessage) -> BrokerResult<()> {
        {
            let mut state = self.lock()?;
            push_bounded(&mut state.sent, message.clone(), self.capacity);
            let entry = Entry {
                message,
                delivery_count: 0,
            };
            if let Some(evicted) = push_bounded(&mut state.ready, entry, self.capacity) {
                state.dropped += 1;
                warn!(
                    message_id = %evicted.message.message_id,
                    capacity = self.capacity,
                    "in-memory queue full; dropped oldest message"
                );
            }
        }
        self.available.notify_one();
        Ok(())
    }
}

#[async_trait]
impl MessageReceiver for InMemoryQueue {
    async fn receive(&self, max: usize, wait: Duration) -> BrokerResult<Vec<ReceivedMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.available.notified();

            let batch = self.take_batch(max)?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn complete(&self, message: &ReceivedMessage) -> BrokerResult<()> {
        self.lock()?
            .locked
            .remove(&message.lock_token)
            .map(|_| ())
            .ok_or_else(|| BrokerError::LockLost(message.lock_token.clone()))
    }

    async fn abandon(&self, message: &ReceivedMessage) -> BrokerResult<()> {
        let requeued = {
            let mut state = self.lock()?;
            let entry = state
                .locked
                .remove(&message.lock_token)
                .ok_or_else(|| BrokerError::LockLost(message.lock_token.clone()))?;

            if entry.delivery_count >= self.max_delivery_count {
                warn!(
                    message_id = %entry.message.message_id,
                    delivery_count = entry.delivery_count,
                    "max delivery count exceeded; dead-lettering message"
                );
                let dead = DeadLetter {
                    message: entry.message,
                    delivery_count: entry.delivery_count,
                    reason: "MaxDeliveryCountExceeded".to_string(),
                };
                push_bounded(&mut state.dead_letters, dead, self.capacity);
                false
            } else {
                state.ready.push_front(entry);
                true
            }
        };

        if requeued {
            self.available.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn message(id: &str) -> BrokerMessage {
        BrokerMessage {
            message_id: id.to_string(),
            subject: "ItemCreatedEvent".to_string(),
            content_type: super::super::CONTENT_TYPE_JSON.to_string(),
            correlation_id: None,
            application_properties: BTreeMap::new(),
            body: b"{}".to_vec(),
        }
    }

    const NO_WAIT: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn delivers_in_send_order_up_to_max() {
        let q = InMemoryQueue::default();
        for id in ["a", "b", "c"] {
            q.send(message(id)).await.unwrap();
        }

        let batch = q.receive(2, NO_WAIT).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|m| m.message.message_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(batch.iter().all(|m| m.delivery_count == 1));
        assert_eq!(q.pending(), 1);
        assert_eq!(q.in_flight(), 2);
    }

    #[tokio::test]
    async fn completed_messages_are_gone() {
        let q = InMemoryQueue::default();
        q.send(message("a")).await.unwrap();

        let batch = q.receive(10, NO_WAIT).await.unwrap();
        q.complete(&batch[0]).await.unwrap();

        assert!(q.receive(10, NO_WAIT).await.unwrap().is_empty());
        assert_eq!(q.in_flight(), 0);
        assert!(matches!(
            q.complete(&batch[0]).await,
            Err(BrokerError::LockLost(_))
        ));
    }

    #[tokio::test]
    async fn abandoned_messages_are_redelivered_then_dead_lettered() {
        let q = InMemoryQueue::new(3);
        q.send(message("poison")).await.unwrap();

        for expected in 1..=3 {
            let batch = q.receive(1, NO_WAIT).await.unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].delivery_count, expected);
            q.abandon(&batch[0]).await.unwrap();
        }

        assert!(q.receive(1, NO_WAIT).await.unwrap().is_empty());
        let dead = q.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.message_id, "poison");
        assert_eq!(dead[0].delivery_count, 3);
    }

    #[tokio::test]
    async fn receive_wakes_when_a_message_arrives() {
        let q = Arc::new(InMemoryQueue::default());
        let sender = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send(message("late")).await.unwrap();
        });

        let batch = q.receive(5, Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message.message_id, "late");
    }

    #[tokio::test]
    async fn unconsumed_queue_stays_bounded() {
        let q = InMemoryQueue::default().with_capacity(3);
        for id in ["a", "b", "c", "d", "e"] {
            q.send(message(id)).await.unwrap();
        }

        assert_eq!(q.pending(), 3);
        assert_eq!(q.dropped(), 2);
        let sent: Vec<_> = q.sent().into_iter().map(|m| m.message_id).collect();
        assert_eq!(sent, vec!["c", "d", "e"]);

        let batch = q.receive(10, NO_WAIT).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|m| m.message.message_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "e"]);
    }

    #[tokio::test]
    async fn empty_wait_returns_empty_batch() {
        let q = InMemoryQueue::default();
        assert!(q.receive(5, NO_WAIT).await.unwrap().is_empty());
        assert_eq!(q.sent().len(), 0);
    }
}
