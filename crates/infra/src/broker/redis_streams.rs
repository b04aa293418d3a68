//! Redis Streams-backed queue (durable, at-least-once delivery).
//!
//! ## Layout
//!
//! - **Stream key**: the queue name (e.g. `items-events`)
//! - **Consumer group**: `<queue>.workers`, each worker process is one consumer
//! - **Dead-letter stream**: `<queue>:dlq`
//!
//! ## Settlement
//!
//! - `complete` acknowledges (`XACK`) and deletes (`XDEL`) the entry.
//! - `abandon` resets the entry's idle time so the next `receive` reclaims it.
//! - Entries left pending longer than the redelivery delay (a crashed consumer)
//!   are reclaimed with `XCLAIM`. Once an entry has been delivered
//!   `max_delivery_count` times it is copied to the dead-letter stream and
//!   acknowledged instead of being delivered again.
//! - Entries that cannot be decoded into a message are dead-lettered as soon
//!   as they are read; the rest of the batch is delivered normally.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimOptions, StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId,
    StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, info, instrument, warn};

use super::{BrokerError, BrokerMessage, BrokerResult, MessageReceiver, MessageSender, ReceivedMessage};
use crate::config::QueueConfig;

const FIELD_MESSAGE_ID: &str = "message_id";
const FIELD_SUBJECT: &str = "subject";
const FIELD_CONTENT_TYPE: &str = "content_type";
const FIELD_CORRELATION_ID: &str = "correlation_id";
const FIELD_PROPERTIES: &str = "properties";
const FIELD_BODY: &str = "body";

const REASON_MAX_DELIVERY: &str = "MaxDeliveryCountExceeded";
const REASON_MALFORMED: &str = "Malformed";

pub struct RedisStreamsQueue {
    conn: ConnectionManager,
    /// Dedicated connection for blocking `XREADGROUP` so settlement calls
    /// are not queued behind it.
    reader: ConnectionManager,
    stream_key: String,
    group: String,
    dlq_key: String,
    consumer: String,
    max_delivery_count: u32,
    redelivery_delay: Duration,
}

impl std::fmt::Debug for RedisStreamsQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsQueue")
            .field("stream_key", &self.stream_key)
            .field("group", &self.group)
            .field("dlq_key", &self.dlq_key)
            .field("consumer", &self.consumer)
            .field("max_delivery_count", &self.max_delivery_count)
            .field("redelivery_delay", &self.redelivery_delay)
            .finish()
    }
}

impl RedisStreamsQueue {
    /// Connects and ensures the consumer group exists (idempotent).
    pub async fn connect(config: &QueueConfig) -> BrokerResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let reader = ConnectionManager::new(client).await?;

        let queue = Self {
            conn,
            reader,
            stream_key: config.queue_name.clone(),
            group: format!("{}.workers", config.queue_name),
            dlq_key: format!("{}:dlq", config.queue_name),
            consumer: format!("{}-{}", config.queue_name, uuid::Uuid::new_v4().simple()),
            max_delivery_count: config.max_delivery_count.max(1),
            redelivery_delay: config.redelivery_delay,
        };
        queue.ensure_consumer_group().await?;

        info!(
            stream_key = %queue.stream_key,
            group = %queue.group,
            consumer = %queue.consumer,
            "connected to redis streams queue"
        );
        Ok(queue)
    }

    async fn ensure_consumer_group(&self) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.group, "0")
            .await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn redelivery_delay_ms(&self) -> usize {
        usize::try_from(self.redelivery_delay.as_millis()).unwrap_or(usize::MAX)
    }

    /// Reclaims stale pending entries; over-delivered ones are dead-lettered.
    async fn reclaim(&self, max: usize) -> BrokerResult<Vec<ReceivedMessage>> {
        let mut conn = self.conn.clone();
        let min_idle = self.redelivery_delay_ms();

        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream_key, &self.group, "-", "+", max)
            .await?;

        let PendingSplit { retry, exhausted } =
            classify_pending(&pending.ids, min_idle, self.max_delivery_count);

        if !exhausted.is_empty() {
            self.dead_letter(&exhausted, REASON_MAX_DELIVERY).await?;
        }
        if retry.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = conn
            .xclaim(&self.stream_key, &self.group, &self.consumer, min_idle, &retry)
            .await?;

        // XCLAIM bumped the delivery counter; read it back for each entry.
        let counts: StreamPendingCountReply = conn
            .xpending_consumer_count(
                &self.stream_key,
                &self.group,
                "-",
                "+",
                max,
                &self.consumer,
            )
            .await?;

        let (received, malformed) = split_entries(claimed.ids, |id| {
            counts
                .ids
                .iter()
                .find(|p| p.id == id)
                .map(|p| u32::try_from(p.times_delivered).unwrap_or(u32::MAX))
                .unwrap_or(1)
        });
        self.dead_letter_malformed(&malformed).await;
        Ok(received)
    }

    #[instrument(skip(self), fields(dlq_key = %self.dlq_key), err)]
    async fn dead_letter(&self, ids: &[String], reason: &str) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        let claimed: StreamClaimReply = conn
            .xclaim(&self.stream_key, &self.group, &self.consumer, 0, ids)
            .await?;

        for entry in &claimed.ids {
            let mut fields: Vec<(String, Vec<u8>)> = entry
                .map
                .iter()
                .filter_map(|(k, v)| {
                    redis::from_redis_value::<Vec<u8>>(v)
                        .ok()
                        .map(|bytes| (k.clone(), bytes))
                })
                .collect();
            fields.push(("original_id".to_string(), entry.id.clone().into_bytes()));
            fields.push(("reason".to_string(), reason.as_bytes().to_vec()));
            fields.push((
                "dead_lettered_at".to_string(),
                chrono::Utc::now().to_rfc3339().into_bytes(),
            ));

            let _: String = conn.xadd(&self.dlq_key, "*", fields.as_slice()).await?;
            warn!(entry_id = %entry.id, reason, "moved entry to dead-letter stream");
        }

        self.settle(ids).await
    }

    /// Best effort: entries that stay pending are reclaimed and retried later.
    async fn dead_letter_malformed(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.dead_letter(ids, REASON_MALFORMED).await {
            warn!(error = %e, count = ids.len(), "failed to dead-letter malformed entries");
        }
    }

    async fn settle(&self, ids: &[String]) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        let _: (usize, usize) = redis::pipe()
            .atomic()
            .xack(&self.stream_key, &self.group, ids)
            .xdel(&self.stream_key, ids)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read_new(&self, max: usize, wait: Duration) -> BrokerResult<Vec<ReceivedMessage>> {
        let mut opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max);
        // BLOCK 0 would wait forever.
        let block_ms = usize::try_from(wait.as_millis()).unwrap_or(usize::MAX);
        if block_ms > 0 {
            opts = opts.block(block_ms);
        }

        let mut reader = self.reader.clone();
        let reply: Option<StreamReadReply> = reader
            .xread_options(&[&self.stream_key], &[">"], &opts)
            .await?;

        let entries = reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids);
        let (received, malformed) = split_entries(entries, |_| 1);
        self.dead_letter_malformed(&malformed).await;
        Ok(received)
    }
}

/// Pending entries idle long enough to be delivered again.
#[derive(Debug, Default, PartialEq, Eq)]
struct PendingSplit {
    retry: Vec<String>,
    /// Delivered `max_delivery_count` times already.
    exhausted: Vec<String>,
}

fn classify_pending(
    pending: &[StreamPendingId],
    min_idle_ms: usize,
    max_delivery_count: u32,
) -> PendingSplit {
    let mut split = PendingSplit::default();
    for entry in pending {
        if entry.last_delivered_ms < min_idle_ms {
            continue;
        }
        if entry.times_delivered >= max_delivery_count as usize {
            split.exhausted.push(entry.id.clone());
        } else {
            split.retry.push(entry.id.clone());
        }
    }
    split
}

/// Decodes entries one at a time. Ids of entries that cannot be decoded are
/// returned separately.
fn split_entries(
    entries: impl IntoIterator<Item = StreamId>,
    delivery_count: impl Fn(&str) -> u32,
) -> (Vec<ReceivedMessage>, Vec<String>) {
    let mut received = Vec::new();
    let mut malformed = Vec::new();
    for entry in entries {
        match to_received(&entry, delivery_count(&entry.id)) {
            Ok(message) => received.push(message),
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "malformed stream entry");
                malformed.push(entry.id);
            }
        }
    }
    (received, malformed)
}

fn to_received(entry: &StreamId, delivery_count: u32) -> BrokerResult<ReceivedMessage> {
    let malformed = |reason: &str| BrokerError::Malformed {
        id: entry.id.clone(),
        reason: reason.to_string(),
    };

    let text = |field: &str| -> Option<String> { entry.get::<String>(field) };

    let application_properties = match text(FIELD_PROPERTIES) {
        Some(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw)
            .map_err(|e| malformed(&format!("properties: {e}")))?,
        None => BTreeMap::new(),
    };

    Ok(ReceivedMessage {
        message: BrokerMessage {
            message_id: text(FIELD_MESSAGE_ID).ok_or_else(|| malformed("missing message_id"))?,
            subject: text(FIELD_SUBJECT).unwrap_or_default(),
            content_type: text(FIELD_CONTENT_TYPE).unwrap_or_default(),
            correlation_id: text(FIELD_CORRELATION_ID).filter(|c| !c.is_empty()),
            application_properties,
            body: entry
                .get::<Vec<u8>>(FIELD_BODY)
                .ok_or_else(|| malformed("missing body"))?,
        },
        lock_token: entry.id.clone(),
        delivery_count,
    })
}

/// Stream fields for `message`, in a stable order.
fn to_fields(message: &BrokerMessage) -> BrokerResult<Vec<(&'static str, Vec<u8>)>> {
    let properties = serde_json::to_vec(&message.application_properties).map_err(|e| {
        BrokerError::Malformed {
            id: message.message_id.clone(),
            reason: format!("properties: {e}"),
        }
    })?;

    let mut fields = vec![
        (FIELD_MESSAGE_ID, message.message_id.clone().into_bytes()),
        (FIELD_SUBJECT, message.subject.clone().into_bytes()),
        (FIELD_CONTENT_TYPE, message.content_type.clone().into_bytes()),
        (FIELD_PROPERTIES, properties),
        (FIELD_BODY, message.body.clone()),
    ];
    if let Some(correlation_id) = &message.correlation_id {
        fields.push((FIELD_CORRELATION_ID, correlation_id.clone().into_bytes()));
    }
    Ok(fields)
}

#[async_trait]
impl MessageSender for RedisStreamsQueue {
    #[instrument(
        skip(self, message),
        fields(stream_key = %self.stream_key, message_id = %message.message_id, subject = %message.subject),
        err
    )]
    async fn send(&self, message: BrokerMessage) -> BrokerResult<()> {
        let fields = to_fields(&message)?;
        let mut conn = self.conn.clone();
        let entry_id: String = conn.xadd(&self.stream_key, "*", fields.as_slice()).await?;
        debug!(entry_id = %entry_id, "appended message to stream");
        Ok(())
    }
}

#[async_trait]
impl MessageReceiver for RedisStreamsQueue {
    async fn receive(&self, max: usize, wait: Duration) -> BrokerResult<Vec<ReceivedMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let mut batch = self.reclaim(max).await?;
        if batch.len() < max {
            // Don't block when redeliveries are already waiting.
            let wait = if batch.is_empty() { wait } else { Duration::ZERO };
            batch.extend(self.read_new(max - batch.len(), wait).await?);
        }
        Ok(batch)
    }

    #[instrument(skip(self, message), fields(entry_id = %message.lock_token), err)]
    async fn complete(&self, message: &ReceivedMessage) -> BrokerResult<()> {
        self.settle(std::slice::from_ref(&message.lock_token)).await
    }

    #[instrument(skip(self, message), fields(entry_id = %message.lock_token), err)]
    async fn abandon(&self, message: &ReceivedMessage) -> BrokerResult<()> {
        // Mark the entry as idle long enough to be reclaimed on the next poll.
        // JUSTID leaves the delivery counter untouched.
        let opts = StreamClaimOptions::default()
            .idle(self.redelivery_delay_ms())
            .with_justid();
        let mut conn = self.conn.clone();
        let claimed: Vec<String> = conn
            .xclaim_options(
                &self.stream_key,
                &self.group,
                &self.consumer,
                0,
                std::slice::from_ref(&message.lock_token),
                opts,
            )
            .await?;

        if claimed.is_empty() {
            return Err(BrokerError::LockLost(message.lock_token.clone()));
        }
        Ok(())
    }
}
