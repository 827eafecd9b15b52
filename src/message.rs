//! Message types exchanged with the broker client capability

use bytes::Bytes;
use std::time::{Instant, SystemTime};

/// An outbound message staged for publication.
///
/// Produced by the publisher after channel resolution, consumed exactly once
/// by the ring buffer's reader. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Message {
    /// Resolved transport topic
    pub topic: String,
    /// Message payload
    pub payload: Bytes,
    /// Partitioning key, when the strategy provides one
    pub key: Option<String>,
    /// Explicit partition, when the strategy pins one
    pub partition: Option<u32>,
    /// When the message was composed, for publish-latency accounting
    pub created_at: Instant,
}

impl Message {
    pub fn new<T: Into<String>>(topic: T, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            payload,
            key: None,
            partition: None,
            created_at: Instant::now(),
        }
    }

    pub fn with_key<K: Into<String>>(mut self, key: K) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }
}

/// A raw message delivered by the transport on the consume side.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Option<Bytes>,
    pub payload: Bytes,
    pub timestamp: SystemTime,
}

impl DeliveredMessage {
    pub fn new<T: Into<String>>(topic: T, partition: u32, offset: u64, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_key(mut self, key: Bytes) -> Self {
        self.key = Some(key);
        self
    }

    /// The logical channel this message was published on, when recoverable.
    ///
    /// The grouped topic strategy uses the channel name as the message key,
    /// so on those transports the key round-trips the channel.
    pub fn channel(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }

    /// Offset bookkeeping for a manual commit of this message.
    pub fn offset_info(&self) -> OffsetInfo {
        OffsetInfo {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Position to acknowledge on transports requiring manual commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OffsetInfo {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}
