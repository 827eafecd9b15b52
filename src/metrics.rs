//! Metrics collection for publishers and consumers
//!
//! Lock-free counters with relaxed ordering; snapshots are taken for health
//! endpoints and logs. Instances are created per publisher/consumer and
//! shared by `Arc` rather than through a process-wide global, so wiring
//! stays explicit.

use std::sync::atomic::{AtomicU64, Ordering};

/// Publisher-side counters
#[derive(Debug, Default)]
pub struct PublisherMetrics {
    pub messages_published: AtomicU64,
    pub bytes_published: AtomicU64,
    pub publish_errors: AtomicU64,
    pub buffer_overflows: AtomicU64,
    pub messages_requeued: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub flushes: AtomicU64,
}

impl PublisherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self, byte_count: u64) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_overflow(&self) {
        self.buffer_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeued(&self, count: u64) {
        self.messages_requeued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PublisherMetricsSnapshot {
        PublisherMetricsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            messages_requeued: self.messages_requeued.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time publisher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherMetricsSnapshot {
    pub messages_published: u64,
    pub bytes_published: u64,
    pub publish_errors: u64,
    pub buffer_overflows: u64,
    pub messages_requeued: u64,
    pub messages_dropped: u64,
    pub flushes: u64,
}

/// Consumer-side counters
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    pub messages_processed: AtomicU64,
    pub bytes_processed: AtomicU64,
    pub messages_skipped: AtomicU64,
    pub retries: AtomicU64,
    pub messages_dead_lettered: AtomicU64,
    pub commits: AtomicU64,
    pub commit_errors: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, byte_count: u64) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.messages_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_error(&self) {
        self.commit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerMetricsSnapshot {
        ConsumerMetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            messages_skipped: self.messages_skipped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            messages_dead_lettered: self.messages_dead_lettered.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_errors: self.commit_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time consumer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerMetricsSnapshot {
    pub messages_processed: u64,
    pub bytes_processed: u64,
    pub messages_skipped: u64,
    pub retries: u64,
    pub messages_dead_lettered: u64,
    pub commits: u64,
    pub commit_errors: u64,
}
