//! Publisher: channel resolution, staging and guarded transport writes
//!
//! The outbound path: application publishes on a logical channel, the
//! [`TopicStrategy`] resolves transport addressing, the message is staged in
//! the [`RingBuffer`], and flushes drain the buffer through the
//! [`CircuitBreaker`] into the [`BrokerClient`].
//!
//! A `Publisher` is a single-producer handle: staging and breaker state are
//! unsynchronized by design, which the `&mut self` receivers make explicit.
//! Use one publisher per producing task.

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::client::BrokerClient;
use crate::config::PublisherOptions;
use crate::error::BrokerError;
use crate::message::Message;
use crate::metrics::PublisherMetrics;
use crate::ring::{RingBuffer, RingBufferStats};
use crate::topic::{validate_channel, TopicStrategy};
use crate::Result;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Publishes application messages on logical channels.
pub struct Publisher {
    options: PublisherOptions,
    strategy: TopicStrategy,
    client: Arc<dyn BrokerClient>,
    buffer: RingBuffer,
    breaker: CircuitBreaker,
    metrics: Arc<PublisherMetrics>,
    last_flush: Instant,
}

/// Combined publisher health signals: staging counters, breaker state and
/// throughput counters. Degraded-but-running states (overflows, open
/// breaker) show up here rather than as errors.
#[derive(Debug, Clone)]
pub struct PublisherStats {
    pub buffer: RingBufferStats,
    pub breaker: CircuitBreakerStats,
    pub metrics: crate::metrics::PublisherMetricsSnapshot,
}

impl Publisher {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        strategy: TopicStrategy,
        options: PublisherOptions,
    ) -> Self {
        let buffer = RingBuffer::new(options.buffer_capacity);
        let breaker = CircuitBreaker::new(
            format!("publisher-{}", options.driver),
            options.breaker.clone(),
        );
        Self {
            options,
            strategy,
            client,
            buffer,
            breaker,
            metrics: Arc::new(PublisherMetrics::new()),
            last_flush: Instant::now(),
        }
    }

    /// Stage a message for the given channel.
    ///
    /// On a full buffer the publisher flushes once and retries the slot; if
    /// staging still fails the overflow is surfaced as a publish error.
    pub async fn publish(&mut self, channel: &str, payload: Bytes) -> Result<()> {
        validate_channel(channel)?;

        if !self.buffer.enqueue(self.compose(channel, payload.clone())) {
            self.metrics.record_buffer_overflow();
            debug!(channel, "staging buffer full, flushing inline");
            self.flush().await?;
            if !self.buffer.enqueue(self.compose(channel, payload)) {
                return Err(BrokerError::publish(
                    channel,
                    "staging buffer full after flush",
                ));
            }
        }
        Ok(())
    }

    /// Publish immediately through the breaker, bypassing staging.
    pub async fn publish_now(&mut self, channel: &str, payload: Bytes) -> Result<()> {
        validate_channel(channel)?;
        let message = self.compose(channel, payload);
        self.send(message).await
    }

    /// Drain up to `flush_batch_size` staged messages into the transport.
    ///
    /// Returns the number of messages written. On a transport failure the
    /// failed message and the unsent remainder are re-staged (best effort)
    /// for a later flush, and the error propagates to the caller.
    pub async fn flush(&mut self) -> Result<usize> {
        let batch = self.buffer.dequeue_batch(self.options.flush_batch_size);
        if batch.is_empty() {
            self.last_flush = Instant::now();
            return Ok(0);
        }

        self.metrics.record_flush();
        let mut flushed = 0usize;
        let mut pending = batch.into_iter();

        while let Some(message) = pending.next() {
            if let Err(err) = self.send(message.clone()).await {
                // Re-stage in publish order: the failed message and the
                // unsent remainder of this batch are older than anything
                // still staged, so the staged tail is drained and re-enqueued
                // behind them.
                let still_staged = self.buffer.dequeue_batch(self.buffer.len());
                let mut requeued = 0u64;
                let mut dropped = 0u64;
                for unsent in std::iter::once(message)
                    .chain(pending)
                    .chain(still_staged)
                {
                    if self.buffer.enqueue(unsent) {
                        requeued += 1;
                    } else {
                        dropped += 1;
                    }
                }
                self.metrics.record_requeued(requeued);
                if dropped > 0 {
                    self.metrics.record_dropped(dropped);
                }
                warn!(
                    flushed,
                    requeued,
                    dropped,
                    error = %err,
                    "flush aborted on transport failure"
                );
                self.last_flush = Instant::now();
                return Err(err);
            }
            flushed += 1;
        }

        self.last_flush = Instant::now();
        debug!(flushed, "flush complete");
        Ok(flushed)
    }

    /// Flush when the configured interval has elapsed since the last flush.
    ///
    /// Intended to be called from the producing task's loop; returns the
    /// number of messages written (0 when the interval has not elapsed).
    pub async fn maybe_flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() || self.last_flush.elapsed() < self.options.flush_interval {
            return Ok(0);
        }
        self.flush().await
    }

    /// Drain everything that is staged, looping over batches.
    pub async fn flush_all(&mut self) -> Result<usize> {
        let mut total = 0;
        while !self.buffer.is_empty() {
            total += self.flush().await?;
        }
        Ok(total)
    }

    /// Number of currently staged messages.
    pub fn staged(&self) -> usize {
        self.buffer.len()
    }

    pub fn metrics(&self) -> Arc<PublisherMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Force the breaker closed. Operator escape hatch.
    pub fn reset_breaker(&mut self) {
        self.breaker.reset();
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            buffer: self.buffer.stats(),
            breaker: self.breaker.stats(),
            metrics: self.metrics.snapshot(),
        }
    }

    fn compose(&self, channel: &str, payload: Bytes) -> Message {
        let topic = self.strategy.topic_name(channel);
        let total_partitions = self.strategy.partition_count(channel);
        let mut message = Message::new(topic, payload)
            .with_partition(self.strategy.partition(channel, total_partitions));
        if let Some(key) = self.strategy.message_key(channel) {
            message = message.with_key(key);
        }
        message
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        let client = Arc::clone(&self.client);
        let byte_count = message.payload.len() as u64;
        let result = self
            .breaker
            .call(|| async move {
                client
                    .publish(
                        &message.topic,
                        message.payload.clone(),
                        message.key.as_deref(),
                        message.partition,
                    )
                    .await
            })
            .await;

        match result {
            Ok(()) => {
                self.metrics.record_published(byte_count);
                Ok(())
            }
            Err(err) => {
                self.metrics.record_publish_error();
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("driver", &self.options.driver)
            .field("staged", &self.buffer.len())
            .field("breaker", &self.breaker.state())
            .finish()
    }
}
