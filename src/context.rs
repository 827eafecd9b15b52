//! Execution-time metadata for a consumer loop
//!
//! [`ConsumerContext`] is a pure value: every mutation-like operation
//! returns a new instance and leaves the original untouched, so a previous
//! context can be kept across retry attempts for diagnostics without
//! aliasing concerns.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Immutable snapshot of one consumer's execution state.
#[derive(Debug, Clone)]
pub struct ConsumerContext {
    driver: String,
    handler_name: String,
    channel: String,
    process_id: u32,
    started_at: Instant,
    message_count: u64,
    error_count: u64,
    attempt: u32,
    metadata: HashMap<String, String>,
}

impl ConsumerContext {
    pub fn new<D, H, C>(driver: D, handler_name: H, channel: C) -> Self
    where
        D: Into<String>,
        H: Into<String>,
        C: Into<String>,
    {
        Self {
            driver: driver.into(),
            handler_name: handler_name.into(),
            channel: channel.into(),
            process_id: std::process::id(),
            started_at: Instant::now(),
            message_count: 0,
            error_count: 0,
            attempt: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// 1-based attempt number for the message currently being processed;
    /// 0 before the first dispatch.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// New context with the given processed-message count.
    pub fn with_message_count(&self, message_count: u64) -> Self {
        let mut next = self.clone();
        next.message_count = message_count;
        next
    }

    /// New context with the given error count.
    pub fn with_error_count(&self, error_count: u64) -> Self {
        let mut next = self.clone();
        next.error_count = error_count;
        next
    }

    /// New context with the given attempt number.
    pub fn with_attempt(&self, attempt: u32) -> Self {
        let mut next = self.clone();
        next.attempt = attempt;
        next
    }

    /// New context with one metadata entry added or replaced.
    pub fn with_metadata<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        let mut next = self.clone();
        next.metadata.insert(key.into(), value.into());
        next
    }

    /// Wall-clock time this consumer has been running.
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Processed messages per second since start.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.message_count as f64 / secs
        }
    }

    /// Errors as a percentage of processed messages.
    pub fn error_rate(&self) -> f64 {
        if self.message_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.message_count as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ConsumerContext {
        ConsumerContext::new("kafka", "order-handler", "orders.created")
    }

    #[test]
    fn test_with_message_count_leaves_original_untouched() {
        let original = context();
        let updated = original.with_message_count(5);

        assert_eq!(original.message_count(), 0);
        assert_eq!(updated.message_count(), 5);
        assert_eq!(updated.handler_name(), "order-handler");
        assert_eq!(updated.started_at(), original.started_at());
    }

    #[test]
    fn test_with_error_count_and_attempt() {
        let original = context();
        let updated = original.with_error_count(2).with_attempt(3);

        assert_eq!(original.error_count(), 0);
        assert_eq!(original.attempt(), 0);
        assert_eq!(updated.error_count(), 2);
        assert_eq!(updated.attempt(), 3);
    }

    #[test]
    fn test_with_metadata_copies_map() {
        let original = context().with_metadata("partition", "3");
        let updated = original.with_metadata("lag", "12");

        assert_eq!(original.metadata().len(), 1);
        assert_eq!(updated.metadata().len(), 2);
        assert_eq!(updated.metadata().get("partition").unwrap(), "3");
    }

    #[test]
    fn test_error_rate() {
        let ctx = context().with_message_count(200).with_error_count(5);
        assert!((ctx.error_rate() - 2.5).abs() < f64::EPSILON);

        assert_eq!(context().error_rate(), 0.0);
    }

    #[test]
    fn test_throughput_is_finite() {
        let ctx = context().with_message_count(100);
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.throughput() > 0.0);
        assert!(ctx.throughput().is_finite());
    }
}
