//! The pluggable contract application code implements to process messages

use crate::context::ConsumerContext;
use crate::error::BrokerError;
use crate::message::DeliveredMessage;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Application-defined message handler driven by a
/// [`crate::ConsumerRunner`].
///
/// Only [`handle`], [`channels`] and [`name`] are required; the remaining
/// methods default to sensible behavior and exist so each handler can carry
/// its own retry policy, pre-filtering, dead-letter routing and lifecycle
/// hooks.
///
/// [`handle`]: ConsumerHandler::handle
/// [`channels`]: ConsumerHandler::channels
/// [`name`]: ConsumerHandler::name
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    /// Process one message. Errors are resolved by the consumer loop
    /// through this handler's retry policy.
    async fn handle(&self, message: &DeliveredMessage, context: &ConsumerContext) -> Result<()>;

    /// Channel patterns this handler subscribes to.
    fn channels(&self) -> Vec<String>;

    /// Stable handler name for contexts, logs and metrics.
    fn name(&self) -> &str;

    /// Preferred transport driver, or `None` to use the configured default.
    fn driver(&self) -> Option<&str> {
        None
    }

    /// Consumer group for transports with group coordination.
    fn consumer_group(&self) -> Option<&str> {
        None
    }

    /// Retries granted after the initial attempt fails.
    fn max_retries(&self) -> u32 {
        3
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// The default doubles per attempt starting at one second, capped at 30
    /// seconds; handlers override this for linear or constant backoff.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(5);
        Duration::from_secs((1u64 << shift).min(30))
    }

    /// Pre-filter; returning `false` skips the message without counting it
    /// as processed or as an error.
    fn should_handle(&self, _message: &DeliveredMessage) -> bool {
        true
    }

    /// Called once retries are exhausted; the integration point for
    /// dead-letter routing or alerting. The loop continues afterwards.
    async fn on_failed(
        &self,
        _message: &DeliveredMessage,
        _error: &BrokerError,
        _context: &ConsumerContext,
    ) {
    }

    /// Called once before the consume loop starts delivering.
    async fn on_start(&self, _context: &ConsumerContext) {}

    /// Called once after the consume loop has stopped.
    async fn on_stop(&self, _context: &ConsumerContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl ConsumerHandler for NoopHandler {
        async fn handle(
            &self,
            _message: &DeliveredMessage,
            _context: &ConsumerContext,
        ) -> Result<()> {
            Ok(())
        }

        fn channels(&self) -> Vec<String> {
            vec!["orders.*".to_string()]
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn test_default_backoff_curve() {
        let handler = NoopHandler;

        assert_eq!(handler.retry_delay(1), Duration::from_secs(1));
        assert_eq!(handler.retry_delay(2), Duration::from_secs(2));
        assert_eq!(handler.retry_delay(3), Duration::from_secs(4));
        // Capped for large attempt numbers.
        assert_eq!(handler.retry_delay(10), Duration::from_secs(30));
        assert_eq!(handler.retry_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_defaults() {
        let handler = NoopHandler;
        assert_eq!(handler.max_retries(), 3);
        assert_eq!(handler.driver(), None);
        assert_eq!(handler.consumer_group(), None);
        assert!(handler.should_handle(&DeliveredMessage::new(
            "bus.orders",
            0,
            0,
            bytes::Bytes::new()
        )));
    }
}
