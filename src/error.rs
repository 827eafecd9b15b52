//! Error types for the streambus messaging core
//!
//! The taxonomy separates three failure classes:
//!
//! - [`BrokerError`] - permanent or unclassified transport failures
//!   (connection, publish, subscribe, consume, configuration)
//! - [`TemporaryError`] - retryable transport failures carrying retry
//!   metadata and an exponential backoff helper
//! - [`ChannelError`] - validation/authorization failures on logical
//!   channels, distinct from transport failures
//!
//! Every error carries an [`ErrorContext`] of structured key/value pairs
//! (broker name, channel, reason, retry metadata) so operators can log and
//! alert on fields instead of parsing message strings.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Structured key/value context attached to broker errors.
///
/// Kept sorted so rendered output is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    entries: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key/value pair, builder style.
    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.entries {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Main error type for streambus operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection to a broker endpoint failed
    #[error("connection to {broker} failed: {reason}")]
    Connection {
        broker: String,
        reason: String,
        context: ErrorContext,
    },

    /// A transport write for a channel failed
    #[error("publish on channel '{channel}' failed: {reason}")]
    Publish {
        channel: String,
        reason: String,
        context: ErrorContext,
    },

    /// Topic subscription failed
    #[error("subscribe failed: {reason}")]
    Subscribe {
        reason: String,
        context: ErrorContext,
    },

    /// Message consumption failed outside of handler execution
    #[error("consume failed: {reason}")]
    Consume {
        reason: String,
        context: ErrorContext,
    },

    /// Invalid configuration
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
        context: ErrorContext,
    },

    /// Operation attempted without an established connection
    #[error("not connected to broker {broker}")]
    NotConnected {
        broker: String,
        context: ErrorContext,
    },

    /// The guarding circuit breaker rejected the call without invoking it
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        name: String,
        context: ErrorContext,
    },

    /// Retryable transport failure
    #[error(transparent)]
    Temporary(#[from] TemporaryError),

    /// Channel validation or authorization failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    /// Create a new connection error
    pub fn connection<B: Into<String>, R: Into<String>>(broker: B, reason: R) -> Self {
        let broker = broker.into();
        let reason = reason.into();
        let context = ErrorContext::new()
            .with("broker", broker.clone())
            .with("reason", reason.clone());
        Self::Connection {
            broker,
            reason,
            context,
        }
    }

    /// Create a new publish error
    pub fn publish<C: Into<String>, R: Into<String>>(channel: C, reason: R) -> Self {
        let channel = channel.into();
        let reason = reason.into();
        let context = ErrorContext::new()
            .with("channel", channel.clone())
            .with("reason", reason.clone());
        Self::Publish {
            channel,
            reason,
            context,
        }
    }

    /// Create a new subscribe error
    pub fn subscribe<R: Into<String>>(reason: R) -> Self {
        let reason = reason.into();
        let context = ErrorContext::new().with("reason", reason.clone());
        Self::Subscribe { reason, context }
    }

    /// Create a new consume error
    pub fn consume<R: Into<String>>(reason: R) -> Self {
        let reason = reason.into();
        let context = ErrorContext::new().with("reason", reason.clone());
        Self::Consume { reason, context }
    }

    /// Create a new invalid-configuration error
    pub fn invalid_config<R: Into<String>>(reason: R) -> Self {
        let reason = reason.into();
        let context = ErrorContext::new().with("reason", reason.clone());
        Self::InvalidConfig { reason, context }
    }

    /// Create a new not-connected error
    pub fn not_connected<B: Into<String>>(broker: B) -> Self {
        let broker = broker.into();
        let context = ErrorContext::new().with("broker", broker.clone());
        Self::NotConnected { broker, context }
    }

    /// Create a new circuit-open error
    pub fn circuit_open<N: Into<String>>(name: N) -> Self {
        let name = name.into();
        let context = ErrorContext::new().with("breaker", name.clone());
        Self::CircuitOpen { name, context }
    }

    /// Structured context carried by this error, if any.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Connection { context, .. }
            | Self::Publish { context, .. }
            | Self::Subscribe { context, .. }
            | Self::Consume { context, .. }
            | Self::InvalidConfig { context, .. }
            | Self::NotConnected { context, .. }
            | Self::CircuitOpen { context, .. } => Some(context),
            Self::Temporary(e) => Some(&e.context),
            Self::Channel(e) => Some(e.context()),
            Self::Io(_) => None,
        }
    }

    /// Whether the failure is worth retrying at all.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Temporary(e) if e.can_retry())
    }
}

/// Classification of retryable transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporaryKind {
    /// Broker reachable but temporarily refusing work
    Unavailable,
    /// Network round trip exceeded its deadline
    NetworkTimeout,
    /// Topic/partition metadata is stale on the client side
    UnknownTopicOrPartition,
}

impl fmt::Display for TemporaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "broker temporarily unavailable"),
            Self::NetworkTimeout => write!(f, "network timeout"),
            Self::UnknownTopicOrPartition => write!(f, "unknown topic or partition"),
        }
    }
}

/// Retryable transport failure with retry bookkeeping
#[derive(Debug, Clone, Error)]
#[error("{kind}: {reason} (retry {retry_count}/{max_retries})")]
pub struct TemporaryError {
    pub kind: TemporaryKind,
    pub reason: String,
    /// Base delay before the next retry, in milliseconds
    pub retry_delay_ms: u64,
    /// How many retries have already been attempted
    pub retry_count: u32,
    pub max_retries: u32,
    pub context: ErrorContext,
}

impl TemporaryError {
    pub fn new<R: Into<String>>(kind: TemporaryKind, reason: R) -> Self {
        let reason = reason.into();
        let context = ErrorContext::new()
            .with("kind", kind.to_string())
            .with("reason", reason.clone());
        Self {
            kind,
            reason,
            retry_delay_ms: 1000,
            retry_count: 0,
            max_retries: 3,
            context,
        }
    }

    /// Broker is up but shedding load or mid-failover.
    pub fn unavailable<B: Into<String>>(broker: B) -> Self {
        let broker = broker.into();
        let mut err = Self::new(
            TemporaryKind::Unavailable,
            format!("broker {} is temporarily unavailable", broker),
        );
        err.context = err.context.with("broker", broker);
        err
    }

    /// Request deadline exceeded on the wire.
    pub fn network_timeout<B: Into<String>>(broker: B, timeout_ms: u64) -> Self {
        let broker = broker.into();
        let mut err = Self::new(
            TemporaryKind::NetworkTimeout,
            format!("request to {} timed out after {}ms", broker, timeout_ms),
        );
        err.context = err
            .context
            .with("broker", broker)
            .with("timeout_ms", timeout_ms.to_string());
        err
    }

    /// Client-side metadata is stale; a refresh usually resolves this.
    pub fn unknown_topic_or_partition<T: Into<String>>(topic: T) -> Self {
        let topic = topic.into();
        let mut err = Self::new(
            TemporaryKind::UnknownTopicOrPartition,
            format!("no metadata for topic '{}'", topic),
        );
        err.context = err.context.with("topic", topic);
        err
    }

    /// Set retry bookkeeping, builder style.
    pub fn with_retry(mut self, retry_delay_ms: u64, retry_count: u32, max_retries: u32) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self.retry_count = retry_count;
        self.max_retries = max_retries;
        self.context = self
            .context
            .with("retry_count", retry_count.to_string())
            .with("max_retries", max_retries.to_string());
        self
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// `min(retry_delay_ms * 2^retry_count, max_delay_ms)`
    pub fn exponential_backoff_delay(&self, max_delay_ms: u64) -> u64 {
        let factor = 1u64.checked_shl(self.retry_count).unwrap_or(u64::MAX);
        self.retry_delay_ms
            .saturating_mul(factor)
            .min(max_delay_ms)
    }
}

/// Channel validation and authorization failures
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("invalid channel name '{channel}': {reason}")]
    InvalidName {
        channel: String,
        reason: String,
        context: ErrorContext,
    },

    #[error("unauthorized access to channel '{channel}'")]
    Unauthorized {
        channel: String,
        context: ErrorContext,
    },

    #[error("channel '{channel}' not found")]
    NotFound {
        channel: String,
        context: ErrorContext,
    },
}

impl ChannelError {
    pub fn invalid_name<C: Into<String>, R: Into<String>>(channel: C, reason: R) -> Self {
        let channel = channel.into();
        let reason = reason.into();
        let context = ErrorContext::new()
            .with("channel", channel.clone())
            .with("reason", reason.clone());
        Self::InvalidName {
            channel,
            reason,
            context,
        }
    }

    pub fn unauthorized<C: Into<String>>(channel: C) -> Self {
        let channel = channel.into();
        let context = ErrorContext::new().with("channel", channel.clone());
        Self::Unauthorized { channel, context }
    }

    pub fn not_found<C: Into<String>>(channel: C) -> Self {
        let channel = channel.into();
        let context = ErrorContext::new().with("channel", channel.clone());
        Self::NotFound { channel, context }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::InvalidName { context, .. }
            | Self::Unauthorized { context, .. }
            | Self::NotFound { context, .. } => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display_is_sorted() {
        let context = ErrorContext::new()
            .with("reason", "refused")
            .with("broker", "localhost:9092");

        assert_eq!(context.to_string(), "broker=localhost:9092 reason=refused");
        assert_eq!(context.get("broker"), Some("localhost:9092"));
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_factory_methods_attach_context() {
        let err = BrokerError::publish("orders.created", "broker rejected batch");
        let context = err.context().unwrap();
        assert_eq!(context.get("channel"), Some("orders.created"));
        assert_eq!(context.get("reason"), Some("broker rejected batch"));

        let err = BrokerError::connection("broker1:9092", "refused");
        assert_eq!(err.context().unwrap().get("broker"), Some("broker1:9092"));
    }

    #[test]
    fn test_exponential_backoff_uncapped() {
        let err = TemporaryError::unavailable("broker1").with_retry(1000, 3, 5);
        assert_eq!(err.exponential_backoff_delay(60_000), 8000);
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let err = TemporaryError::unavailable("broker1").with_retry(1000, 3, 5);
        assert_eq!(err.exponential_backoff_delay(5000), 5000);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let err = TemporaryError::unavailable("broker1").with_retry(1000, 200, 201);
        assert_eq!(err.exponential_backoff_delay(30_000), 30_000);
    }

    #[test]
    fn test_can_retry() {
        let err = TemporaryError::network_timeout("broker1", 500).with_retry(100, 2, 3);
        assert!(err.can_retry());

        let exhausted = TemporaryError::network_timeout("broker1", 500).with_retry(100, 3, 3);
        assert!(!exhausted.can_retry());
    }

    #[test]
    fn test_retryable_classification() {
        let retryable: BrokerError = TemporaryError::unavailable("broker1").into();
        assert!(retryable.is_retryable());

        let exhausted: BrokerError = TemporaryError::unavailable("broker1")
            .with_retry(100, 3, 3)
            .into();
        assert!(!exhausted.is_retryable());

        let permanent = BrokerError::publish("orders.created", "payload rejected");
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_channel_error_context() {
        let err = ChannelError::invalid_name("bad channel!", "whitespace is not allowed");
        assert_eq!(err.context().get("channel"), Some("bad channel!"));

        let err: BrokerError = ChannelError::unauthorized("internal.audit").into();
        assert_eq!(err.context().unwrap().get("channel"), Some("internal.audit"));
    }
}
