//! # Streambus
//!
//! A transport-agnostic pub/sub core for building message-bus layers on top
//! of partitioned log brokers, AMQP brokers and in-memory loopbacks.
//!
//! ## Features
//!
//! - **Channel Abstraction**: Applications publish on logical channels; a
//!   [`TopicStrategy`] maps them onto transport topics, partitions and keys
//! - **Staged Publishing**: Lock-free single-producer ring buffer with
//!   batched flushes and overflow accounting
//! - **Fault Isolation**: Circuit breaker around transport writes with
//!   closed/open/half-open transitions
//! - **Pluggable Transports**: The [`BrokerClient`] trait plus an explicit
//!   [`ClientFactory`] registry; no global driver detection
//! - **Handler Contract**: [`ConsumerHandler`] carries its own retry policy,
//!   pre-filtering and dead-letter hook, driven by a [`ConsumerRunner`]
//! - **Observability**: Structured tracing plus per-component metrics
//!   snapshots
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streambus::*;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BrokerConfig::default();
//!     config.validate()?;
//!
//!     let factory = ClientFactory::new("memory");
//!     factory.register("memory", |_config| {
//!         Ok(Arc::new(InMemoryClient::new()) as Arc<dyn BrokerClient>)
//!     });
//!
//!     let client = factory.create(None, &config)?;
//!     client.connect().await?;
//!
//!     let strategy = TopicStrategy::grouped(&config.topics)?;
//!     let mut publisher = Publisher::new(
//!         client,
//!         strategy,
//!         PublisherOptions::from_config(&config),
//!     );
//!
//!     publisher.publish("orders.created", Bytes::from("hello")).await?;
//!     publisher.flush().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod client;
pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod ring;
pub mod topic;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use client::{BrokerClient, ClientFactory, InMemoryClient, PublishedRecord};
pub use config::{
    BrokerConfig, ConsumerOptions, ConsumerOptionsBuilder, PublisherOptions,
    PublisherOptionsBuilder, TopicMappingConfig, TopicMappingEntry,
};
pub use consumer::{ConsumerRunner, ShutdownHandle};
pub use context::ConsumerContext;
pub use error::{BrokerError, ChannelError, ErrorContext, TemporaryError, TemporaryKind};
pub use handler::ConsumerHandler;
pub use message::{DeliveredMessage, Message, OffsetInfo};
pub use metrics::{
    ConsumerMetrics, ConsumerMetricsSnapshot, PublisherMetrics, PublisherMetricsSnapshot,
};
pub use publisher::{Publisher, PublisherStats};
pub use ring::{RingBuffer, RingBufferStats};
pub use topic::{validate_channel, TopicStrategy};

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
