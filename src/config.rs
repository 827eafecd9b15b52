//! Configuration types for the streambus core
//!
//! The broker configuration is what the surrounding application feeds into
//! the factories: transport selection, endpoints, consumer group, commit
//! mode, staging-buffer sizing and the channel-to-topic mapping table.
//! Everything derives serde so it can be loaded from whatever format the
//! host application uses.

use crate::breaker::CircuitBreakerConfig;
use crate::error::BrokerError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One channel-pattern-to-topic mapping entry.
///
/// `pattern` is a glob over dot-segments: a literal `.` matches a dot and
/// `*` matches any sequence (`orders.*` covers `orders.created`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMappingEntry {
    pub pattern: String,
    pub topic: String,
    pub partitions: u32,
}

/// The static channel-to-topic mapping table, read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMappingConfig {
    /// Ordered list of mappings; the first matching pattern wins
    pub mappings: Vec<TopicMappingEntry>,
    /// Fallback topic when no pattern matches
    pub default_topic: String,
    /// Partition count assumed for the fallback topic
    pub default_partitions: u32,
}

impl Default for TopicMappingConfig {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
            default_topic: "bus.events".to_string(),
            default_partitions: 3,
        }
    }
}

/// Broker-level configuration consumed by the client factory and the
/// publisher/consumer option derivations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Transport driver name (resolved through the [`crate::ClientFactory`])
    pub driver: String,
    /// Broker endpoint list
    pub brokers: Vec<String>,
    /// Consumer group id for transports with group coordination
    pub consumer_group: Option<String>,
    /// Commit offsets explicitly after terminal message handling
    pub manual_commit: bool,
    /// Requested staging ring-buffer capacity (rounded up to a power of two)
    pub buffer_capacity: usize,
    /// How long staged messages may linger before a time-based flush
    pub flush_interval: Duration,
    /// Per-transport producer option passthrough
    pub producer_options: HashMap<String, String>,
    /// Per-transport consumer option passthrough
    pub consumer_options: HashMap<String, String>,
    /// Channel-to-topic mapping table
    pub topics: TopicMappingConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            driver: "memory".to_string(),
            brokers: vec!["localhost:9092".to_string()],
            consumer_group: None,
            manual_commit: false,
            buffer_capacity: 1024,
            flush_interval: Duration::from_millis(100),
            producer_options: HashMap::new(),
            consumer_options: HashMap::new(),
            topics: TopicMappingConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Validate configuration bounds before wiring components to it.
    pub fn validate(&self) -> Result<()> {
        if self.driver.is_empty() {
            return Err(BrokerError::invalid_config("driver must not be empty"));
        }
        if self.brokers.is_empty() {
            return Err(BrokerError::invalid_config(
                "at least one broker endpoint is required",
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(BrokerError::invalid_config("buffer_capacity must be > 0"));
        }
        if self.topics.default_partitions == 0 {
            return Err(BrokerError::invalid_config(
                "default_partitions must be >= 1",
            ));
        }
        for entry in &self.topics.mappings {
            if entry.partitions == 0 {
                return Err(BrokerError::invalid_config(format!(
                    "mapping '{}' must have >= 1 partition",
                    entry.pattern
                )));
            }
        }
        Ok(())
    }
}

/// Options shaping a [`crate::Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Driver name, used to label the breaker and health output
    pub driver: String,
    /// Staging ring-buffer capacity
    pub buffer_capacity: usize,
    /// Maximum messages drained per flush
    pub flush_batch_size: usize,
    /// Elapsed time after which [`crate::Publisher::maybe_flush`] drains
    pub flush_interval: Duration,
    /// Breaker tuning for the guarded transport writes
    pub breaker: CircuitBreakerConfig,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            driver: "memory".to_string(),
            buffer_capacity: 1024,
            flush_batch_size: 256,
            flush_interval: Duration::from_millis(100),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl PublisherOptions {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            driver: config.driver.clone(),
            buffer_capacity: config.buffer_capacity,
            flush_interval: config.flush_interval,
            ..Self::default()
        }
    }
}

/// Options shaping a [`crate::ConsumerRunner`].
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Default driver name recorded in the consumer context
    pub driver: String,
    /// Consumer group id passed through to the transport
    pub consumer_group: Option<String>,
    /// Commit each message's offset after terminal handling
    pub manual_commit: bool,
    /// Bound of the in-process delivery queue
    pub delivery_capacity: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            driver: "memory".to_string(),
            consumer_group: None,
            manual_commit: false,
            delivery_capacity: 1024,
        }
    }
}

impl ConsumerOptions {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            driver: config.driver.clone(),
            consumer_group: config.consumer_group.clone(),
            manual_commit: config.manual_commit,
            ..Self::default()
        }
    }
}

/// Builder for [`PublisherOptions`]
#[derive(Debug, Default)]
pub struct PublisherOptionsBuilder {
    options: PublisherOptions,
}

impl PublisherOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver<S: Into<String>>(mut self, driver: S) -> Self {
        self.options.driver = driver.into();
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.buffer_capacity = capacity;
        self
    }

    pub fn flush_batch_size(mut self, size: usize) -> Self {
        self.options.flush_batch_size = size;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.options.flush_interval = interval;
        self
    }

    pub fn breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.options.breaker = breaker;
        self
    }

    pub fn build(self) -> PublisherOptions {
        self.options
    }
}

/// Builder for [`ConsumerOptions`]
#[derive(Debug, Default)]
pub struct ConsumerOptionsBuilder {
    options: ConsumerOptions,
}

impl ConsumerOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver<S: Into<String>>(mut self, driver: S) -> Self {
        self.options.driver = driver.into();
        self
    }

    pub fn consumer_group<S: Into<String>>(mut self, group: S) -> Self {
        self.options.consumer_group = Some(group.into());
        self
    }

    pub fn manual_commit(mut self, manual: bool) -> Self {
        self.options.manual_commit = manual;
        self
    }

    pub fn delivery_capacity(mut self, capacity: usize) -> Self {
        self.options.delivery_capacity = capacity;
        self
    }

    pub fn build(self) -> ConsumerOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        BrokerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_bounds() {
        let mut config = BrokerConfig::default();
        config.buffer_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.brokers.clear();
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.topics.mappings.push(TopicMappingEntry {
            pattern: "orders.*".to_string(),
            topic: "bus.orders".to_string(),
            partitions: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_publisher_options_builder() {
        let options = PublisherOptionsBuilder::new()
            .driver("kafka")
            .buffer_capacity(4096)
            .flush_batch_size(128)
            .flush_interval(Duration::from_millis(50))
            .build();

        assert_eq!(options.driver, "kafka");
        assert_eq!(options.buffer_capacity, 4096);
        assert_eq!(options.flush_batch_size, 128);
        assert_eq!(options.flush_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_consumer_options_builder() {
        let options = ConsumerOptionsBuilder::new()
            .driver("kafka")
            .consumer_group("billing")
            .manual_commit(true)
            .build();

        assert_eq!(options.driver, "kafka");
        assert_eq!(options.consumer_group.as_deref(), Some("billing"));
        assert!(options.manual_commit);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = BrokerConfig::default();
        config.driver = "kafka".to_string();
        config.manual_commit = true;
        config.consumer_group = Some("billing".to_string());
        config.buffer_capacity = 2048;

        let publisher = PublisherOptions::from_config(&config);
        assert_eq!(publisher.driver, "kafka");
        assert_eq!(publisher.buffer_capacity, 2048);

        let consumer = ConsumerOptions::from_config(&config);
        assert!(consumer.manual_commit);
        assert_eq!(consumer.consumer_group.as_deref(), Some("billing"));
    }
}
