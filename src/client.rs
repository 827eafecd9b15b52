//! Broker client capability and driver selection
//!
//! [`BrokerClient`] is the minimal surface the core depends on; concrete
//! wire-protocol clients (partitioned log brokers, AMQP brokers, key/value
//! pub-sub stores) live outside this crate and plug in through the
//! [`ClientFactory`]. Driver selection is explicit dependency injection:
//! constructors are registered by name and looked up by preference, with no
//! process-global registry or library auto-detection.
//!
//! [`InMemoryClient`] is the one transport shipped here: a loopback used by
//! tests and local development.

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::message::{DeliveredMessage, OffsetInfo};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Minimal transport surface the core depends on.
///
/// Calls may block on network I/O; callers guard them with a
/// [`crate::CircuitBreaker`] where fault isolation matters.
#[async_trait]
pub trait BrokerClient: Send + Sync + fmt::Debug {
    /// Establish the transport connection. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Write one message to the transport.
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        key: Option<&str>,
        partition: Option<u32>,
    ) -> Result<()>;

    /// Subscribe to a set of topics, delivering raw messages into `delivery`.
    async fn subscribe(
        &self,
        topics: &[String],
        delivery: mpsc::Sender<DeliveredMessage>,
    ) -> Result<()>;

    /// Acknowledge a position, for transports requiring manual commits.
    async fn commit(&self, offset: OffsetInfo) -> Result<()>;

    /// Tear down the transport connection.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

type ClientConstructor = Arc<dyn Fn(&BrokerConfig) -> Result<Arc<dyn BrokerClient>> + Send + Sync>;

/// Explicit driver registry: named constructors plus a default preference.
pub struct ClientFactory {
    constructors: DashMap<String, ClientConstructor>,
    default_driver: String,
}

impl ClientFactory {
    pub fn new<D: Into<String>>(default_driver: D) -> Self {
        Self {
            constructors: DashMap::new(),
            default_driver: default_driver.into(),
        }
    }

    /// Register a constructor for a driver name, replacing any previous one.
    pub fn register<F>(&self, driver: &str, constructor: F)
    where
        F: Fn(&BrokerConfig) -> Result<Arc<dyn BrokerClient>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(driver.to_string(), Arc::new(constructor));
    }

    /// Capability probe: is a constructor registered for this driver?
    pub fn available(&self, driver: &str) -> bool {
        self.constructors.contains_key(driver)
    }

    /// Registered driver names.
    pub fn drivers(&self) -> Vec<String> {
        self.constructors
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Build a client for the preferred driver, falling back to the
    /// factory's default when no preference is given.
    pub fn create(
        &self,
        preference: Option<&str>,
        config: &BrokerConfig,
    ) -> Result<Arc<dyn BrokerClient>> {
        let driver = preference.unwrap_or(&self.default_driver);
        let constructor = self.constructors.get(driver).ok_or_else(|| {
            BrokerError::invalid_config(format!(
                "unknown broker driver '{}' (registered: {})",
                driver,
                self.drivers().join(", ")
            ))
        })?;
        debug!(driver, "constructing broker client");
        constructor(config)
    }
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("default_driver", &self.default_driver)
            .field("drivers", &self.drivers())
            .finish()
    }
}

/// A record captured by the [`InMemoryClient`].
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub topic: String,
    pub payload: Bytes,
    pub key: Option<String>,
    pub partition: Option<u32>,
}

/// Loopback transport: publishes land in memory and are forwarded to any
/// matching in-process subscribers. Used by tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    connected: AtomicBool,
    next_offset: AtomicU64,
    published: Mutex<Vec<PublishedRecord>>,
    commits: Mutex<Vec<OffsetInfo>>,
    subscribers: Mutex<Vec<(Vec<String>, mpsc::Sender<DeliveredMessage>)>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records published so far.
    pub fn published(&self) -> Vec<PublishedRecord> {
        self.published.lock().clone()
    }

    /// All offsets committed so far.
    pub fn commits(&self) -> Vec<OffsetInfo> {
        self.commits.lock().clone()
    }

    /// Inject a message as if the broker delivered it, bypassing publish.
    pub async fn deliver(&self, message: DeliveredMessage) {
        self.forward(message).await;
    }

    async fn forward(&self, message: DeliveredMessage) {
        let targets: Vec<mpsc::Sender<DeliveredMessage>> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|(topics, _)| topics.iter().any(|t| t == &message.topic))
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        for tx in targets {
            if tx.send(message.clone()).await.is_err() {
                warn!(topic = %message.topic, "dropping delivery to closed subscriber");
            }
        }
    }
}

#[async_trait]
impl BrokerClient for InMemoryClient {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        info!("in-memory broker client connected");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        key: Option<&str>,
        partition: Option<u32>,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(BrokerError::not_connected("memory"));
        }

        self.published.lock().push(PublishedRecord {
            topic: topic.to_string(),
            payload: payload.clone(),
            key: key.map(|k| k.to_string()),
            partition,
        });

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let mut delivered =
            DeliveredMessage::new(topic, partition.unwrap_or(0), offset, payload);
        if let Some(key) = key {
            delivered = delivered.with_key(Bytes::from(key.to_string()));
        }
        self.forward(delivered).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: &[String],
        delivery: mpsc::Sender<DeliveredMessage>,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(BrokerError::not_connected("memory"));
        }
        debug!(?topics, "in-memory subscription added");
        self.subscribers.lock().push((topics.to_vec(), delivery));
        Ok(())
    }

    async fn commit(&self, offset: OffsetInfo) -> Result<()> {
        if !self.is_connected() {
            return Err(BrokerError::not_connected("memory"));
        }
        self.commits.lock().push(offset);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.subscribers.lock().clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
