//! Consumer loop: subscription, dispatch, retry and dead-letter resolution
//!
//! [`ConsumerRunner`] owns one handler and drives its whole lifecycle:
//! resolve the handler's channels to transport topics, subscribe, then pull
//! deliveries until shut down. Every delivery is resolved exactly one way
//! before the next is taken: skipped, processed, or dead-lettered after the
//! handler's retry budget is spent. A handler failure never kills the loop.

use crate::client::BrokerClient;
use crate::config::ConsumerOptions;
use crate::context::ConsumerContext;
use crate::handler::ConsumerHandler;
use crate::message::DeliveredMessage;
use crate::metrics::{ConsumerMetrics, ConsumerMetricsSnapshot};
use crate::topic::TopicStrategy;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Signals a running [`ConsumerRunner`] to stop after the in-flight message.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives one [`ConsumerHandler`] against a broker client.
pub struct ConsumerRunner {
    client: Arc<dyn BrokerClient>,
    handler: Arc<dyn ConsumerHandler>,
    strategy: TopicStrategy,
    options: ConsumerOptions,
    metrics: Arc<ConsumerMetrics>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConsumerRunner {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        handler: Arc<dyn ConsumerHandler>,
        strategy: TopicStrategy,
        options: ConsumerOptions,
    ) -> (Self, ShutdownHandle) {
        let (tx, shutdown_rx) = watch::channel(false);
        let runner = Self {
            client,
            handler,
            strategy,
            options,
            metrics: Arc::new(ConsumerMetrics::new()),
            shutdown_rx,
        };
        (runner, ShutdownHandle { tx })
    }

    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> ConsumerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run the consume loop to completion.
    ///
    /// Returns the final context once a shutdown is signalled or the
    /// delivery channel closes. Subscription errors are returned; handler
    /// errors are resolved through the retry policy instead.
    pub async fn run(self) -> Result<ConsumerContext> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let channels = self.handler.channels();
        let topics = self
            .strategy
            .topics_for_channels(channels.iter().map(String::as_str));
        let driver = self
            .handler
            .driver()
            .unwrap_or(&self.options.driver)
            .to_string();
        let mut context =
            ConsumerContext::new(&driver, self.handler.name(), channels.join(","));

        self.client.connect().await?;
        let (tx, mut rx) = mpsc::channel(self.options.delivery_capacity);
        self.client.subscribe(&topics, tx).await?;
        info!(
            handler = self.handler.name(),
            driver = %driver,
            ?topics,
            "consumer subscribed"
        );

        self.handler.on_start(&context).await;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(handler = self.handler.name(), "consumer shutting down");
                        break;
                    }
                }
                delivery = rx.recv() => {
                    match delivery {
                        Some(message) => {
                            context = self.process(message, context).await;
                        }
                        None => {
                            warn!(
                                handler = self.handler.name(),
                                "delivery channel closed, stopping consumer"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.handler.on_stop(&context).await;
        Ok(context)
    }

    /// Resolve one delivery: skip, process, or retry until dead-lettered.
    async fn process(
        &self,
        message: DeliveredMessage,
        context: ConsumerContext,
    ) -> ConsumerContext {
        if !self.handler.should_handle(&message) {
            debug!(
                handler = self.handler.name(),
                topic = %message.topic,
                offset = message.offset,
                "message skipped by pre-filter"
            );
            self.metrics.record_skipped();
            self.commit_if_manual(&message).await;
            return context;
        }

        let max_retries = self.handler.max_retries();
        let mut attempt = 1u32;
        loop {
            let attempt_context = context.with_attempt(attempt);
            match self.handler.handle(&message, &attempt_context).await {
                Ok(()) => {
                    self.metrics.record_processed(message.payload.len() as u64);
                    self.commit_if_manual(&message).await;
                    return context
                        .with_attempt(attempt)
                        .with_message_count(context.message_count() + 1);
                }
                Err(err) if attempt <= max_retries => {
                    warn!(
                        handler = self.handler.name(),
                        topic = %message.topic,
                        offset = message.offset,
                        attempt,
                        error = %err,
                        "handler failed, retrying"
                    );
                    self.metrics.record_retry();
                    tokio::time::sleep(self.handler.retry_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        handler = self.handler.name(),
                        topic = %message.topic,
                        offset = message.offset,
                        attempts = attempt,
                        error = %err,
                        "retries exhausted, dead-lettering message"
                    );
                    self.handler
                        .on_failed(&message, &err, &attempt_context)
                        .await;
                    self.metrics.record_dead_lettered();
                    self.commit_if_manual(&message).await;
                    return context
                        .with_attempt(attempt)
                        .with_error_count(context.error_count() + 1);
                }
            }
        }
    }

    /// Commit the message's offset in manual-commit mode. Commit failures
    /// are logged and counted but never abort the loop.
    async fn commit_if_manual(&self, message: &DeliveredMessage) {
        if !self.options.manual_commit {
            return;
        }
        match self.client.commit(message.offset_info()).await {
            Ok(()) => self.metrics.record_commit(),
            Err(err) => {
                warn!(
                    handler = self.handler.name(),
                    topic = %message.topic,
                    offset = message.offset,
                    error = %err,
                    "offset commit failed"
                );
                self.metrics.record_commit_error();
            }
        }
    }
}

impl std::fmt::Debug for ConsumerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRunner")
            .field("handler", &self.handler.name())
            .field("driver", &self.options.driver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClient;
    use crate::error::BrokerError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        name: String,
        attempts: AtomicU32,
        fail_first: u32,
        failed: Mutex<Vec<u64>>,
        skip_empty: bool,
    }

    impl CountingHandler {
        fn new(fail_first: u32) -> Self {
            Self {
                name: "counting".to_string(),
                attempts: AtomicU32::new(0),
                fail_first,
                failed: Mutex::new(Vec::new()),
                skip_empty: false,
            }
        }
    }

    #[async_trait]
    impl ConsumerHandler for CountingHandler {
        async fn handle(
            &self,
            _message: &DeliveredMessage,
            _context: &ConsumerContext,
        ) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(BrokerError::consume("simulated failure"))
            } else {
                Ok(())
            }
        }

        fn channels(&self) -> Vec<String> {
            vec!["orders.created".to_string()]
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn max_retries(&self) -> u32 {
            2
        }

        fn retry_delay(&self, _attempt: u32) -> Duration {
            Duration::from_millis(1)
        }

        fn should_handle(&self, message: &DeliveredMessage) -> bool {
            !(self.skip_empty && message.payload.is_empty())
        }

        async fn on_failed(
            &self,
            message: &DeliveredMessage,
            _error: &BrokerError,
            _context: &ConsumerContext,
        ) {
            self.failed.lock().push(message.offset);
        }
    }

    fn runner(
        client: Arc<InMemoryClient>,
        handler: Arc<CountingHandler>,
        manual_commit: bool,
    ) -> (ConsumerRunner, ShutdownHandle) {
        let options = crate::config::ConsumerOptionsBuilder::new()
            .manual_commit(manual_commit)
            .build();
        ConsumerRunner::new(
            client,
            handler,
            TopicStrategy::per_channel("bus."),
            options,
        )
    }

    #[tokio::test]
    async fn test_successful_delivery_counts_once() {
        let client = Arc::new(InMemoryClient::new());
        client.connect().await.unwrap();
        let handler = Arc::new(CountingHandler::new(0));
        let (runner, shutdown) = runner(client.clone(), handler.clone(), false);
        let metrics = runner.metrics();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        client
            .publish("bus.orders.created", Bytes::from("p"), None, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.shutdown();

        let context = task.await.unwrap().unwrap();
        assert_eq!(context.message_count(), 1);
        assert_eq!(context.error_count(), 0);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().messages_processed, 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let client = Arc::new(InMemoryClient::new());
        client.connect().await.unwrap();
        // Fails once, succeeds on the first retry.
        let handler = Arc::new(CountingHandler::new(1));
        let (runner, shutdown) = runner(client.clone(), handler.clone(), false);
        let metrics = runner.metrics();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        client
            .publish("bus.orders.created", Bytes::from("p"), None, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.shutdown();

        let context = task.await.unwrap().unwrap();
        assert_eq!(context.message_count(), 1);
        assert_eq!(context.error_count(), 0);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.snapshot().retries, 1);
        assert!(handler.failed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let client = Arc::new(InMemoryClient::new());
        client.connect().await.unwrap();
        // Always fails: initial attempt + 2 retries, then on_failed once.
        let handler = Arc::new(CountingHandler::new(u32::MAX));
        let (runner, shutdown) = runner(client.clone(), handler.clone(), false);
        let metrics = runner.metrics();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        client
            .publish("bus.orders.created", Bytes::from("p"), None, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.shutdown();

        let context = task.await.unwrap().unwrap();
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(handler.failed.lock().len(), 1);
        assert_eq!(context.message_count(), 0);
        assert_eq!(context.error_count(), 1);
        assert_eq!(metrics.snapshot().messages_dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_skip_counts_neither_processed_nor_error() {
        let client = Arc::new(InMemoryClient::new());
        client.connect().await.unwrap();
        let handler = Arc::new(CountingHandler {
            skip_empty: true,
            ..CountingHandler::new(0)
        });
        let (runner, shutdown) = runner(client.clone(), handler.clone(), false);
        let metrics = runner.metrics();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        client
            .publish("bus.orders.created", Bytes::new(), None, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.shutdown();

        let context = task.await.unwrap().unwrap();
        assert_eq!(context.message_count(), 0);
        assert_eq!(context.error_count(), 0);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.snapshot().messages_skipped, 1);
    }

    #[tokio::test]
    async fn test_manual_commit_records_offsets() {
        let client = Arc::new(InMemoryClient::new());
        client.connect().await.unwrap();
        let handler = Arc::new(CountingHandler::new(0));
        let (runner, shutdown) = runner(client.clone(), handler, true);
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        client
            .publish("bus.orders.created", Bytes::from("a"), None, None)
            .await
            .unwrap();
        client
            .publish("bus.orders.created", Bytes::from("b"), None, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.shutdown();

        task.await.unwrap().unwrap();
        let commits = client.commits();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].offset, 0);
        assert_eq!(commits[1].offset, 1);
    }
}
