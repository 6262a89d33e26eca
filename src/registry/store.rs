//! Bypass manager implementation
//!
//! The registry that pairs producers with consumers by token and drives the
//! connect/disconnect protocol between them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::endpoint::{same_instance, Callback, IrqBypassConsumer, IrqBypassProducer};
use crate::stats::{BypassMetrics, MetricsSnapshot};

use super::config::BypassConfig;
use super::connector;
use super::entry::{ConnectionState, ConsumerEntry, ProducerEntry, RegistryStats, ShutdownReport};
use super::error::BypassError;
use super::liveness::{Liveness, LivenessPhase};
use super::token::Token;

/// Registered endpoints, keyed by token
#[derive(Default)]
struct Store {
    producers: HashMap<Token, ProducerEntry>,
    consumers: HashMap<Token, ConsumerEntry>,

    /// Set by a forced shutdown; nothing may be inserted afterwards
    sealed: bool,
}

impl Store {
    fn connection_count(&self) -> usize {
        self.consumers
            .keys()
            .filter(|token| self.producers.contains_key(token))
            .count()
    }
}

/// Central registry for interrupt bypass producers and consumers
///
/// One mutex serializes all four registration operations, so at most one
/// connect or disconnect runs at a time. Endpoint callbacks are invoked with
/// that mutex held.
pub struct IrqBypassManager {
    store: Mutex<Store>,

    /// Pins held by in-flight calls and registered endpoints
    liveness: Liveness,

    metrics: BypassMetrics,

    /// Configuration
    config: BypassConfig,
}

impl IrqBypassManager {
    /// Create a new manager with default configuration
    pub fn new() -> Self {
        Self::with_config(BypassConfig::default())
    }

    /// Create a new manager with custom configuration
    pub fn with_config(config: BypassConfig) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            liveness: Liveness::new(),
            metrics: BypassMetrics::new(),
            config,
        }
    }

    /// Get the manager configuration
    pub fn config(&self) -> &BypassConfig {
        &self.config
    }

    /// Register an interrupt producer
    ///
    /// If a consumer with the same token is registered the pair is connected
    /// before this returns. When the connect fails the producer is not
    /// registered and the collaborator's error is returned.
    pub async fn register_producer(
        &self,
        producer: Arc<dyn IrqBypassProducer>,
    ) -> Result<(), BypassError> {
        let token = producer.token();
        if token.is_null() {
            return Err(self.reject(BypassError::InvalidToken));
        }

        let pin = self
            .liveness
            .try_pin()
            .ok_or_else(|| self.reject(BypassError::Unavailable))?;

        let mut store = self.store.lock().await;

        if store.sealed {
            return Err(self.reject(BypassError::Unavailable));
        }
        if store.producers.contains_key(&token) {
            return Err(self.reject(BypassError::ProducerBusy(token)));
        }

        let connected = match store.consumers.get(&token) {
            Some(entry) => {
                self.connect(producer.as_ref(), entry.consumer.as_ref())?;
                true
            }
            None => false,
        };

        store
            .producers
            .insert(token, ProducerEntry::new(Arc::clone(&producer), pin));
        self.metrics.producer_registered();

        tracing::info!(
            token = %token,
            irq = ?producer.irq(),
            connected = connected,
            "Producer registered"
        );

        Ok(())
    }

    /// Unregister an interrupt producer
    ///
    /// Disconnects it from its consumer first, if one is registered. Does
    /// nothing if this producer instance is not registered.
    pub async fn unregister_producer(&self, producer: &Arc<dyn IrqBypassProducer>) {
        let token = producer.token();
        if token.is_null() {
            return;
        }

        // Nothing can be registered if the manager cannot be pinned.
        let Some(_call_pin) = self.liveness.try_pin_existing() else {
            return;
        };

        let mut store = self.store.lock().await;

        // Prefer the token lookup; fall back to the instance in case token()
        // changed since registration.
        let token = match store.producers.get(&token) {
            Some(entry) if same_instance(&entry.producer, producer) => token,
            Some(_) => {
                tracing::warn!(token = %token, "Producer unregister mismatch, token held by another instance");
                return;
            }
            None => {
                let Some(stored) = store
                    .producers
                    .iter()
                    .find(|(_, entry)| same_instance(&entry.producer, producer))
                    .map(|(stored, _)| *stored)
                else {
                    tracing::debug!(token = %token, "Producer not registered");
                    return;
                };
                stored
            }
        };

        let disconnected = match store.consumers.get(&token) {
            Some(entry) => {
                self.disconnect(producer.as_ref(), entry.consumer.as_ref());
                true
            }
            None => false,
        };

        if let Some(entry) = store.producers.remove(&token) {
            self.metrics.producer_unregistered();
            tracing::info!(
                token = %token,
                disconnected = disconnected,
                registered_for = ?entry.registered_at.elapsed(),
                "Producer unregistered"
            );
        }
    }

    /// Register an interrupt consumer
    ///
    /// The consumer must provide `add_producer` and `del_producer`. A
    /// consumer instance can only be registered once, under any token.
    pub async fn register_consumer(
        &self,
        consumer: Arc<dyn IrqBypassConsumer>,
    ) -> Result<(), BypassError> {
        let token = consumer.token();
        if token.is_null() {
            return Err(self.reject(BypassError::InvalidToken));
        }
        if let Some(missing) = Callback::CONSUMER_REQUIRED
            .into_iter()
            .find(|callback| !consumer.provides(*callback))
        {
            return Err(self.reject(BypassError::MissingCallback(missing)));
        }

        let pin = self
            .liveness
            .try_pin()
            .ok_or_else(|| self.reject(BypassError::Unavailable))?;

        let mut store = self.store.lock().await;

        if store.sealed {
            return Err(self.reject(BypassError::Unavailable));
        }
        if store.consumers.contains_key(&token) {
            return Err(self.reject(BypassError::ConsumerBusy(token)));
        }
        if let Some((existing, _)) = store
            .consumers
            .iter()
            .find(|(_, entry)| same_instance(&entry.consumer, &consumer))
        {
            return Err(self.reject(BypassError::ConsumerAlreadyRegistered(*existing)));
        }

        let connected = match store.producers.get(&token) {
            Some(entry) => {
                self.connect(entry.producer.as_ref(), consumer.as_ref())?;
                true
            }
            None => false,
        };

        store
            .consumers
            .insert(token, ConsumerEntry::new(consumer, pin));
        self.metrics.consumer_registered();

        tracing::info!(token = %token, connected = connected, "Consumer registered");

        Ok(())
    }

    /// Unregister an interrupt consumer
    ///
    /// Disconnects it from its producer first, if one is registered. Does
    /// nothing if this consumer instance is not registered.
    pub async fn unregister_consumer(&self, consumer: &Arc<dyn IrqBypassConsumer>) {
        if consumer.token().is_null() {
            return;
        }

        let Some(_call_pin) = self.liveness.try_pin_existing() else {
            return;
        };

        let mut store = self.store.lock().await;

        // Look the entry up by instance; the key it was stored under wins
        // over whatever token() reports now.
        let Some(token) = store
            .consumers
            .iter()
            .find(|(_, entry)| same_instance(&entry.consumer, consumer))
            .map(|(token, _)| *token)
        else {
            tracing::debug!(token = %consumer.token(), "Consumer not registered");
            return;
        };

        let disconnected = match store.producers.get(&token) {
            Some(entry) => {
                self.disconnect(entry.producer.as_ref(), consumer.as_ref());
                true
            }
            None => false,
        };

        if let Some(entry) = store.consumers.remove(&token) {
            self.metrics.consumer_unregistered();
            tracing::info!(
                token = %token,
                disconnected = disconnected,
                registered_for = ?entry.registered_at.elapsed(),
                "Consumer unregistered"
            );
        }
    }

    fn connect(
        &self,
        producer: &dyn IrqBypassProducer,
        consumer: &dyn IrqBypassConsumer,
    ) -> Result<(), BypassError> {
        let token = producer.token();

        match connector::connect(producer, consumer) {
            Ok(()) => {
                self.metrics.connected();
                tracing::debug!(token = %token, "Connected");
                Ok(())
            }
            Err(source) => {
                self.metrics.connect_failed();
                tracing::warn!(token = %token, error = %source, "Connect failed");
                Err(BypassError::ConnectFailed { token, source })
            }
        }
    }

    fn disconnect(&self, producer: &dyn IrqBypassProducer, consumer: &dyn IrqBypassConsumer) {
        connector::disconnect(producer, consumer);
        self.metrics.disconnected();
        tracing::debug!(token = %producer.token(), "Disconnected");
    }

    fn reject(&self, error: BypassError) -> BypassError {
        self.metrics.rejected();
        tracing::debug!(error = %error, "Registration rejected");
        error
    }

    /// Number of registered producers
    pub async fn producer_count(&self) -> usize {
        self.store.lock().await.producers.len()
    }

    /// Number of registered consumers
    pub async fn consumer_count(&self) -> usize {
        self.store.lock().await.consumers.len()
    }

    /// Number of connected pairs
    pub async fn connection_count(&self) -> usize {
        self.store.lock().await.connection_count()
    }

    /// Check if a producer and a consumer are connected on this token
    pub async fn is_connected(&self, token: Token) -> bool {
        self.connection_state(token).await == Some(ConnectionState::Connected)
    }

    /// Get the pairing state of a token
    pub async fn connection_state(&self, token: Token) -> Option<ConnectionState> {
        let store = self.store.lock().await;

        match (
            store.producers.contains_key(&token),
            store.consumers.contains_key(&token),
        ) {
            (true, true) => Some(ConnectionState::Connected),
            (true, false) => Some(ConnectionState::ProducerOnly),
            (false, true) => Some(ConnectionState::ConsumerOnly),
            (false, false) => None,
        }
    }

    /// Get registry statistics
    pub async fn stats(&self) -> RegistryStats {
        let store = self.store.lock().await;

        RegistryStats {
            producers: store.producers.len(),
            consumers: store.consumers.len(),
            connections: store.connection_count(),
        }
    }

    /// Get a snapshot of the activity counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> LivenessPhase {
        self.liveness.phase()
    }

    /// Whether new registrations are accepted
    pub fn is_accepting(&self) -> bool {
        self.phase() == LivenessPhase::Running
    }

    /// Shut the manager down
    ///
    /// New registrations fail with [`BypassError::Unavailable`] from now on.
    /// Waits up to `shutdown_timeout` for every endpoint to unregister. After
    /// that, remaining pairs are disconnected and dropped if
    /// `force_disconnect_on_shutdown` is set; otherwise
    /// [`BypassError::ShutdownTimedOut`] is returned and the manager keeps
    /// draining.
    pub async fn shutdown(&self) -> Result<ShutdownReport, BypassError> {
        self.liveness.begin_shutdown();

        tracing::info!(
            pins = self.liveness.pins(),
            timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
            "Bypass manager shutting down"
        );

        if tokio::time::timeout(self.config.shutdown_timeout, self.liveness.closed())
            .await
            .is_ok()
        {
            tracing::info!("Bypass manager closed");
            return Ok(ShutdownReport::default());
        }

        let mut guard = self.store.lock().await;
        let store = &mut *guard;

        if !self.config.force_disconnect_on_shutdown {
            let err = BypassError::ShutdownTimedOut {
                producers: store.producers.len(),
                consumers: store.consumers.len(),
            };
            tracing::warn!(error = %err, "Shutdown timed out");
            return Err(err);
        }

        store.sealed = true;

        let mut report = ShutdownReport::default();
        for (token, consumer) in &store.consumers {
            if let Some(producer) = store.producers.get(token) {
                self.disconnect(producer.producer.as_ref(), consumer.consumer.as_ref());
                report.forced_disconnects += 1;
            }
        }

        report.forced_producers = store.producers.drain().map(|(token, _)| token).collect();
        report.forced_consumers = store.consumers.drain().map(|(token, _)| token).collect();
        report.forced_producers.sort();
        report.forced_consumers.sort();
        drop(guard);

        tracing::warn!(
            producers = report.forced_producers.len(),
            consumers = report.forced_consumers.len(),
            disconnects = report.forced_disconnects,
            "Forced shutdown dropped registered endpoints"
        );

        // Only in-flight calls can still hold pins; they finish promptly now
        // that the store is sealed.
        self.liveness.closed().await;
        tracing::info!("Bypass manager closed");

        Ok(report)
    }
}

impl Default for IrqBypassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqBypassManager {
    fn drop(&mut self) {
        let store = self.store.get_mut();
        if !store.producers.is_empty() || !store.consumers.is_empty() {
            tracing::warn!(
                producers = store.producers.len(),
                consumers = store.consumers.len(),
                "Bypass manager dropped with endpoints still registered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::endpoint::{CallbackError, ConsumerDescriptor};
    use crate::registry::ErrorKind;

    /// Ordered record of every callback invoked on the mocks
    #[derive(Default)]
    struct CallLog {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl CallLog {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, suffix: &str) -> usize {
            self.events().iter().filter(|e| e.ends_with(suffix)).count()
        }
    }

    struct MockProducer {
        // Atomic so a test can move an instance to another token.
        token: AtomicU64,
        log: Arc<CallLog>,
        fail_add: bool,
    }

    impl IrqBypassProducer for MockProducer {
        fn token(&self) -> Token {
            Token::new(self.token.load(Ordering::Relaxed))
        }

        fn irq(&self) -> Option<u32> {
            Some(self.token().value() as u32 + 32)
        }

        fn stop(&self) {
            self.log.push(format!("p{}.stop", self.token().value()));
        }

        fn start(&self) {
            self.log.push(format!("p{}.start", self.token().value()));
        }

        fn add_consumer(&self, _consumer: &dyn IrqBypassConsumer) -> Result<(), CallbackError> {
            self.log
                .push(format!("p{}.add_consumer", self.token().value()));
            if self.fail_add {
                Err(CallbackError::new(-16, "vector already posted"))
            } else {
                Ok(())
            }
        }

        fn del_consumer(&self, _consumer: &dyn IrqBypassConsumer) {
            self.log
                .push(format!("p{}.del_consumer", self.token().value()));
        }
    }

    struct MockConsumer {
        // Atomic so a test can move an instance to another token.
        token: AtomicU64,
        log: Arc<CallLog>,
        fail_add: bool,
    }

    impl IrqBypassConsumer for MockConsumer {
        fn token(&self) -> Token {
            Token::new(self.token.load(Ordering::Relaxed))
        }

        fn add_producer(&self, _producer: &dyn IrqBypassProducer) -> Result<(), CallbackError> {
            self.log
                .push(format!("c{}.add_producer", self.token().value()));
            if self.fail_add {
                Err(CallbackError::new(-22, "posted interrupts unavailable"))
            } else {
                Ok(())
            }
        }

        fn del_producer(&self, _producer: &dyn IrqBypassProducer) {
            self.log
                .push(format!("c{}.del_producer", self.token().value()));
        }

        fn stop(&self) {
            self.log.push(format!("c{}.stop", self.token().value()));
        }

        fn start(&self) {
            self.log.push(format!("c{}.start", self.token().value()));
        }
    }

    fn producer(token: u64, log: &Arc<CallLog>) -> Arc<dyn IrqBypassProducer> {
        Arc::new(MockProducer {
            token: AtomicU64::new(token),
            log: Arc::clone(log),
            fail_add: false,
        })
    }

    fn failing_producer(token: u64, log: &Arc<CallLog>) -> Arc<dyn IrqBypassProducer> {
        Arc::new(MockProducer {
            token: AtomicU64::new(token),
            log: Arc::clone(log),
            fail_add: true,
        })
    }

    fn consumer(token: u64, log: &Arc<CallLog>) -> Arc<dyn IrqBypassConsumer> {
        Arc::new(MockConsumer {
            token: AtomicU64::new(token),
            log: Arc::clone(log),
            fail_add: false,
        })
    }

    fn failing_consumer(token: u64, log: &Arc<CallLog>) -> Arc<dyn IrqBypassConsumer> {
        Arc::new(MockConsumer {
            token: AtomicU64::new(token),
            log: Arc::clone(log),
            fail_add: true,
        })
    }

    #[tokio::test]
    async fn test_producer_then_consumer_connects() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        assert_ok!(manager.register_producer(producer(5, &log)).await);
        assert!(log.events().is_empty());
        assert_eq!(
            manager.connection_state(Token::new(5)).await,
            Some(ConnectionState::ProducerOnly)
        );

        assert_ok!(manager.register_consumer(consumer(5, &log)).await);
        assert_eq!(log.count(".add_producer"), 1);
        assert_eq!(manager.consumer_count().await, 1);
        assert!(manager.is_connected(Token::new(5)).await);
        assert_eq!(
            log.events(),
            vec![
                "p5.stop",
                "c5.stop",
                "p5.add_consumer",
                "c5.add_producer",
                "c5.start",
                "p5.start"
            ]
        );
    }

    #[tokio::test]
    async fn test_consumer_then_producer_connects() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        assert_ok!(manager.register_consumer(consumer(8, &log)).await);
        assert_eq!(
            manager.connection_state(Token::new(8)).await,
            Some(ConnectionState::ConsumerOnly)
        );

        assert_ok!(manager.register_producer(producer(8, &log)).await);
        assert_eq!(log.count(".add_producer"), 1);
        assert!(manager.is_connected(Token::new(8)).await);
    }

    #[tokio::test]
    async fn test_duplicate_producer_token() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        assert_ok!(manager.register_producer(producer(1, &log)).await);
        let err = assert_err!(manager.register_producer(producer(1, &log)).await);

        assert_eq!(err, BypassError::ProducerBusy(Token::new(1)));
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(manager.producer_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_consumer_token() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        assert_ok!(manager.register_consumer(consumer(4, &log)).await);
        let err = assert_err!(manager.register_consumer(consumer(4, &log)).await);

        assert_eq!(err, BypassError::ConsumerBusy(Token::new(4)));
        assert_eq!(manager.consumer_count().await, 1);
    }

    #[tokio::test]
    async fn test_same_consumer_instance_under_new_token() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());
        let mock = Arc::new(MockConsumer {
            token: AtomicU64::new(4),
            log: Arc::clone(&log),
            fail_add: false,
        });
        let handle: Arc<dyn IrqBypassConsumer> = mock.clone();

        assert_ok!(manager.register_consumer(Arc::clone(&handle)).await);

        mock.token.store(5, Ordering::Relaxed);
        let err = assert_err!(manager.register_consumer(Arc::clone(&handle)).await);

        assert_eq!(err, BypassError::ConsumerAlreadyRegistered(Token::new(4)));
        assert_eq!(manager.consumer_count().await, 1);

        // Unregistration follows the instance, not the token it reports now.
        manager.unregister_consumer(&handle).await;
        assert_eq!(manager.consumer_count().await, 0);
    }

    #[tokio::test]
    async fn test_producer_unregistered_after_token_change() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());
        let mock = Arc::new(MockProducer {
            token: AtomicU64::new(4),
            log: Arc::clone(&log),
            fail_add: false,
        });
        let handle: Arc<dyn IrqBypassProducer> = mock.clone();

        assert_ok!(manager.register_producer(Arc::clone(&handle)).await);
        assert_ok!(manager.register_consumer(consumer(4, &log)).await);

        mock.token.store(5, Ordering::Relaxed);
        manager.unregister_producer(&handle).await;

        // Found by instance and disconnected from the consumer on its old token
        assert_eq!(manager.producer_count().await, 0);
        assert_eq!(log.count(".del_producer"), 1);
        assert_eq!(
            manager.connection_state(Token::new(4)).await,
            Some(ConnectionState::ConsumerOnly)
        );
    }

    #[tokio::test]
    async fn test_producer_token_change_does_not_block_shutdown() {
        let config = BypassConfig::default()
            .shutdown_timeout(Duration::from_millis(50))
            .force_disconnect_on_shutdown(false);
        let manager = IrqBypassManager::with_config(config);
        let log = Arc::new(CallLog::default());
        let mock = Arc::new(MockProducer {
            token: AtomicU64::new(4),
            log: Arc::clone(&log),
            fail_add: false,
        });
        let handle: Arc<dyn IrqBypassProducer> = mock.clone();

        assert_ok!(manager.register_producer(Arc::clone(&handle)).await);
        mock.token.store(5, Ordering::Relaxed);
        manager.unregister_producer(&handle).await;

        let report = assert_ok!(manager.shutdown().await);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_consumer_missing_del_producer() {
        let manager = IrqBypassManager::new();
        let incomplete: Arc<dyn IrqBypassConsumer> =
            Arc::new(ConsumerDescriptor::new(Token::new(2)).on_add_producer(|_| Ok(())));

        let err = assert_err!(manager.register_consumer(incomplete).await);

        assert_eq!(err, BypassError::MissingCallback(Callback::DelProducer));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(manager.consumer_count().await, 0);
    }

    #[tokio::test]
    async fn test_null_token_rejected() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        let err = assert_err!(manager.register_producer(producer(0, &log)).await);
        assert_eq!(err, BypassError::InvalidToken);

        let err = assert_err!(manager.register_consumer(consumer(0, &log)).await);
        assert_eq!(err, BypassError::InvalidToken);

        assert_eq!(manager.stats().await, RegistryStats::default());
        assert_eq!(manager.metrics().rejected, 2);
    }

    #[tokio::test]
    async fn test_register_unregister_without_match() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());
        let p = producer(7, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p)).await);
        manager.unregister_producer(&p).await;

        assert_eq!(manager.producer_count().await, 0);
        assert!(log.events().is_empty());
        assert_eq!(manager.connection_state(Token::new(7)).await, None);
    }

    #[tokio::test]
    async fn test_unregister_consumer_disconnects() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());
        let p = producer(9, &log);
        let c = consumer(9, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p)).await);
        assert_ok!(manager.register_consumer(Arc::clone(&c)).await);

        manager.unregister_consumer(&c).await;

        assert_eq!(log.count(".del_producer"), 1);
        assert_eq!(log.count(".del_consumer"), 1);
        assert_eq!(manager.consumer_count().await, 0);
        assert_eq!(manager.producer_count().await, 1);
        assert_eq!(
            manager.connection_state(Token::new(9)).await,
            Some(ConnectionState::ProducerOnly)
        );
    }

    #[tokio::test]
    async fn test_unregister_producer_disconnects_and_reconnects() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());
        let p = producer(6, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p)).await);
        assert_ok!(manager.register_consumer(consumer(6, &log)).await);

        manager.unregister_producer(&p).await;

        assert_eq!(log.count(".del_producer"), 1);
        assert_eq!(
            manager.connection_state(Token::new(6)).await,
            Some(ConnectionState::ConsumerOnly)
        );

        // A replacement producer picks the consumer up again
        assert_ok!(manager.register_producer(producer(6, &log)).await);
        assert_eq!(log.count(".add_producer"), 2);
        assert!(manager.is_connected(Token::new(6)).await);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_consumer_unregistered() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        assert_ok!(manager.register_producer(producer(3, &log)).await);
        let err = assert_err!(manager.register_consumer(failing_consumer(3, &log)).await);

        assert_eq!(
            err,
            BypassError::ConnectFailed {
                token: Token::new(3),
                source: CallbackError::new(-22, "posted interrupts unavailable"),
            }
        );
        assert_eq!(manager.consumer_count().await, 0);
        assert_eq!(
            manager.connection_state(Token::new(3)).await,
            Some(ConnectionState::ProducerOnly)
        );

        // Producer side was rolled back and both sides restarted
        assert_eq!(log.count(".del_consumer"), 1);
        assert_eq!(log.count(".start"), 2);

        // The failed attempt leaked nothing
        assert_eq!(manager.metrics().connect_failures, 1);
        assert_ok!(manager.register_consumer(consumer(3, &log)).await);
        assert!(manager.is_connected(Token::new(3)).await);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_producer_unregistered() {
        let config = BypassConfig::default()
            .shutdown_timeout(Duration::from_millis(50))
            .force_disconnect_on_shutdown(false);
        let manager = IrqBypassManager::with_config(config);
        let log = Arc::new(CallLog::default());
        let c = consumer(3, &log);

        assert_ok!(manager.register_consumer(Arc::clone(&c)).await);
        let err = assert_err!(manager.register_producer(failing_producer(3, &log)).await);

        assert_eq!(
            err,
            BypassError::ConnectFailed {
                token: Token::new(3),
                source: CallbackError::new(-16, "vector already posted"),
            }
        );
        assert_eq!(manager.producer_count().await, 0);
        assert_eq!(
            manager.connection_state(Token::new(3)).await,
            Some(ConnectionState::ConsumerOnly)
        );

        // Consumer side never saw the producer, both sides were restarted
        assert_eq!(log.count(".add_producer"), 0);
        assert_eq!(log.count(".start"), 2);

        // Only the consumer's pin is left; once it goes, shutdown is clean
        manager.unregister_consumer(&c).await;
        assert_eq!(log.count(".del_producer"), 0);

        let report = assert_ok!(manager.shutdown().await);
        assert!(report.is_clean());
        assert_eq!(manager.phase(), LivenessPhase::Closed);
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        manager.unregister_producer(&producer(11, &log)).await;
        manager.unregister_consumer(&consumer(11, &log)).await;
        manager.unregister_producer(&producer(0, &log)).await;

        assert!(log.events().is_empty());
        assert_eq!(manager.metrics(), MetricsSnapshot::default());
    }

    #[tokio::test]
    async fn test_unregister_other_instance_ignored() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        assert_ok!(manager.register_producer(producer(12, &log)).await);
        assert_ok!(manager.register_consumer(consumer(12, &log)).await);

        let impostor = producer(12, &log);
        manager.unregister_producer(&impostor).await;

        assert_eq!(manager.producer_count().await, 1);
        assert_eq!(log.count(".del_producer"), 0);
        assert!(manager.is_connected(Token::new(12)).await);
    }

    #[tokio::test]
    async fn test_stats_and_metrics() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());
        let p1 = producer(1, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p1)).await);
        assert_ok!(manager.register_producer(producer(2, &log)).await);
        assert_ok!(manager.register_consumer(consumer(1, &log)).await);
        assert_ok!(manager.register_consumer(consumer(3, &log)).await);

        assert_eq!(
            manager.stats().await,
            RegistryStats {
                producers: 2,
                consumers: 2,
                connections: 1,
            }
        );

        manager.unregister_producer(&p1).await;

        let metrics = manager.metrics();
        assert_eq!(metrics.producers_registered, 2);
        assert_eq!(metrics.consumers_registered, 2);
        assert_eq!(metrics.producers_unregistered, 1);
        assert_eq!(metrics.connects, 1);
        assert_eq!(metrics.disconnects, 1);
        assert_eq!(metrics.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_when_empty() {
        let manager = IrqBypassManager::new();
        let log = Arc::new(CallLog::default());

        let report = assert_ok!(manager.shutdown().await);
        assert!(report.is_clean());
        assert_eq!(manager.phase(), LivenessPhase::Closed);
        assert!(!manager.is_accepting());

        let err = assert_err!(manager.register_producer(producer(1, &log)).await);
        assert_eq!(err, BypassError::Unavailable);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_unregistration() {
        let manager = Arc::new(IrqBypassManager::new());
        let log = Arc::new(CallLog::default());
        let p = producer(1, &log);
        let c = consumer(1, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p)).await);
        assert_ok!(manager.register_consumer(Arc::clone(&c)).await);

        let shutdown = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.shutdown().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());
        assert_eq!(manager.phase(), LivenessPhase::Draining);

        // New registrations are refused, teardown still works
        let err = assert_err!(manager.register_producer(producer(2, &log)).await);
        assert_eq!(err, BypassError::Unavailable);

        manager.unregister_consumer(&c).await;
        manager.unregister_producer(&p).await;
        assert_eq!(log.count(".del_producer"), 1);

        let report = assert_ok!(shutdown.await.unwrap());
        assert!(report.is_clean());
        assert_eq!(manager.phase(), LivenessPhase::Closed);
    }

    #[tokio::test]
    async fn test_forced_shutdown() {
        let config = BypassConfig::default().shutdown_timeout(Duration::from_millis(20));
        let manager = IrqBypassManager::with_config(config);
        let log = Arc::new(CallLog::default());
        let p = producer(5, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p)).await);
        assert_ok!(manager.register_consumer(consumer(5, &log)).await);
        assert_ok!(manager.register_consumer(consumer(6, &log)).await);

        let report = assert_ok!(manager.shutdown().await);

        assert!(!report.is_clean());
        assert_eq!(report.forced_producers, vec![Token::new(5)]);
        assert_eq!(report.forced_consumers, vec![Token::new(5), Token::new(6)]);
        assert_eq!(report.forced_disconnects, 1);
        assert_eq!(log.count(".del_producer"), 1);
        assert_eq!(manager.stats().await, RegistryStats::default());
        assert_eq!(manager.phase(), LivenessPhase::Closed);

        // Late teardown from the collaborator is harmless
        manager.unregister_producer(&p).await;
        assert_eq!(log.count(".del_producer"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_without_force() {
        let config = BypassConfig::default()
            .shutdown_timeout(Duration::from_millis(20))
            .force_disconnect_on_shutdown(false);
        let manager = IrqBypassManager::with_config(config);
        let log = Arc::new(CallLog::default());
        let p = producer(1, &log);

        assert_ok!(manager.register_producer(Arc::clone(&p)).await);

        let err = assert_err!(manager.shutdown().await);
        assert_eq!(
            err,
            BypassError::ShutdownTimedOut {
                producers: 1,
                consumers: 0,
            }
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(manager.producer_count().await, 1);

        manager.unregister_producer(&p).await;
        assert_eq!(manager.phase(), LivenessPhase::Closed);

        let report = assert_ok!(manager.shutdown().await);
        assert!(report.is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let manager = Arc::new(IrqBypassManager::new());
        let log = Arc::new(CallLog::default());
        let mut handles = Vec::new();

        for token in 1..=16u64 {
            let m = Arc::clone(&manager);
            let l = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                m.register_producer(producer(token, &l)).await
            }));

            let m = Arc::clone(&manager);
            let l = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                m.register_consumer(consumer(token, &l)).await
            }));
        }

        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        // Exactly one connect per token, whichever side arrived second
        assert_eq!(manager.connection_count().await, 16);
        assert_eq!(log.count(".add_producer"), 16);
        assert_eq!(manager.metrics().connects, 16);
    }
}
