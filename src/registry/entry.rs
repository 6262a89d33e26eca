//! Registered entries and connection state
//!
//! This module defines the per-endpoint records stored in the registry.

use std::sync::Arc;
use std::time::Instant;

use crate::endpoint::{IrqBypassConsumer, IrqBypassProducer};

use super::liveness::LivenessRef;
use super::token::Token;

/// Pairing state of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Only a producer is registered
    ProducerOnly,
    /// Only a consumer is registered
    ConsumerOnly,
    /// Producer and consumer are registered and wired together
    Connected,
}

/// A registered producer
pub(super) struct ProducerEntry {
    pub(super) producer: Arc<dyn IrqBypassProducer>,

    /// When the producer was registered
    pub(super) registered_at: Instant,

    /// Keeps the manager alive while the producer is registered
    _pin: LivenessRef,
}

impl ProducerEntry {
    pub(super) fn new(producer: Arc<dyn IrqBypassProducer>, pin: LivenessRef) -> Self {
        Self {
            producer,
            registered_at: Instant::now(),
            _pin: pin,
        }
    }
}

/// A registered consumer
pub(super) struct ConsumerEntry {
    pub(super) consumer: Arc<dyn IrqBypassConsumer>,

    /// When the consumer was registered
    pub(super) registered_at: Instant,

    /// Keeps the manager alive while the consumer is registered
    _pin: LivenessRef,
}

impl ConsumerEntry {
    pub(super) fn new(consumer: Arc<dyn IrqBypassConsumer>, pin: LivenessRef) -> Self {
        Self {
            consumer,
            registered_at: Instant::now(),
            _pin: pin,
        }
    }
}

/// Registry-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered producers
    pub producers: usize,
    /// Registered consumers
    pub consumers: usize,
    /// Tokens with both sides registered
    pub connections: usize,
}

/// Tokens dropped by a forced shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Producers that were still registered
    pub forced_producers: Vec<Token>,
    /// Consumers that were still registered
    pub forced_consumers: Vec<Token>,
    /// Pairs disconnected by the shutdown
    pub forced_disconnects: usize,
}

impl ShutdownReport {
    /// Whether every endpoint unregistered on its own
    pub fn is_clean(&self) -> bool {
        self.forced_producers.is_empty() && self.forced_consumers.is_empty()
    }
}
