//! Counters for bypass manager activity

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the registry
#[derive(Debug, Default)]
pub struct BypassMetrics {
    producers_registered: AtomicU64,
    consumers_registered: AtomicU64,
    producers_unregistered: AtomicU64,
    consumers_unregistered: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    disconnects: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`BypassMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful producer registrations
    pub producers_registered: u64,
    /// Successful consumer registrations
    pub consumers_registered: u64,
    /// Producer unregistrations that removed an entry
    pub producers_unregistered: u64,
    /// Consumer unregistrations that removed an entry
    pub consumers_unregistered: u64,
    /// Successful connects
    pub connects: u64,
    /// Connects refused by a collaborator
    pub connect_failures: u64,
    /// Disconnects, including forced ones at shutdown
    pub disconnects: u64,
    /// Registrations refused before any callback ran
    pub rejected: u64,
}

impl MetricsSnapshot {
    /// Pairs currently wired, as seen by the counters
    pub fn active_connections(&self) -> u64 {
        self.connects.saturating_sub(self.disconnects)
    }
}

impl BypassMetrics {
    /// Create new zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn producer_registered(&self) {
        self.producers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn consumer_registered(&self) {
        self.consumers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn producer_unregistered(&self) {
        self.producers_unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn consumer_unregistered(&self) {
        self.consumers_unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            producers_registered: self.producers_registered.load(Ordering::Relaxed),
            consumers_registered: self.consumers_registered.load(Ordering::Relaxed),
            producers_unregistered: self.producers_unregistered.load(Ordering::Relaxed),
            consumers_unregistered: self.consumers_unregistered.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
