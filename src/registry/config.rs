//! Registry configuration

use std::time::Duration;

/// Bypass manager configuration options
#[derive(Debug, Clone)]
pub struct BypassConfig {
    /// How long shutdown waits for endpoints to unregister themselves
    pub shutdown_timeout: Duration,

    /// Disconnect and drop remaining endpoints once the timeout elapses
    pub force_disconnect_on_shutdown: bool,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
            force_disconnect_on_shutdown: true,
        }
    }
}

impl BypassConfig {
    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable or disable forced disconnection on shutdown
    pub fn force_disconnect_on_shutdown(mut self, force: bool) -> Self {
        self.force_disconnect_on_shutdown = force;
        self
    }
}
