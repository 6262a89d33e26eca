//! Manager liveness pins
//!
//! Every registry operation holds a pin on the manager while it runs, and
//! every registered endpoint keeps one for as long as it stays registered.
//! Shutdown flips the manager to `Draining`, after which only callers that
//! can prove something is still registered (an unregistration) may pin it.
//! The manager is `Closed` once the last pin is released.

use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle phase of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessPhase {
    /// Accepting registrations
    Running,
    /// Shutdown requested, waiting for outstanding pins
    Draining,
    /// No pins left, nothing can be registered any more
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct LivenessState {
    phase: LivenessPhase,
    pins: usize,
}

/// Pin counter shared by the manager and all outstanding [`LivenessRef`]s
pub(crate) struct Liveness {
    state: Arc<watch::Sender<LivenessState>>,
}

impl Liveness {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(LivenessState {
            phase: LivenessPhase::Running,
            pins: 0,
        });

        Self {
            state: Arc::new(tx),
        }
    }

    /// Pin for a registration. Fails once shutdown has started.
    pub(crate) fn try_pin(&self) -> Option<LivenessRef> {
        self.pin_if(|state| state.phase == LivenessPhase::Running)
    }

    /// Pin for an unregistration. While draining this only succeeds if
    /// something else still holds a pin.
    pub(crate) fn try_pin_existing(&self) -> Option<LivenessRef> {
        self.pin_if(|state| match state.phase {
            LivenessPhase::Running => true,
            LivenessPhase::Draining => state.pins > 0,
            LivenessPhase::Closed => false,
        })
    }

    fn pin_if(&self, allowed: impl FnOnce(&LivenessState) -> bool) -> Option<LivenessRef> {
        let mut pinned = false;
        self.state.send_if_modified(|state| {
            if allowed(state) {
                state.pins += 1;
                pinned = true;
            }
            pinned
        });

        pinned.then(|| LivenessRef {
            state: Arc::clone(&self.state),
        })
    }

    /// Stop accepting new registrations
    pub(crate) fn begin_shutdown(&self) {
        self.state.send_if_modified(|state| {
            if state.phase != LivenessPhase::Running {
                return false;
            }
            state.phase = if state.pins == 0 {
                LivenessPhase::Closed
            } else {
                LivenessPhase::Draining
            };
            true
        });
    }

    pub(crate) fn phase(&self) -> LivenessPhase {
        self.state.borrow().phase
    }

    pub(crate) fn pins(&self) -> usize {
        self.state.borrow().pins
    }

    /// Wait until the last pin is released after shutdown began
    pub(crate) async fn closed(&self) {
        let mut rx = self.state.subscribe();
        loop {
            let phase = rx.borrow_and_update().phase;
            if phase == LivenessPhase::Closed {
                return;
            }
            // The sender lives in `self`, so this only fails if we are gone.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A pin on the manager, released on drop
pub(crate) struct LivenessRef {
    state: Arc<watch::Sender<LivenessState>>,
}

impl Drop for LivenessRef {
    fn drop(&mut self) {
        self.state.send_modify(|state| {
            debug_assert!(state.pins > 0);
            state.pins -= 1;
            if state.pins == 0 && state.phase == LivenessPhase::Draining {
                state.phase = LivenessPhase::Closed;
            }
        });
    }
}
