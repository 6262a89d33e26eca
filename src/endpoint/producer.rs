//! Interrupt producer capability

use crate::registry::Token;

use super::callback::{Callback, CallbackError};
use super::consumer::IrqBypassConsumer;

/// A source able to deliver interrupts directly to a guest
///
/// Only [`token`](Self::token) is required. The other callbacks default to
/// no-ops; an implementation that leaves one out should also report it via
/// [`provides`](Self::provides) so the connector knows whether a step was
/// actually attempted.
///
/// Callbacks run with the registry lock held. They must not call back into
/// the registry and should return promptly.
pub trait IrqBypassProducer: Send + Sync {
    /// Pairing token
    fn token(&self) -> Token;

    /// Host interrupt line backing this producer, if any
    fn irq(&self) -> Option<u32> {
        None
    }

    /// Stop delivering interrupts
    fn stop(&self) {}

    /// Resume delivering interrupts
    fn start(&self) {}

    /// Wire the producer to `consumer`
    fn add_consumer(&self, _consumer: &dyn IrqBypassConsumer) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Undo [`add_consumer`](Self::add_consumer)
    fn del_consumer(&self, _consumer: &dyn IrqBypassConsumer) {}

    /// Whether the given callback is implemented
    fn provides(&self, _callback: Callback) -> bool {
        true
    }
}
