//! Interrupt consumer capability

use crate::registry::Token;

use super::callback::{Callback, CallbackError};
use super::producer::IrqBypassProducer;

/// An entity that takes over delivery of bypassed interrupts
///
/// `add_producer` and `del_producer` are mandatory. A consumer reporting
/// either of them as missing through [`provides`](Self::provides) is refused
/// at registration.
///
/// Callbacks run with the registry lock held. They must not call back into
/// the registry and should return promptly.
pub trait IrqBypassConsumer: Send + Sync {
    /// Pairing token
    fn token(&self) -> Token;

    /// Take over interrupts from `producer`
    fn add_producer(&self, producer: &dyn IrqBypassProducer) -> Result<(), CallbackError>;

    /// Hand interrupts from `producer` back to the host path
    fn del_producer(&self, producer: &dyn IrqBypassProducer);

    /// Stop handling interrupts
    fn stop(&self) {}

    /// Resume handling interrupts
    fn start(&self) {}

    /// Whether the given callback is implemented
    fn provides(&self, _callback: Callback) -> bool {
        true
    }
}
