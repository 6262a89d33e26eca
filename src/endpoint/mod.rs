//! Interrupt bypass endpoints
//!
//! Producers are paths able to deliver an interrupt straight to a guest
//! (a VFIO device's host IRQ, for instance). Consumers are the entities that
//! take over delivery once paired (a KVM irqfd with posted interrupts).
//!
//! Both sides are owned by the collaborator that registers them. The registry
//! only keeps an `Arc` for as long as the endpoint stays registered.

pub mod callback;
pub mod consumer;
pub mod descriptor;
pub mod producer;

pub use callback::{Callback, CallbackError};
pub use consumer::IrqBypassConsumer;
pub use descriptor::{ConsumerDescriptor, ProducerDescriptor};
pub use producer::IrqBypassProducer;

use std::sync::Arc;

/// Whether two handles point at the same endpoint instance
///
/// Compares data pointers only; vtable pointers of the same type may differ
/// between codegen units.
pub(crate) fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
