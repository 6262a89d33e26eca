//! # irq-bypass
//!
//! Interrupt offload/bypass manager.
//!
//! Virtualization hardware can deliver device interrupts straight to a guest
//! (posted interrupts on VT-d, forwarded IRQs on ARM). Making that work needs
//! two parties to agree: the *producer* that owns the host interrupt and the
//! *consumer* that owns the guest side. This crate is the rendezvous point.
//! Both register under a shared [`Token`] and the manager connects them as
//! soon as both are present.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use irq_bypass::{ConsumerDescriptor, IrqBypassManager, ProducerDescriptor, Token};
//!
//! # async fn run() -> Result<(), irq_bypass::BypassError> {
//! let manager = IrqBypassManager::new();
//! let token = Token::new(0x1000);
//!
//! manager
//!     .register_producer(Arc::new(ProducerDescriptor::new(token).host_irq(42)))
//!     .await?;
//! manager
//!     .register_consumer(Arc::new(
//!         ConsumerDescriptor::new(token)
//!             .on_add_producer(|producer| {
//!                 println!("posting host irq {:?}", producer.irq());
//!                 Ok(())
//!             })
//!             .on_del_producer(|_| {}),
//!     ))
//!     .await?;
//!
//! assert!(manager.is_connected(token).await);
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod registry;
pub mod stats;

pub use endpoint::{
    Callback, CallbackError, ConsumerDescriptor, IrqBypassConsumer, IrqBypassProducer,
    ProducerDescriptor,
};
pub use registry::{
    BypassConfig, BypassError, ConnectionState, ErrorKind, IrqBypassManager, LivenessPhase,
    RegistryStats, ShutdownReport, Token,
};
pub use stats::{BypassMetrics, MetricsSnapshot};
