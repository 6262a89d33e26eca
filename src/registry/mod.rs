//! Interrupt bypass registry
//!
//! The registry lets interrupt producers and consumers find each other by
//! token and drives the connect/disconnect protocol once both sides of a
//! token are present.
//!
//! # Architecture
//!
//! ```text
//!                        IrqBypassManager
//!                 ┌───────────────────────────────┐
//!                 │ Mutex<Store {                 │
//!                 │   producers: Token -> entry,  │
//!                 │   consumers: Token -> entry,  │
//!                 │ }>                            │
//!                 │ liveness: pin counter         │
//!                 └───────────────┬───────────────┘
//!                                 │ token match
//!               ┌─────────────────┴─────────────────┐
//!               ▼                                   ▼
//!         [Producer]  ◄──── connect/disconnect ──►  [Consumer]
//!         stop / add_consumer / del_consumer        stop / add_producer / del_producer
//! ```
//!
//! # Connect protocol
//!
//! Both endpoints are stopped before the wiring changes and both are started
//! again afterwards, even when a callback fails. A connect failure during
//! registration leaves the new endpoint unregistered.
//!
//! # Lifetime
//!
//! Each registered endpoint pins the manager; [`IrqBypassManager::shutdown`]
//! waits for those pins to go away (or forcibly removes them).

pub mod config;
mod connector;
pub mod entry;
pub mod error;
mod liveness;
pub mod store;
pub mod token;

pub use config::BypassConfig;
pub use entry::{ConnectionState, RegistryStats, ShutdownReport};
pub use error::{BypassError, ErrorKind};
pub use liveness::LivenessPhase;
pub use store::IrqBypassManager;
pub use token::Token;
