//! Registry error types
//!
//! Error types for interrupt bypass registry operations.

use crate::endpoint::{Callback, CallbackError};

use super::token::Token;

/// Broad category of a registry error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Null token or missing mandatory callback
    InvalidArgument,
    /// Token or instance already registered
    Busy,
    /// The manager no longer accepts registrations
    Unavailable,
    /// A collaborator refused the connection
    ConnectFailed,
    /// Shutdown gave up waiting for endpoints to unregister
    Timeout,
}

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassError {
    /// Endpoint carries the null token
    InvalidToken,
    /// Consumer does not provide a mandatory callback
    MissingCallback(Callback),
    /// A producer with this token is already registered
    ProducerBusy(Token),
    /// A consumer with this token is already registered
    ConsumerBusy(Token),
    /// This consumer instance is already registered (possibly under another token)
    ConsumerAlreadyRegistered(Token),
    /// The manager is shutting down or closed
    Unavailable,
    /// `add_consumer` or `add_producer` failed while connecting
    ConnectFailed {
        /// Token of the pair being connected
        token: Token,
        /// Error returned by the collaborator
        source: CallbackError,
    },
    /// Endpoints were still registered when the shutdown timeout elapsed
    ShutdownTimedOut {
        /// Producers still registered
        producers: usize,
        /// Consumers still registered
        consumers: usize,
    },
}

impl BypassError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BypassError::InvalidToken | BypassError::MissingCallback(_) => {
                ErrorKind::InvalidArgument
            }
            BypassError::ProducerBusy(_)
            | BypassError::ConsumerBusy(_)
            | BypassError::ConsumerAlreadyRegistered(_) => ErrorKind::Busy,
            BypassError::Unavailable => ErrorKind::Unavailable,
            BypassError::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            BypassError::ShutdownTimedOut { .. } => ErrorKind::Timeout,
        }
    }
}

impl std::fmt::Display for BypassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BypassError::InvalidToken => write!(f, "Invalid (null) token"),
            BypassError::MissingCallback(callback) => {
                write!(f, "Consumer does not provide {}", callback)
            }
            BypassError::ProducerBusy(token) => {
                write!(f, "Producer already registered for token {}", token)
            }
            BypassError::ConsumerBusy(token) => {
                write!(f, "Consumer already registered for token {}", token)
            }
            BypassError::ConsumerAlreadyRegistered(token) => {
                write!(f, "Consumer instance already registered with token {}", token)
            }
            BypassError::Unavailable => write!(f, "Bypass manager is shutting down"),
            BypassError::ConnectFailed { token, source } => {
                write!(f, "Connect failed for token {}: {}", token, source)
            }
            BypassError::ShutdownTimedOut {
                producers,
                consumers,
            } => write!(
                f,
                "Shutdown timed out with {} producers and {} consumers registered",
                producers, consumers
            ),
        }
    }
}

impl std::error::Error for BypassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BypassError::ConnectFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
