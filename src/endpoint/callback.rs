//! Callback identifiers and the error a callback can report

/// Every callback an endpoint may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// Quiesce the endpoint before rewiring
    Stop,
    /// Resume the endpoint after rewiring
    Start,
    /// Producer side: attach a consumer
    AddConsumer,
    /// Producer side: detach a consumer
    DelConsumer,
    /// Consumer side: attach a producer (mandatory)
    AddProducer,
    /// Consumer side: detach a producer (mandatory)
    DelProducer,
}

impl Callback {
    /// Callbacks every consumer must provide
    pub const CONSUMER_REQUIRED: [Callback; 2] = [Callback::AddProducer, Callback::DelProducer];

    /// Callback name as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Callback::Stop => "stop",
            Callback::Start => "start",
            Callback::AddConsumer => "add_consumer",
            Callback::DelConsumer => "del_consumer",
            Callback::AddProducer => "add_producer",
            Callback::DelProducer => "del_producer",
        }
    }
}

impl std::fmt::Display for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by a collaborator's `add_consumer`/`add_producer`
///
/// The registry never inspects it; it is handed back verbatim inside
/// [`BypassError::ConnectFailed`](crate::registry::BypassError::ConnectFailed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    /// Collaborator-defined code (negative errno values are typical)
    pub code: i32,
    /// Human readable description
    pub message: String,
}

impl CallbackError {
    /// Create a new callback error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for CallbackError {}
