//! Pairing token
//!
//! A token is the key a producer and a consumer share when they describe the
//! same interrupt path (for example the eventfd context backing a guest IRQ).

/// Opaque key matching a producer with its consumer
///
/// The value `0` is the null token and is never accepted by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Token(u64);

impl Token {
    /// The null token
    pub const NULL: Token = Token(0);

    /// Create a token from a raw value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw token value
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Whether this is the null token
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
