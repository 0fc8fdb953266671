//! Error types shared by the bridge, the object model and the dispatcher

use crate::abi::Address;
use std::fmt;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong crossing the native/host boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// No binding (or allocation) exists for the requested key
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// A bridged object was reclaimed by the host while native code still held its address
    #[error("object bridged at {address} was reclaimed before its binding was released")]
    PrematureCollection { address: Address },

    /// The allocator could not satisfy a request
    #[error("failed to allocate {size} bytes")]
    Allocation { size: usize },

    /// A method descriptor used a flag combination outside the bridged set
    #[error("unsupported calling convention for {name}: flags {flags:#x}")]
    UnsupportedConvention { name: String, flags: i32 },

    /// Native code reported an error through the pending error slot
    #[error("{0}")]
    Native(NativeError),

    /// Native code returned NULL without setting an error
    #[error("{name} returned NULL without setting an error")]
    NullResult { name: String },

    /// A native iterator is exhausted
    #[error("StopIteration")]
    StopIteration,

    /// Host-level fault (bad arity, not callable, unrepresentable value)
    #[error("{kind}: {message}")]
    Host { kind: &'static str, message: String },

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn lookup(what: impl fmt::Display) -> Self {
        Self::Lookup(what.to_string())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Host { kind: "TypeError", message: message.into() }
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::Host { kind: "AttributeError", message: message.into() }
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::Host { kind: "RuntimeError", message: message.into() }
    }
}

/// Error raised by native code, named after the exception type it set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub kind: String,
    pub message: String,
}

impl NativeError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Self::Native(err)
    }
}
