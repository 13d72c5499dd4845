//! Common error types shared by the `vrrp` and `uvrrpd` crates.

use std::fmt;

/// A specialized Result type for daemon-wide operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type, one variant per error-taxonomy class (see SPEC_FULL.md section 7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new protocol-invalid error (malformed/mismatched inbound packet).
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Error::Protocol(msg.to_string())
    }

    /// Create a new resource error (socket/multicast/allocation failure).
    pub fn resource(msg: impl fmt::Display) -> Self {
        Error::Resource(msg.to_string())
    }

    /// Create a new configuration error (bad CLI, unreachable interface, ...).
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new logic-invariant violation error. Callers should treat this as fatal.
    pub fn invariant(msg: impl fmt::Display) -> Self {
        Error::Invariant(msg.to_string())
    }

    /// Create a new unclassified error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}
