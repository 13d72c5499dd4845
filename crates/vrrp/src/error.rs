//! Protocol/codec error type for the `vrrp` crate.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Error::Protocol(msg.to_string())
    }

    pub fn resource(msg: impl fmt::Display) -> Self {
        Error::Resource(msg.to_string())
    }

    pub fn invariant(msg: impl fmt::Display) -> Self {
        Error::Invariant(msg.to_string())
    }
}
