//! Common utilities and types shared by the `vrrp` and `uvrrpd` crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
