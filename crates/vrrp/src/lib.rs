//! Virtual Router Redundancy Protocol (VRRP) core.
//!
//! Implements the RFC 3768 (VRRPv2) and RFC 5798 (VRRPv3) wire format,
//! state machine, and supporting network plumbing for a single Virtual
//! Router instance, for both IPv4 and IPv6.
//!
//! # Modules
//!
//! - [`timer`]: monotonic deadline primitive driving Advertisement and
//!   Master-Down events.
//! - [`ipx`]: family-parameterized (IPv4/IPv6) multicast, checksum, and
//!   address operations.
//! - [`packet`]: the VRRP advertisement codec and the Ethernet/ARP/NA
//!   frame builders around it.
//! - [`net`]: the receive/transmit sockets and the inbound validation chain.
//! - [`control`]: the control-FIFO command tokenizer.
//! - [`state_machine`]: the pure Init/Backup/Master transition function.
//! - [`hook`]: the external state-transition script invoker.
//! - [`types`]: the shared data model (`VirtualRouter`, `Vip`, `NetContext`, ...).
//!
//! This crate is synchronous end to end — `uvrrpd`'s event loop drives it
//! directly rather than through an async runtime, per SPEC_FULL.md section 5.

pub mod control;
pub mod error;
pub mod hook;
pub mod ipx;
pub mod net;
pub mod packet;
pub mod state_machine;
pub mod timer;
pub mod types;

pub use error::{Error, Result};
pub use ipx::Family;
pub use net::{LocalParams, NetSocket, RecvEvent};
pub use packet::VrrpMessage;
pub use state_machine::{Action, Event, HookState, PeerAdvertisement};
pub use timer::Timer;
pub use types::{State, Version, VirtualRouter, Vip};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_matches_rfc_names() {
        assert_eq!(State::Init.to_string(), "INIT");
        assert_eq!(State::Backup.to_string(), "BACKUP");
        assert_eq!(State::Master.to_string(), "MASTER");
    }
}
