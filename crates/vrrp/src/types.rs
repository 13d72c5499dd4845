//! Core data types shared across the protocol state machine, packet codec,
//! and network I/O layer.
//!
//! Grounded on `original_source/vrrp.h`'s `struct vrrp` and
//! `vrrp_timer.h`'s `SKEW_TIME`/`MASTERDOWN_INT` macros, restated as
//! version-aware methods instead of C preprocessor arithmetic.

use std::net::IpAddr;
use std::time::Duration;

use crate::ipx::Family;

/// Protocol version a `VirtualRouter` speaks. RFC 3768 (v2) is IPv4-only;
/// RFC 5798 (v3) supports both families. Fixed for the router's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V2,
    V3,
}

/// Finite state machine states from RFC 5798 section 6.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Backup,
    Master,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Init => write!(f, "INIT"),
            State::Backup => write!(f, "BACKUP"),
            State::Master => write!(f, "MASTER"),
        }
    }
}

/// A single virtual IP address owned by this router instance, with the
/// CIDR prefix length the hook script applies when it brings the address
/// up (RFC 5798 doesn't carry a netmask on the wire; this is purely local
/// bookkeeping for the hook's argument vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vip {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl Vip {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }

    /// A bare host address with the family's full-length prefix (/32 or /128).
    pub fn host(addr: IpAddr) -> Self {
        let prefix_len = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self { addr, prefix_len }
    }
}

impl std::fmt::Display for Vip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Per-interface identity the router transmits and receives through.
/// Grounded on `vrrp_net.c`'s use of `if_nametoindex`/the interface's
/// link-layer address when building Ethernet frames.
#[derive(Debug, Clone)]
pub struct NetContext {
    pub ifname: String,
    pub if_index: u32,
    pub if_mac: [u8; 6],
    pub primary_addr: IpAddr,
}

/// A VRRP instance: one virtual router ID on one interface, in one family.
///
/// Priority 255 designates the IP address owner (RFC 5798 section 4.2) —
/// such a router transitions straight to Master and never learns a peer's
/// advertisement interval.
#[derive(Debug, Clone)]
pub struct VirtualRouter {
    pub vrid: u8,
    pub version: Version,
    pub family: Family,
    pub priority: u8,
    pub vips: Vec<Vip>,
    pub preempt: bool,
    /// Plaintext authentication password, v2 only (RFC 3768 section 5.3.7).
    pub auth_data: Option<[u8; 8]>,
    /// Configured advertisement interval: whole seconds under v2, centiseconds
    /// under v3 (RFC 5798's 12-bit `Max_Advertisement_Interval`).
    pub adv_interval: u16,
    /// Interval actually advertised by the current Master, learned on
    /// receipt (v3 only — RFC 5798 section 6.4.2's "Master_Adver_Interval").
    pub master_adv_interval: Option<u16>,
    pub net: NetContext,
    /// Current FSM state. Mutated only by `vrrp::state_machine`.
    pub state: State,
}

impl VirtualRouter {
    pub fn is_owner(&self) -> bool {
        self.priority == 255
    }

    /// The advertisement interval actually in force: learned from the
    /// current Master under v3, or the configured value otherwise.
    pub fn effective_adv_interval(&self) -> u16 {
        match self.version {
            Version::V2 => self.adv_interval,
            Version::V3 => self.master_adv_interval.unwrap_or(self.adv_interval),
        }
    }

    pub fn adv_interval_duration(&self) -> Duration {
        match self.version {
            Version::V2 => Duration::from_secs(self.adv_interval as u64),
            Version::V3 => Duration::from_millis(self.effective_adv_interval() as u64 * 10),
        }
    }

    /// RFC 5798 section 6.1: `Skew_time = ((256 - Priority) * Advertisement_Interval) / 256`.
    /// v2's `Advertisement_Interval` is a whole second, so its skew is the
    /// same formula expressed in milliseconds directly.
    pub fn skew_time(&self) -> Duration {
        match self.version {
            Version::V2 => {
                let millis = (256 - self.priority as u64) * 1000 / 256;
                Duration::from_millis(millis)
            }
            Version::V3 => {
                let adv_centi = self.effective_adv_interval() as u64;
                let skew_centi = (256 - self.priority as u64) * adv_centi / 256;
                Duration::from_millis(skew_centi * 10)
            }
        }
    }

    /// `Master_Down_Interval = (3 * Advertisement_Interval) + Skew_time`.
    pub fn master_down_interval(&self) -> Duration {
        self.adv_interval_duration() * 3 + self.skew_time()
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.vrid == 0 {
            return Err(crate::error::Error::invariant("vrid must be between 1 and 255"));
        }
        if self.priority == 0 {
            return Err(crate::error::Error::invariant("priority must be between 1 and 255"));
        }
        if self.vips.is_empty() {
            return Err(crate::error::Error::invariant("at least one virtual IP is required"));
        }
        if self.version == Version::V2 && self.family != Family::V4 {
            return Err(crate::error::Error::invariant("VRRPv2 supports IPv4 only"));
        }
        if self.version == Version::V2 && self.adv_interval == 0 {
            return Err(crate::error::Error::invariant("advertisement interval must be nonzero"));
        }
        Ok(())
    }
}

/// A VRRP message as recovered off the wire, with the IP-layer facts the
/// validation chain in `net.rs` needs (source/destination address, TTL),
/// independent of how the bytes were captured (raw socket vs `recvmsg`
/// ancillary data on the IPv6 path).
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub ttl: u8,
    pub payload: Vec<u8>,
}
