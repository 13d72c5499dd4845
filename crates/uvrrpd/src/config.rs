//! Command-line configuration.
//!
//! Grounded on `original_source/vrrp_options.h`'s flag set, restated as a
//! `clap::Parser` derive struct — the teacher's `vrrp` crate never shipped
//! a CLI of its own, so this is new, but the validation shape mirrors
//! `vrrp::types::VirtualRouter::validate`.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use common::logging::SeverityFloor;
use common::{Error, Result};
use vrrp::ipx::Family;
use vrrp::types::{Version, Vip};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PreemptMode {
    On,
    Off,
}

impl PreemptMode {
    pub fn as_bool(self) -> bool {
        matches!(self, PreemptMode::On)
    }
}

/// One virtual IP, optionally with a `/prefix` suffix (default: the
/// family's full host length). Parsed eagerly by clap so a malformed
/// address is reported at argument-parsing time, not validation time.
fn parse_vip(s: &str) -> std::result::Result<Vip, String> {
    match s.split_once('/') {
        Some((addr, prefix)) => {
            let addr: IpAddr = addr.parse().map_err(|e| format!("invalid VIP address {addr}: {e}"))?;
            let prefix_len: u8 = prefix
                .parse()
                .map_err(|_| format!("invalid prefix length {prefix}"))?;
            Ok(Vip::new(addr, prefix_len))
        }
        None => {
            let addr: IpAddr = s.parse().map_err(|e| format!("invalid VIP address {s}: {e}"))?;
            Ok(Vip::host(addr))
        }
    }
}

/// `uvrrpd`'s command-line surface: `-v vrid -i iface -p prio -t interval
/// -P on|off -r 2|3 -6 -a pass -f -s script -F pidfile -d`, plus
/// one-or-more VIP positional arguments.
#[derive(Debug, Parser)]
#[command(name = "uvrrpd", version, about = "Virtual Router Redundancy Protocol daemon")]
pub struct DaemonConfig {
    /// Virtual Router ID (1-255).
    #[arg(short = 'v', long = "vrid")]
    pub vrid: u8,

    /// Interface to run on.
    #[arg(short = 'i', long = "interface")]
    pub interface: String,

    /// Configured priority (1-255; 255 marks this instance the address owner).
    #[arg(short = 'p', long = "priority", default_value_t = 100)]
    pub priority: u8,

    /// Advertisement interval: whole seconds under RFC 3768, centiseconds under RFC 5798.
    #[arg(short = 't', long = "interval", default_value_t = 100)]
    pub adv_interval: u16,

    /// Preemption policy.
    #[arg(short = 'P', long = "preempt", value_enum, default_value_t = PreemptMode::On)]
    pub preempt: PreemptMode,

    /// Protocol revision: 2 (RFC 3768, IPv4 only) or 3 (RFC 5798).
    #[arg(short = 'r', long = "rfc", default_value_t = 3)]
    pub rfc_version: u8,

    /// Run in IPv6 mode (requires `-r 3`).
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Simple-password authentication data (RFC 3768 section 5.3.7, v2 only).
    #[arg(short = 'a', long = "auth")]
    pub auth: Option<String>,

    /// Stay in the foreground instead of daemonizing.
    #[arg(short = 'f', long = "foreground")]
    pub foreground: bool,

    /// Path to the state-transition hook script.
    #[arg(short = 's', long = "script")]
    pub script: Option<PathBuf>,

    /// Directory for the PID file and control FIFO.
    #[arg(short = 'F', long = "rundir", default_value = "/var/run")]
    pub rundir: PathBuf,

    /// Raise the log severity floor to debug.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Virtual IP addresses served by this instance, each optionally `addr/prefix`.
    #[arg(value_parser = parse_vip, required = true, num_args = 1..)]
    pub vips: Vec<Vip>,
}

impl DaemonConfig {
    pub fn version(&self) -> Result<Version> {
        match self.rfc_version {
            2 => Ok(Version::V2),
            3 => Ok(Version::V3),
            other => Err(Error::config(format!("unsupported RFC revision -r {other} (expected 2 or 3)"))),
        }
    }

    pub fn family(&self) -> Family {
        if self.ipv6 {
            Family::V6
        } else {
            Family::V4
        }
    }

    pub fn severity_floor(&self) -> SeverityFloor {
        if self.debug {
            SeverityFloor::Debug
        } else {
            SeverityFloor::Info
        }
    }

    /// Mirrors `vrrp::types::VirtualRouter::validate`'s numeric invariants,
    /// plus the CLI-specific constraints clap's own parser can't express
    /// (RFC 3768 is IPv4-only; priority 255 implies a single address owner).
    pub fn validate(&self) -> Result<()> {
        if self.vrid == 0 {
            return Err(Error::config("vrid must be between 1 and 255"));
        }
        if self.priority == 0 {
            return Err(Error::config("priority must be between 1 and 255"));
        }
        if self.interface.is_empty() {
            return Err(Error::config("interface name must not be empty"));
        }
        if self.vips.is_empty() {
            return Err(Error::config("at least one virtual IP is required"));
        }

        let version = self.version()?;
        if version == Version::V2 && self.ipv6 {
            return Err(Error::config("RFC 3768 (-r 2) supports IPv4 only"));
        }
        match version {
            Version::V2 => {
                if self.adv_interval == 0 || self.adv_interval > 255 {
                    return Err(Error::config("RFC 3768 advertisement interval must be between 1 and 255 seconds"));
                }
            }
            Version::V3 => {
                if self.adv_interval == 0 || self.adv_interval > 4095 {
                    return Err(Error::config("RFC 5798 advertisement interval must be between 1 and 4095 centiseconds"));
                }
            }
        }
        if let Some(auth) = &self.auth {
            if version == Version::V3 {
                return Err(Error::config("simple-password authentication is RFC 3768 (-r 2) only"));
            }
            if auth.len() > 8 {
                return Err(Error::config("authentication data must be at most 8 bytes"));
            }
        }
        Ok(())
    }

    /// Right-pad (or truncate) the `-a` password into the wire's fixed
    /// 8-byte field. `None` when no auth was configured.
    pub fn auth_data(&self) -> Option<[u8; 8]> {
        let raw = self.auth.as_ref()?;
        let mut bytes = [0u8; 8];
        let src = raw.as_bytes();
        let n = src.len().min(8);
        bytes[..n].copy_from_slice(&src[..n]);
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        DaemonConfig::command().debug_assert();
    }

    #[test]
    fn parses_bare_host_vip() {
        let vip = parse_vip("10.0.0.1").unwrap();
        assert_eq!(vip.prefix_len, 32);
    }

    #[test]
    fn parses_vip_with_prefix() {
        let vip = parse_vip("10.0.0.1/24").unwrap();
        assert_eq!(vip.prefix_len, 24);
    }

    #[test]
    fn rejects_malformed_vip() {
        assert!(parse_vip("not-an-address").is_err());
    }

    fn sample() -> DaemonConfig {
        DaemonConfig {
            vrid: 7,
            interface: "eth0".into(),
            priority: 100,
            adv_interval: 100,
            preempt: PreemptMode::On,
            rfc_version: 3,
            ipv6: false,
            auth: None,
            foreground: true,
            script: None,
            rundir: "/var/run".into(),
            debug: false,
            vips: vec![Vip::host("10.0.0.1".parse().unwrap())],
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_v2_with_ipv6() {
        let mut c = sample();
        c.rfc_version = 2;
        c.ipv6 = true;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_v3_adv_interval_out_of_range() {
        let mut c = sample();
        c.adv_interval = 5000;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_auth_under_v3() {
        let mut c = sample();
        c.auth = Some("password".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_empty_vip_list() {
        let mut c = sample();
        c.vips.clear();
        assert!(c.validate().is_err());
    }
}
