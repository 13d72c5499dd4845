//! `uvrrpd`: a Virtual Router Redundancy Protocol daemon (RFC 3768 / RFC 5798).
//!
//! Entry point grounded on the teacher's `healthcheck-server` binary's
//! `main.rs` shape (parse config, init logging, build the long-lived
//! object, run it) — restated synchronously, since this daemon's event
//! loop (`daemon::Daemon::run`) is `pselect`-driven rather than `tokio`-driven.

mod config;
mod daemon;
mod fifo;
mod pidfile;
mod process;
mod signals;

use std::net::IpAddr;

use clap::Parser;

use common::logging;
use config::DaemonConfig;
use vrrp::ipx::Family;
use vrrp::net::NetSocket;
use vrrp::types::{NetContext, State, VirtualRouter};

fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::parse();

    if config.foreground {
        logging::init(config.severity_floor());
    } else {
        logging::init_daemon(config.severity_floor());
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    let version = config.version()?;
    let family = config.family();

    let if_index = vrrp::net::resolve_if_index(&config.interface)?;
    let if_mac = resolve_if_mac(&config.interface)?;
    let primary_addr = resolve_primary_addr(&config.interface, family)?;

    let router = VirtualRouter {
        vrid: config.vrid,
        version,
        family,
        priority: config.priority,
        vips: config.vips.clone(),
        preempt: config.preempt.as_bool(),
        auth_data: config.auth_data(),
        adv_interval: config.adv_interval,
        master_adv_interval: None,
        net: NetContext {
            ifname: config.interface.clone(),
            if_index,
            if_mac,
            primary_addr,
        },
        state: State::Init,
    };
    router.validate()?;

    signals::install()?;
    signals::block_all()?;

    let net = NetSocket::open(family, &config.interface, if_index)?;
    net.join_multicast(primary_addr)?;

    process::daemonize(config.foreground)?;
    if let Err(e) = process::lock_memory() {
        tracing::warn!(error = %e, "could not lock pages into RAM, continuing without it");
    }

    std::fs::create_dir_all(&config.rundir)?;
    let _pidfile = pidfile::PidFile::acquire(&config.rundir, config.vrid)?;
    let fifo = fifo::ControlFifo::create(&config.rundir, config.vrid)?;

    tracing::info!(
        vrid = router.vrid,
        interface = %router.net.ifname,
        priority = router.priority,
        version = ?router.version,
        family = ?router.family,
        "uvrrpd starting"
    );

    let mut daemon = daemon::Daemon::new(router, net, fifo, config.script.clone());
    daemon.run()?;

    Ok(())
}

/// Look up the interface's primary address in the configured family via
/// `getifaddrs`. The daemon never infers a virtual IP's placement itself —
/// only the single already-assigned primary address it advertises from
/// and receives on.
fn resolve_primary_addr(ifname: &str, family: Family) -> anyhow::Result<IpAddr> {
    for iface in nix::ifaddrs::getifaddrs()? {
        if iface.interface_name != ifname {
            continue;
        }
        let Some(address) = iface.address else { continue };
        match family {
            Family::V4 => {
                if let Some(sin) = address.as_sockaddr_in() {
                    return Ok(IpAddr::V4(std::net::Ipv4Addr::from(sin.ip())));
                }
            }
            Family::V6 => {
                if let Some(sin6) = address.as_sockaddr_in6() {
                    return Ok(IpAddr::V6(sin6.ip()));
                }
            }
        }
    }
    anyhow::bail!("no {family:?} address configured on interface {ifname}")
}

/// Look up the interface's link-layer (MAC) address via `getifaddrs`'s
/// `AF_PACKET` entries. Used only for logging/diagnostics — the
/// transmitted Ethernet source address is always the VRRP virtual MAC
/// (`vrrp::packet::eth_src_mac`), never this one.
fn resolve_if_mac(ifname: &str) -> anyhow::Result<[u8; 6]> {
    for iface in nix::ifaddrs::getifaddrs()? {
        if iface.interface_name != ifname {
            continue;
        }
        if let Some(link) = iface.address.and_then(|a| a.as_link_addr()) {
            if let Some(bytes) = link.addr() {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&bytes[..6]);
                return Ok(mac);
            }
        }
    }
    anyhow::bail!("no link-layer address found on interface {ifname}")
}
