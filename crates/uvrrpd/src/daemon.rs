//! The event loop (SPEC_FULL.md section 4.6, 5): a single-threaded
//! `pselect` wait over the VRRP receive socket and the control FIFO,
//! with the single timer deadline as the wait's timeout.
//!
//! Grounded on `original_source/uvrrpd.c`'s main loop: `DaemonRegister`
//! is the lock-free bit field signal handlers set (`crate::signals`);
//! `pselect`'s sigmask argument is the empty set, so the handled signals
//! are only deliverable during the one suspension point where blocking
//! actually happens. Everywhere else they're blocked (`signals::block_all`),
//! so a handler body never races the register's readers.

use std::net::IpAddr;
use std::os::fd::BorrowedFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nix::sys::select::{pselect, FdSet};
use nix::sys::signal::SigSet;

use common::{Error, Result};
use vrrp::ipx::Family;
use vrrp::net::{LocalParams, NetSocket, RecvEvent};
use vrrp::packet::{self, IntervalField, VrrpMessage};
use vrrp::state_machine::{Event, HookState};
use vrrp::types::{Version, VirtualRouter};

use crate::fifo::ControlFifo;

/// Asynchronous flags set by signal handlers, read-and-cleared once per
/// loop iteration. Relaxed ordering: single-threaded, so there is no
/// inter-thread happens-before to establish, only handler/loop atomicity.
pub static REGISTER: AtomicU32 = AtomicU32::new(0);

pub const STOP: u32 = 1 << 0;
pub const RELOAD: u32 = 1 << 1;
pub const DUMP: u32 = 1 << 2;
pub const LOGOUT: u32 = 1 << 3;

fn map_err(e: vrrp::Error) -> Error {
    match e {
        vrrp::Error::Io(io) => Error::Io(io),
        vrrp::Error::Protocol(m) => Error::Protocol(m),
        vrrp::Error::Resource(m) => Error::Resource(m),
        vrrp::Error::Invariant(m) => Error::Invariant(m),
    }
}

pub struct Daemon {
    router: VirtualRouter,
    net: NetSocket,
    fifo: ControlFifo,
    timer: vrrp::Timer,
    script: Option<PathBuf>,
}

impl Daemon {
    pub fn new(router: VirtualRouter, net: NetSocket, fifo: ControlFifo, script: Option<PathBuf>) -> Self {
        Self {
            router,
            net,
            fifo,
            timer: vrrp::Timer::new(),
            script,
        }
    }

    /// Run until a STOP-flagged Reload's actions have been dispatched.
    /// `enter_init` happens implicitly: `step` routes `State::Init`
    /// straight to it regardless of which `Event` triggered the call, and
    /// a fresh `Timer` is already "expired" (target at the epoch), so the
    /// very first iteration produces `Event::Timer` and enters the FSM.
    pub fn run(&mut self) -> Result<()> {
        if let Err(e) = request_realtime_scheduling() {
            tracing::warn!(error = %e, "could not acquire real-time scheduling, continuing with default");
        }

        loop {
            let reg = REGISTER.swap(0, Ordering::Relaxed);
            let shutting_down = reg & STOP != 0;

            if reg & DUMP != 0 {
                self.log_state_dump();
            }
            if reg & LOGOUT != 0 {
                tracing::warn!("SIGPIPE received, continuing");
            }

            let event = if reg & RELOAD != 0 {
                Some(Event::Reload)
            } else if self.timer.update().map_err(map_err)? {
                Some(Event::Timer)
            } else {
                self.wait_for_event()?
            };

            if let Some(event) = event {
                let actions = self.router.step(event);
                self.dispatch(actions)?;
            }

            if shutting_down {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }

    fn wait_for_event(&mut self) -> Result<Option<Event>> {
        let net_fd = self.net.as_raw_fd();
        let fifo_fd = self.fifo.as_raw_fd();

        let mut readfds = FdSet::new();
        readfds.insert(unsafe { BorrowedFd::borrow_raw(net_fd) });
        readfds.insert(unsafe { BorrowedFd::borrow_raw(fifo_fd) });
        let nfds = net_fd.max(fifo_fd) + 1;

        let timeout = self.timer.remaining();
        let empty_mask = SigSet::empty();

        match pselect(nfds, Some(&mut readfds), None, None, Some(&timeout), Some(&empty_mask)) {
            Ok(0) => Ok(None),
            Ok(_) => {
                if readfds.contains(unsafe { BorrowedFd::borrow_raw(net_fd) }) {
                    Ok(Some(self.handle_receive()))
                } else if readfds.contains(unsafe { BorrowedFd::borrow_raw(fifo_fd) }) {
                    self.handle_control()
                } else {
                    Ok(None)
                }
            }
            Err(nix::errno::Errno::EINTR) => Ok(None),
            Err(e) => Err(Error::resource(format!("pselect: {e}"))),
        }
    }

    fn handle_receive(&self) -> Event {
        match self.net.receive(&self.local_params()) {
            Ok(RecvEvent::Ok(msg, source)) => Event::PktOk(vrrp::state_machine::PeerAdvertisement {
                priority: msg.priority,
                source,
                max_adv_int: match msg.interval {
                    IntervalField::V3 { max_adv_int } => Some(max_adv_int),
                    IntervalField::V2 { .. } => None,
                },
            }),
            Ok(RecvEvent::VridMismatch(vrid)) => Event::VridMismatch(vrid),
            Ok(RecvEvent::Invalid(reason)) => Event::Invalid(reason),
            Err(e) => Event::Invalid(e.to_string()),
        }
    }

    fn handle_control(&mut self) -> Result<Option<Event>> {
        let mut buf = [0u8; vrrp::control::CONTROL_BUFFER_SIZE];
        let n = self.fifo.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        match vrrp::control::parse(&buf[..n]) {
            Ok(vrrp::control::ControlCommand::Stop) => {
                REGISTER.fetch_or(STOP | RELOAD, Ordering::Relaxed);
                Ok(None)
            }
            Ok(vrrp::control::ControlCommand::Reload) => Ok(Some(Event::Reload)),
            Ok(vrrp::control::ControlCommand::Status) => {
                self.log_state_dump();
                Ok(None)
            }
            Ok(vrrp::control::ControlCommand::SetPriority(p)) => {
                self.router.priority = p;
                Ok(Some(Event::Reload))
            }
            Err(e) => {
                tracing::info!(error = %e, "control command rejected");
                Ok(None)
            }
        }
    }

    fn dispatch(&mut self, actions: Vec<vrrp::state_machine::Action>) -> Result<()> {
        use vrrp::state_machine::Action;
        for action in actions {
            match action {
                Action::SendAdvertisement => self.send_advertisement(self.router.priority)?,
                Action::SendAdvertisementWithPriority(p) => self.send_advertisement(p)?,
                Action::SendTopologyBurst => self.send_topology_burst()?,
                Action::ArmAdvTimer => self.arm(self.router.adv_interval_duration())?,
                Action::ArmMasterDownTimer => self.arm(self.router.master_down_interval())?,
                Action::ArmMasterDownSkew => self.arm(self.router.skew_time())?,
                Action::ClearAdvTimer | Action::ClearMasterDownTimer => self.timer.clear(),
                Action::InvokeHook(state) => self.invoke_hook(state),
            }
        }
        Ok(())
    }

    fn arm(&mut self, delay: Duration) -> Result<()> {
        let centi = (delay.as_millis() / 10) as u64;
        self.timer.set(0, centi).map_err(map_err)
    }

    fn local_params(&self) -> LocalParams {
        LocalParams {
            version: self.router.version,
            vrid: self.router.vrid,
            priority: self.router.priority,
            adv_interval: self.router.adv_interval,
            auth_data: self.router.auth_data,
            configured_vips: self.router.vips.iter().map(|v| v.addr).collect(),
            daddr: self.router.family.multicast_addr(),
        }
    }

    fn build_message(&self) -> VrrpMessage {
        let interval = match self.router.version {
            Version::V2 => IntervalField::V2 {
                auth_type: if self.router.auth_data.is_some() { 1 } else { 0 },
                adv_int: self.router.adv_interval as u8,
            },
            Version::V3 => IntervalField::V3 {
                max_adv_int: self.router.adv_interval,
            },
        };
        VrrpMessage {
            version: self.router.version,
            vrid: self.router.vrid,
            priority: self.router.priority,
            addrs: self.router.vips.iter().map(|v| v.addr).collect(),
            interval,
            checksum: 0,
            auth_data: self.router.auth_data,
        }
    }

    fn send_advertisement(&self, priority: u8) -> Result<()> {
        let msg = self.build_message();
        let saddr = self.router.net.primary_addr;
        let daddr = self.router.family.multicast_addr();
        let payload = msg.encode_with_priority(self.router.family, priority, saddr, daddr);
        let frame = packet::build_advertisement_frame(self.router.family, self.router.vrid, saddr, daddr, &payload);
        self.net.send_frame(&frame).map_err(map_err)
    }

    fn send_topology_burst(&self) -> Result<()> {
        for vip in self.router.vips.iter().rev() {
            let frame = match vip.addr {
                IpAddr::V4(v4) => packet::build_gratuitous_arp(self.router.vrid, v4),
                IpAddr::V6(v6) => packet::build_neighbor_advertisement(self.router.vrid, v6),
            };
            self.net.send_frame(&frame).map_err(map_err)?;
        }
        Ok(())
    }

    fn invoke_hook(&self, state: HookState) {
        let Some(script) = &self.script else {
            tracing::debug!(?state, "no hook script configured, skipping invocation");
            return;
        };
        let args = vrrp::hook::build_args(
            script,
            state,
            self.router.vrid,
            &self.router.net.ifname,
            self.router.priority,
            self.router.effective_adv_interval(),
            &self.router.vips,
            self.router.family,
        );

        if let Err(e) = drop_realtime_scheduling() {
            tracing::warn!(error = %e, "failed to drop scheduling class before hook invocation");
        }
        // Restored right after fork, before the wait, per uvrrpd_sched_set()
        // in the C original — not after the child has already exited.
        let result = vrrp::hook::run(script, &args, || {
            if let Err(e) = request_realtime_scheduling() {
                tracing::warn!(error = %e, "failed to restore real-time scheduling after hook fork");
            }
        });

        match result {
            Ok(0) => tracing::info!(?state, "hook script completed"),
            Ok(code) => tracing::warn!(?state, exit_code = code, "hook script exited non-zero"),
            Err(e) => tracing::warn!(?state, error = %e, "hook invocation failed"),
        }
    }

    fn log_state_dump(&self) {
        tracing::info!(
            vrid = self.router.vrid,
            state = %self.router.state,
            priority = self.router.priority,
            preempt = self.router.preempt,
            vips = ?self.router.vips,
            "state dump"
        );
    }
}

fn set_scheduler(policy: libc::c_int, priority: libc::c_int) -> Result<()> {
    let param = libc::sched_param { sched_priority: priority };
    let ret = unsafe { libc::sched_setscheduler(0, policy, &param) };
    if ret < 0 {
        Err(Error::resource(format!(
            "sched_setscheduler: {}",
            std::io::Error::last_os_error()
        )))
    } else {
        Ok(())
    }
}

/// Request `SCHED_RR` at the lowest real-time priority. Denial (no
/// `CAP_SYS_NICE`) is logged by the caller and otherwise ignored — the
/// daemon runs fine, just without a bound on scheduling latency.
fn request_realtime_scheduling() -> Result<()> {
    let min = unsafe { libc::sched_get_priority_min(libc::SCHED_RR) };
    set_scheduler(libc::SCHED_RR, min)
}

/// Drop to `SCHED_OTHER` for the duration of a hook invocation, per
/// `uvrrpd_sched_unset` in the C original: the script itself shouldn't
/// inherit real-time scheduling.
fn drop_realtime_scheduling() -> Result<()> {
    set_scheduler(libc::SCHED_OTHER, 0)
}
