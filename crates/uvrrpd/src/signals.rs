//! Signal set installation.
//!
//! Grounded on `original_source/uvrrpd.c`'s sigaction table: handlers only
//! ever touch the `DaemonRegister` atomic word (`crate::daemon::REGISTER`)
//! and return, since nothing else is async-signal-safe. The set is blocked
//! everywhere except the event loop's single suspension point (SPEC_FULL.md
//! section 5) — `block_all` installs that block and returns the empty mask
//! the loop passes to `pselect` to unblock it only during the wait.

use std::sync::atomic::Ordering;

use nix::sys::signal::{self, SigHandler, SigSet, Signal};

use common::{Error, Result};

use crate::daemon::{DUMP, LOGOUT, RELOAD, REGISTER, STOP};

const HANDLED: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGQUIT,
    Signal::SIGHUP,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGCHLD,
];

extern "C" fn handle(signum: libc::c_int) {
    let bit = if signum == libc::SIGINT || signum == libc::SIGTERM || signum == libc::SIGQUIT {
        STOP | RELOAD
    } else if signum == libc::SIGHUP {
        RELOAD
    } else if signum == libc::SIGUSR1 || signum == libc::SIGUSR2 {
        DUMP
    } else if signum == libc::SIGPIPE {
        LOGOUT
    } else {
        // SIGCHLD: reaped synchronously by `vrrp::hook::run`'s own `waitpid`; no-op here.
        0
    };
    if bit != 0 {
        REGISTER.fetch_or(bit, Ordering::Relaxed);
    }
}

/// Install the handled set. Must run before `block_all`.
pub fn install() -> Result<()> {
    for &sig in HANDLED {
        unsafe {
            signal::signal(sig, SigHandler::Handler(handle))
                .map_err(|e| Error::resource(format!("sigaction({sig:?}): {e}")))?;
        }
    }
    Ok(())
}

/// Block the handled set on this thread. The event loop passes an empty
/// mask to `pselect` so they're only deliverable during its suspension point.
pub fn block_all() -> Result<()> {
    let mut set = SigSet::empty();
    for &sig in HANDLED {
        set.add(sig);
    }
    set.thread_block()
        .map_err(|e| Error::resource(format!("sigprocmask(SIG_BLOCK): {e}")))
}
