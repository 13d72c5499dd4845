//! Process-level setup that has nothing to do with VRRP itself: detaching
//! from the controlling terminal and pinning the process's pages.
//!
//! Grounded on `original_source/uvrrpd.c`'s `main`: `daemon(0, verbose)`
//! right after the sockets/hook/topology resources are open but before the
//! PID file is written (so the file records the post-fork PID), followed
//! by `mlockall(MCL_CURRENT | MCL_FUTURE)` to keep the process out of swap
//! before it ever blocks on the event loop.

use common::{Error, Result};

/// Detach from the controlling terminal: `fork`, become session leader,
/// `chdir("/")`, and redirect stdin/stdout/stderr to `/dev/null`. A no-op
/// when `foreground` is set (`-f`), matching the C original's
/// `background`/`chdir("/")` branch.
pub fn daemonize(foreground: bool) -> Result<()> {
    if foreground {
        return Ok(());
    }
    nix::unistd::daemon(false, false)
        .map_err(|e| Error::resource(format!("daemon(2): {e}")))
}

/// Lock all current and future pages into RAM so advertisement timing
/// can't jitter behind a page fault. Denial (no `CAP_IPC_LOCK`, or no
/// room under `RLIMIT_MEMLOCK`) is logged by the caller and otherwise
/// harmless — the daemon still runs, just without the latency bound.
pub fn lock_memory() -> Result<()> {
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if ret < 0 {
        Err(Error::resource(format!(
            "mlockall: {}",
            std::io::Error::last_os_error()
        )))
    } else {
        Ok(())
    }
}
