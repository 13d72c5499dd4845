//! External state-transition hook invoker.
//!
//! Grounded on `original_source/vrrp_exec.c`'s `vrrp_exec`: block SIGCHLD,
//! install ignoring dispositions for SIGINT/SIGQUIT, drop the real-time
//! scheduling class, fork, exec the script with a fixed argument vector,
//! and wait synchronously in the parent, restoring everything afterward.
//! The C original restores signal state on every `return` by hand; here
//! that's a `SignalGuard` (RAII) instead, in the same idiom the teacher's
//! `VRRPSocket` uses `Drop` to leave its multicast group.

use std::ffi::CString;
use std::path::Path;

use nix::sys::signal::{self, SigHandler, SigSet, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{execv, fork, ForkResult};

use crate::error::{Error, Result};
use crate::ipx::Family;
use crate::state_machine::HookState;
use crate::types::Vip;

impl HookState {
    fn as_arg(self) -> &'static str {
        match self {
            HookState::Master => "master",
            HookState::Backup => "backup",
        }
    }
}

/// The fixed positional contract `vrrp_build_args` constructs:
/// `[basename(script), state, vrid, ifname, priority, adv_int, naddr,
/// family(4|6), vip_list_comma_separated]`.
pub fn build_args(
    script: &Path,
    state: HookState,
    vrid: u8,
    ifname: &str,
    priority: u8,
    adv_int: u16,
    vips: &[Vip],
    family: Family,
) -> Vec<String> {
    let basename = script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.to_string_lossy().into_owned());

    // Serialized in reverse configured order, as `list_for_each_entry_reverse` does.
    let vip_list = vips
        .iter()
        .rev()
        .map(|v| v.addr.to_string())
        .collect::<Vec<_>>()
        .join(",");

    vec![
        basename,
        state.as_arg().to_string(),
        vrid.to_string(),
        ifname.to_string(),
        priority.to_string(),
        adv_int.to_string(),
        vips.len().to_string(),
        match family {
            Family::V4 => "4".to_string(),
            Family::V6 => "6".to_string(),
        },
        vip_list,
    ]
}

/// Restores the pre-fork signal mask and SIGINT/SIGQUIT dispositions on
/// every exit path, mirroring the C original's end-of-function restore
/// block — but via `Drop` so an early `?` return can't skip it.
struct SignalGuard {
    saved_mask: SigSet,
}

impl SignalGuard {
    fn enter() -> Result<Self> {
        let saved_mask = SigSet::thread_get_mask()
            .map_err(|e| Error::resource(format!("pthread_sigmask: {e}")))?;

        let mut block = SigSet::empty();
        block.add(Signal::SIGCHLD);
        block
            .thread_block()
            .map_err(|e| Error::resource(format!("sigprocmask(SIG_BLOCK): {e}")))?;

        unsafe {
            signal::signal(Signal::SIGINT, SigHandler::SigIgn)
                .map_err(|e| Error::resource(format!("sigaction(SIGINT): {e}")))?;
            signal::signal(Signal::SIGQUIT, SigHandler::SigIgn)
                .map_err(|e| Error::resource(format!("sigaction(SIGQUIT): {e}")))?;
        }

        Ok(Self { saved_mask })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
            let _ = signal::signal(Signal::SIGQUIT, SigHandler::SigDfl);
        }
        let _ = self.saved_mask.thread_set_mask();
    }
}

/// Fork, exec the configured script with `args`, and wait synchronously
/// for it to finish. `after_fork_in_parent` runs in the parent immediately
/// after `fork()` returns, before the `waitpid` loop — per `vrrp_exec.c`'s
/// `uvrrpd_sched_set()` call, which restores `SCHED_RR` right after fork
/// rather than after the child has already exited, this is the caller's
/// (`uvrrpd::daemon`'s) hook to restore real-time scheduling at the right
/// point. This function otherwise owns the fork/exec/wait and the
/// signal-state bracket around it.
pub fn run(script: &Path, args: &[String], after_fork_in_parent: impl FnOnce()) -> Result<i32> {
    if !script.is_file() {
        return Err(Error::resource(format!(
            "hook script {} does not exist or is not executable",
            script.display()
        )));
    }

    let _guard = SignalGuard::enter()?;

    let cstr_script = CString::new(script.as_os_str().to_string_lossy().as_bytes())
        .map_err(|_| Error::protocol("hook script path contains a NUL byte"))?;
    let cstr_args: Vec<CString> = args
        .iter()
        .map(|a| CString::new(a.as_bytes()).unwrap_or_default())
        .collect();

    match unsafe { fork() }.map_err(|e| Error::resource(format!("fork: {e}")))? {
        ForkResult::Child => {
            // Restore default dispositions/mask in the child before exec;
            // the guard's Drop never runs here (execv doesn't return on success).
            unsafe {
                let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
                let _ = signal::signal(Signal::SIGQUIT, SigHandler::SigDfl);
            }
            let _ = execv(&cstr_script, &cstr_args);
            // execv only returns on failure.
            std::process::exit(127);
        }
        ForkResult::Parent { child } => {
            after_fork_in_parent();
            loop {
                match waitpid(child, None) {
                    Ok(status) => return Ok(exit_code(status)),
                    Err(nix::errno::Errno::EINTR) => continue,
                    Err(e) => return Err(Error::resource(format!("waitpid: {e}"))),
                }
            }
        }
    }
}

fn exit_code(status: nix::sys::wait::WaitStatus) -> i32 {
    use nix::sys::wait::WaitStatus::*;
    match status {
        Exited(_, code) => code,
        Signaled(_, sig, _) => 128 + sig as i32,
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_has_fixed_positional_shape() {
        let vips = vec![
            Vip::host("10.0.0.1".parse().unwrap()),
            Vip::host("10.0.0.2".parse().unwrap()),
        ];
        let args = build_args(
            Path::new("/etc/uvrrpd/hook.sh"),
            HookState::Master,
            7,
            "eth0",
            150,
            100,
            &vips,
            Family::V4,
        );
        assert_eq!(args[0], "hook.sh");
        assert_eq!(args[1], "master");
        assert_eq!(args[2], "7");
        assert_eq!(args[3], "eth0");
        assert_eq!(args[4], "150");
        assert_eq!(args[5], "100");
        assert_eq!(args[6], "2");
        assert_eq!(args[7], "4");
        assert_eq!(args[8], "10.0.0.2,10.0.0.1");
    }

    #[test]
    fn run_rejects_missing_script() {
        let result = run(Path::new("/nonexistent/hook.sh"), &[], || {});
        assert!(result.is_err());
    }
}
