//! Monotonic deadline primitive driving the advertisement and master-down events.
//!
//! Grounded on `original_source/vrrp_timer.c`: a `Timer` stores a target
//! timestamp (`CLOCK_MONOTONIC_RAW`, immune to NTP steps) and the
//! last-measured remaining time (`delta`), so the event loop can hand
//! `delta` straight to `pselect` without recomputing it.

use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};

const CLOCK: ClockId = ClockId::CLOCK_MONOTONIC_RAW;

/// A single deadline, armed in either whole seconds (VRRPv2) or centiseconds
/// (VRRPv3) — the caller picks the unit by passing one of the two delay
/// arguments and zeroing the other, mirroring `VRRP_SET_*_TIMER` in the C
/// reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    target: TimeSpec,
    delta: TimeSpec,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer `delay_sec` seconds and `delay_centi` centiseconds from now.
    pub fn set(&mut self, delay_sec: u64, delay_centi: u64) -> crate::error::Result<()> {
        let now = clock_gettime(CLOCK).map_err(|e| {
            crate::error::Error::resource(format!("clock_gettime: {e}"))
        })?;

        let extra_nsec = (delay_centi * 10_000_000) as i64;
        let mut sec = now.tv_sec() + delay_sec as i64;
        let mut nsec = now.tv_nsec() + extra_nsec;
        if nsec >= 1_000_000_000 {
            sec += nsec / 1_000_000_000;
            nsec %= 1_000_000_000;
        }

        self.target = TimeSpec::new(sec, nsec);
        self.delta = TimeSpec::new(0, 0);
        Ok(())
    }

    /// Reset the timer to a disarmed state.
    pub fn clear(&mut self) {
        self.target = TimeSpec::new(0, 0);
        self.delta = TimeSpec::new(0, 0);
    }

    /// A timer is "running" once it has been `set`; only `clear` turns it off.
    pub fn is_running(&self) -> bool {
        self.target.tv_sec() != 0 || self.target.tv_nsec() != 0
    }

    /// Recompute `delta` against the current time. Returns `true` if the
    /// timer has already expired (target is in the past).
    pub fn update(&mut self) -> crate::error::Result<bool> {
        let now = clock_gettime(CLOCK).map_err(|e| {
            crate::error::Error::resource(format!("clock_gettime: {e}"))
        })?;

        if timespec_is_past(self.target, now) {
            self.delta = TimeSpec::new(0, 0);
            return Ok(true);
        }

        let mut sec = self.target.tv_sec() - now.tv_sec();
        let mut nsec = self.target.tv_nsec() - now.tv_nsec();
        if nsec < 0 {
            sec -= 1;
            nsec += 1_000_000_000;
        }
        self.delta = TimeSpec::new(sec, nsec);
        Ok(false)
    }

    /// Remaining time as last computed by `update`. Suitable to hand
    /// directly to `pselect`'s timeout argument.
    pub fn remaining(&self) -> TimeSpec {
        self.delta
    }

    /// Convenience: `update` then report expiry.
    pub fn is_expired(&mut self) -> crate::error::Result<bool> {
        self.update()
    }
}

fn timespec_is_past(target: TimeSpec, now: TimeSpec) -> bool {
    (target.tv_sec(), target.tv_nsec()) <= (now.tv_sec(), now.tv_nsec())
}
