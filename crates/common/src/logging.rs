//! Logging utilities shared by the `vrrp` and `uvrrpd` crates.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Severity floor, as taken from the daemon's `-l` flag / syslog convention
/// (`err|warning|notice|info|debug`). Anything below the floor is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeverityFloor {
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl SeverityFloor {
    fn as_env_filter_directive(self) -> &'static str {
        match self {
            SeverityFloor::Err => "error",
            SeverityFloor::Warning => "warn",
            SeverityFloor::Notice => "warn",
            SeverityFloor::Info => "info",
            SeverityFloor::Debug => "debug",
        }
    }
}

/// Initialize tracing with sensible defaults for running in the foreground.
///
/// Uses the RUST_LOG environment variable to control log levels, falling back
/// to `floor` when unset.
pub fn init(floor: SeverityFloor) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(floor.as_env_filter_directive())),
        )
        .init();
}

/// Initialize tracing with JSON formatting (useful for structured log collection).
pub fn init_json(floor: SeverityFloor) {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(floor.as_env_filter_directive())),
        )
        .init();
}

/// Initialize tracing for a detached/daemonized process: plain formatting,
/// no ANSI color codes, no terminal target column. The daemon never talks to
/// syslog directly — like the rest of the stack's binaries it writes
/// structured lines to stdout/stderr and leaves capture (syslog, journald, a
/// log file via shell redirection) to whatever supervises the process.
pub fn init_daemon(floor: SeverityFloor) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_target(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(floor.as_env_filter_directive())),
        )
        .init();
}
