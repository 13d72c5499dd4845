//! PID file locking.
//!
//! Grounded on `original_source/uvrrpd.c`'s `uvrrpd_pidfile_lock`: an
//! exclusive `fcntl(F_SETLK)` write lock over the whole file, which (unlike
//! a bare existence check) is automatically released if the holding
//! process dies, so a stale pidfile from a crashed daemon never blocks
//! a restart.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use common::{Error, Result};

pub struct PidFile {
    path: PathBuf,
    file: std::fs::File,
}

impl PidFile {
    pub fn acquire(rundir: &Path, vrid: u8) -> Result<Self> {
        let path = rundir.join(format!("uvrrpd_{vrid}.pid"));
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::resource(format!("open {}: {e}", path.display())))?;

        let fd = file.as_raw_fd();
        let mut lock: libc::flock = unsafe { std::mem::zeroed() };
        lock.l_type = libc::F_WRLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;
        lock.l_start = 0;
        lock.l_len = 0;

        if unsafe { libc::fcntl(fd, libc::F_SETLK, &lock) } < 0 {
            let mut probe = lock;
            unsafe {
                libc::fcntl(fd, libc::F_GETLK, &mut probe);
            }
            return Err(Error::resource(format!(
                "uvrrpd already running for this VRID (pid {}, {})",
                probe.l_pid,
                path.display()
            )));
        }

        file.set_len(0).map_err(Error::Io)?;
        writeln!(file, "{}", std::process::id()).map_err(Error::Io)?;

        Ok(Self { path, file })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
