//! Control FIFO plumbing.
//!
//! Grounded on `original_source/vrrp_ctrl.c`'s `vrrp_ctrl_init`: a named
//! pipe at a fixed per-VRID path, mode 0600, opened read-write so the
//! daemon's own open handle keeps it from seeing EOF between writers.
//! The byte tokenizer itself lives in `vrrp::control` — this module only
//! owns the filesystem object and the raw read.

use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, mkfifo, unlink};

use common::{Error, Result};

pub struct ControlFifo {
    path: PathBuf,
    fd: RawFd,
}

impl ControlFifo {
    pub fn create(rundir: &Path, vrid: u8) -> Result<Self> {
        let path = rundir.join(format!("uvrrpd_ctrl.{vrid}"));

        if !path.exists() {
            mkfifo(&path, Mode::from_bits_truncate(0o600))
                .map_err(|e| Error::resource(format!("mkfifo {}: {e}", path.display())))?;
        }

        let fd = open(&path, OFlag::O_RDWR | OFlag::O_NONBLOCK, Mode::empty())
            .map_err(|e| Error::resource(format!("open {}: {e}", path.display())))?;

        Ok(Self { path, fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Read whatever is currently buffered. `O_NONBLOCK` means an empty
    /// pipe reads as `EAGAIN`, reported here as zero bytes rather than an error.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match nix::unistd::read(self.fd, buf) {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(Error::Io(std::io::Error::from(e))),
        }
    }
}

impl Drop for ControlFifo {
    fn drop(&mut self) {
        let _ = close(self.fd);
        let _ = unlink(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_a_fifo_and_drop_removes_it() {
        let dir = std::env::temp_dir().join(format!("uvrrpd-fifo-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("uvrrpd_ctrl.9");
        {
            let fifo = ControlFifo::create(&dir, 9).unwrap();
            assert!(path.exists());
            assert_eq!(fifo.as_raw_fd() >= 0, true);
        }
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
