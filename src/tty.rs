//! TTY graphics-mode controller.
//!
//! Switching the console to KD_GRAPHICS stops the fbcon cursor and text
//! output from drawing over the framebuffer. Leaving a console stuck in
//! graphics mode makes the machine unusable without a manual reset, so
//! restoration is guaranteed on every exit path:
//!
//! - normal release (or the guard's `Drop`, including unwinds)
//! - termination signals, via [`restore_for_signal`] reachable from a
//!   signal handler without touching the guard itself
//!
//! At most one guard may be live per process; the console's pre-acquire
//! mode is recorded and is what gets restored.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};

use crate::device::DeviceHandle;
use crate::error::{Error, Result};

// Console KD ioctls (linux/kd.h).
const KDGETMODE: libc::c_ulong = 0x4B3B;
const KDSETMODE: libc::c_ulong = 0x4B3A;
const KD_TEXT: libc::c_ulong = 0x00;
const KD_GRAPHICS: libc::c_ulong = 0x01;

/// Console display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    Text,
    Graphics,
}

impl ConsoleMode {
    fn from_raw(raw: libc::c_ulong) -> Self {
        if raw == KD_GRAPHICS {
            ConsoleMode::Graphics
        } else {
            ConsoleMode::Text
        }
    }

    fn as_ulong(self) -> libc::c_ulong {
        match self {
            ConsoleMode::Text => KD_TEXT,
            ConsoleMode::Graphics => KD_GRAPHICS,
        }
    }
}

/// Restore target for the signal path: which console to reopen and which
/// mode to put it back into.
static SIGNAL_RESTORE: Mutex<Option<(PathBuf, ConsoleMode)>> = Mutex::new(None);

/// One guard per process.
static ACQUIRED: AtomicBool = AtomicBool::new(false);

/// Scoped console graphics-mode acquisition.
pub struct TtyGuard {
    dev: DeviceHandle,
    previous: ConsoleMode,
    released: bool,
}

impl TtyGuard {
    /// Open the first usable console from `candidates`, record its mode,
    /// and switch it to graphics mode.
    ///
    /// A candidate is usable when it can be opened *and* answers the
    /// console-mode ioctl — a path that opens but is not a virtual
    /// terminal is skipped. Fails with [`Error::TtyUnavailable`] when no
    /// candidate qualifies.
    pub fn acquire(candidates: &[PathBuf]) -> Result<Self> {
        if ACQUIRED.swap(true, Ordering::SeqCst) {
            return Err(Error::Config(
                "console graphics mode already acquired by this process".into(),
            ));
        }

        for path in candidates {
            let Ok(dev) = DeviceHandle::open(path) else {
                continue;
            };
            let Ok(previous) = current_mode(&dev) else {
                warn!("{} opened but does not answer KDGETMODE, skipping", path.display());
                continue;
            };

            if let Err(errno) = dev.ioctl_val(KDSETMODE, ConsoleMode::Graphics.as_ulong()) {
                warn!("cannot switch {} to graphics mode: {errno}", path.display());
                continue;
            }

            info!("console {} switched to graphics mode (was {previous:?})", path.display());
            *SIGNAL_RESTORE.lock().unwrap() = Some((path.clone(), previous));
            return Ok(Self {
                dev,
                previous,
                released: false,
            });
        }

        ACQUIRED.store(false, Ordering::SeqCst);
        Err(Error::TtyUnavailable {
            tried: candidates.to_vec(),
        })
    }

    /// Console mode recorded at acquisition; the restore target.
    pub fn previous_mode(&self) -> ConsoleMode {
        self.previous
    }

    /// Restore the console to its pre-acquire mode. Idempotent.
    ///
    /// Failure is logged, never escalated: release runs during teardown
    /// when no caller remains to handle an error.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(errno) = self.dev.ioctl_val(KDSETMODE, self.previous.as_ulong()) {
            error!(
                "failed to restore console {} to {:?}: {errno}",
                self.dev.path().display(),
                self.previous,
            );
        } else {
            info!("console {} restored to {:?}", self.dev.path().display(), self.previous);
        }

        *SIGNAL_RESTORE.lock().unwrap() = None;
        ACQUIRED.store(false, Ordering::SeqCst);
    }
}

impl Drop for TtyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn current_mode(dev: &DeviceHandle) -> std::result::Result<ConsoleMode, crate::error::Errno> {
    // The kernel writes an int here.
    let mut raw: libc::c_int = 0;
    dev.ioctl(KDGETMODE, &mut raw)?;
    Ok(ConsoleMode::from_raw(raw as libc::c_ulong))
}

/// Restore the console from a signal handler.
///
/// Reopens the acquired console by path rather than touching the guard,
/// so it is safe to call while the rest of the process is mid-teardown.
/// No-op when nothing is acquired.
pub(crate) fn restore_for_signal() {
    let Ok(guard) = SIGNAL_RESTORE.lock() else {
        return;
    };
    if let Some((path, mode)) = guard.as_ref() {
        if let Ok(dev) = DeviceHandle::open(path) {
            let _ = dev.ioctl_val(KDSETMODE, mode.as_ulong());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_raw_round_trip() {
        assert_eq!(ConsoleMode::from_raw(KD_TEXT), ConsoleMode::Text);
        assert_eq!(ConsoleMode::from_raw(KD_GRAPHICS), ConsoleMode::Graphics);
        assert_eq!(ConsoleMode::Text.as_ulong(), KD_TEXT);
        assert_eq!(ConsoleMode::Graphics.as_ulong(), KD_GRAPHICS);
    }

    #[test]
    fn test_acquire_reports_all_candidates_on_failure() {
        let candidates = vec![
            PathBuf::from("/nonexistent/tty-first"),
            PathBuf::from("/nonexistent/tty-second"),
        ];
        match TtyGuard::acquire(&candidates) {
            Err(Error::TtyUnavailable { tried }) => assert_eq!(tried, candidates),
            Err(other) => panic!("expected TtyUnavailable, got {other:?}"),
            Ok(_) => panic!("acquire unexpectedly succeeded"),
        }
        // A failed acquire leaves the process slot free.
        assert!(!ACQUIRED.load(Ordering::SeqCst));
    }
}
