//! Error taxonomy for the backend.
//!
//! Startup failures (surface open/map, TTY acquisition, keymap resolution)
//! are fatal and bubble out of `BackendBuilder::build` as one of these
//! variants. Per-device I/O failures during polling never surface here —
//! the poll loop detaches the device and keeps running.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failures the backend can report to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The device node does not exist.
    #[error("device not found: {}", .0.display())]
    DeviceNotFound(PathBuf),

    /// The device node exists but the process may not open it.
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// The node was opened but does not answer the ioctls a framebuffer
    /// must support.
    #[error("{} is not a usable framebuffer device ({errno})", .path.display())]
    UnsupportedDevice { path: PathBuf, errno: Errno },

    /// The driver rejected a geometry or depth request. The device stays
    /// usable with its previous configuration.
    #[error("driver rejected {operation} ({errno})")]
    UnsupportedByDriver {
        operation: &'static str,
        errno: Errno,
    },

    /// The kernel refused to map the framebuffer memory.
    #[error("mapping framebuffer memory failed: {0}")]
    MappingFailed(#[source] io::Error),

    /// No console device out of the candidate list could be opened.
    #[error("no usable console device (tried {tried:?})")]
    TtyUnavailable { tried: Vec<PathBuf> },

    /// Read or write on an already-open device failed.
    #[error("device I/O error: {0}")]
    DeviceIo(#[from] io::Error),

    /// The rule database could not compose the requested layout.
    #[error("keymap not resolvable: {0}")]
    InvalidLayoutSpec(String),

    /// A configuration value is invalid or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Classify a failed open of a device node.
    pub(crate) fn from_open(path: &std::path::Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::DeviceNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::DeviceIo(err),
        }
    }
}

/// Error number captured from a failed libc call, with the `strerror`
/// message resolved at capture time.
///
/// The message varies with the user's locale; compare against the `code`
/// field (`libc::E*` constants) instead.
#[derive(Debug, Clone)]
pub struct Errno {
    pub code: i32,
    pub message: String,
}

impl Errno {
    /// Capture the current thread's errno. Call immediately after the
    /// failing libc call, before anything else can clobber it.
    pub(crate) fn last() -> Self {
        let err = io::Error::last_os_error();
        Self {
            code: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
        }
    }

    /// True for the errno values drivers use to signal "not implemented":
    /// ENOTTY (no such ioctl) and EINVAL (parameters rejected).
    pub(crate) fn is_unsupported(&self) -> bool {
        self.code == libc::ENOTTY || self.code == libc::EINVAL
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "errno {}: {}", self.code, self.message)
    }
}

impl From<Errno> for io::Error {
    fn from(e: Errno) -> io::Error {
        io::Error::from_raw_os_error(e.code)
    }
}
