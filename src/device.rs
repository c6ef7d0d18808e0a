//! Device handle — an owned file descriptor for a character device node.
//!
//! Every higher-level manager (framebuffer surface, TTY controller) owns
//! exactly one `DeviceHandle`. The descriptor is closed exactly once, when
//! the handle drops with its owner.

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{Errno, Error, Result};

/// An open device node.
pub struct DeviceHandle {
    path: PathBuf,
    file: File,
}

impl DeviceHandle {
    /// Open a device node read-write.
    ///
    /// A missing node maps to [`Error::DeviceNotFound`], an EACCES/EPERM
    /// failure to [`Error::PermissionDenied`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::from_open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Issue an ioctl whose argument is a pointer to `arg`.
    ///
    /// Returns the captured errno on failure; the caller classifies it
    /// into the crate error taxonomy.
    pub(crate) fn ioctl<T>(&self, request: libc::c_ulong, arg: *mut T) -> std::result::Result<(), Errno> {
        // SAFETY: the fd is open for the lifetime of self and `arg` points
        // to a live, correctly-typed argument for this request.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if ret == -1 { Err(Errno::last()) } else { Ok(()) }
    }

    /// Issue an ioctl whose argument is passed by value.
    pub(crate) fn ioctl_val(&self, request: libc::c_ulong, arg: libc::c_ulong) -> std::result::Result<(), Errno> {
        // SAFETY: same as `ioctl`, with an immediate argument.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if ret == -1 { Err(Errno::last()) } else { Ok(()) }
    }
}

impl AsRawFd for DeviceHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}
