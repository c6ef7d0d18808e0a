//! Framebuffer surface manager.
//!
//! Owns the device handle to an fbdev node (`/dev/fb*`), exposes display
//! geometry, and maps the device memory for drawing. Panning support makes
//! flip-based double buffering possible; see [`double::FlipBuffer`].
//!
//! The mapped memory region is sized from the *virtual* resolution, so all
//! reconfiguration (`set_virtual_size`, `set_bits_per_pixel`) must happen
//! before `map()` — both operations invalidate an existing mapping and the
//! caller must remap afterwards.

pub mod discover;
pub mod double;
mod ioctl;

use std::ops::{Deref, DerefMut};
use std::path::Path;

use log::{debug, info, warn};
use memmap2::{MmapMut, MmapOptions};

use crate::device::DeviceHandle;
use crate::error::{Error, Result};

pub use ioctl::{BlankingLevel, PixelChannel, PixelLayout};

/// Display geometry snapshot, read from the device.
///
/// `bits_per_pixel` and the virtual size are the only fields this system
/// ever mutates (through [`Framebuffer`]); everything else is
/// device-reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub width_mm: u32,
    pub height_mm: u32,
    pub bits_per_pixel: u32,
    pub pixel_layout: PixelLayout,
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub line_length: u32,
}

impl Geometry {
    pub fn bytes_per_pixel(&self) -> u32 {
        self.bits_per_pixel / 8
    }

    /// Byte length a mapping of the full virtual surface must have.
    pub fn mapped_len(&self) -> usize {
        self.virtual_width as usize * self.virtual_height as usize * self.bytes_per_pixel() as usize
    }
}

/// Memory-mapped view of the framebuffer's virtual surface.
///
/// Dropping the surface unmaps it. The region must be dropped before the
/// owning [`Framebuffer`] is reconfigured or closed; after any geometry
/// change the old contents no longer describe the device and the caller
/// must call [`Framebuffer::map`] again.
pub struct MappedSurface {
    map: MmapMut,
    geometry: Geometry,
}

impl MappedSurface {
    /// Geometry at the time the mapping was created.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }
}

impl Deref for MappedSurface {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl DerefMut for MappedSurface {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

/// An open framebuffer device.
pub struct Framebuffer {
    dev: DeviceHandle,
    vinfo: ioctl::VarScreeninfo,
    finfo: ioctl::FixScreeninfo,
    supports_vsync: bool,
}

impl Framebuffer {
    /// Open the framebuffer at `path` and read its geometry.
    ///
    /// Fails with [`Error::DeviceNotFound`] / [`Error::PermissionDenied`]
    /// when the node cannot be opened, or [`Error::UnsupportedDevice`] when
    /// it does not answer the fbdev ioctls.
    ///
    /// Vsync capability is probed here, once: drivers without the
    /// wait-for-vsync ioctl reject it with ENOTTY/EINVAL. The result is
    /// reported by [`supports_vsync`](Framebuffer::supports_vsync) and never
    /// re-probed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dev = DeviceHandle::open(path)?;

        let vinfo = ioctl::get_vscreeninfo(&dev).map_err(|errno| Error::UnsupportedDevice {
            path: path.to_path_buf(),
            errno,
        })?;
        let finfo = ioctl::get_fscreeninfo(&dev).map_err(|errno| Error::UnsupportedDevice {
            path: path.to_path_buf(),
            errno,
        })?;

        let supports_vsync = match ioctl::wait_for_vsync(&dev) {
            Ok(()) => true,
            Err(errno) if errno.is_unsupported() => false,
            // The ioctl exists but failed transiently (e.g. EINTR).
            Err(_) => true,
        };

        let fb = Self {
            dev,
            vinfo,
            finfo,
            supports_vsync,
        };
        info!(
            "opened framebuffer {} ({}): {}x{} @ {}bpp, vsync {}",
            path.display(),
            fb.id(),
            fb.size().0,
            fb.size().1,
            fb.bits_per_pixel(),
            if supports_vsync { "supported" } else { "unsupported" },
        );
        Ok(fb)
    }

    /// List device nodes handled by the "fb" driver.
    ///
    /// See [`discover`] for the mechanism.
    pub fn list() -> std::io::Result<Vec<std::path::PathBuf>> {
        discover::framebuffer_nodes()
    }

    /// Visible resolution in pixels.
    pub fn size(&self) -> (u32, u32) {
        self.vinfo.size()
    }

    /// Physical size in millimeters, as reported by the driver.
    pub fn physical_size(&self) -> (u32, u32) {
        self.vinfo.size_mm()
    }

    /// Virtual (pannable) resolution in pixels.
    pub fn virtual_size(&self) -> (u32, u32) {
        self.vinfo.virtual_size()
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.vinfo.bits_per_pixel()
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.vinfo.bytes_per_pixel()
    }

    /// Channel layout of a pixel. May change after
    /// [`set_bits_per_pixel`](Framebuffer::set_bits_per_pixel).
    pub fn pixel_layout(&self) -> PixelLayout {
        self.vinfo.pixel_layout()
    }

    /// Driver identification string.
    pub fn id(&self) -> String {
        self.finfo.id()
    }

    /// Current panning offset.
    pub fn offset(&self) -> (u32, u32) {
        self.vinfo.offset()
    }

    /// Full geometry snapshot.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            width: self.vinfo.size().0,
            height: self.vinfo.size().1,
            width_mm: self.vinfo.size_mm().0,
            height_mm: self.vinfo.size_mm().1,
            bits_per_pixel: self.vinfo.bits_per_pixel(),
            pixel_layout: self.vinfo.pixel_layout(),
            virtual_width: self.vinfo.virtual_size().0,
            virtual_height: self.vinfo.virtual_size().1,
            line_length: self.finfo.line_length(),
        }
    }

    /// Whether `wait_for_vsync` is expected to work on this driver.
    pub fn supports_vsync(&self) -> bool {
        self.supports_vsync
    }

    /// Request a larger virtual resolution from the driver.
    ///
    /// Needed for panning-based double buffering. On success any existing
    /// mapping is stale and must be re-created with [`map`](Framebuffer::map).
    /// Fails with [`Error::UnsupportedByDriver`] when the driver rejects
    /// the request; the device keeps its previous configuration.
    pub fn set_virtual_size(&mut self, width: u32, height: u32) -> Result<()> {
        let mut vinfo = self.vinfo;
        vinfo.set_virtual_size(width, height);
        vinfo.activate_now();
        self.put_and_refresh(&vinfo, "virtual size change")?;
        debug!("virtual size set to {}x{}", width, height);
        Ok(())
    }

    /// Request a different pixel depth from the driver.
    ///
    /// Same invalidation and failure semantics as
    /// [`set_virtual_size`](Framebuffer::set_virtual_size). Some drivers
    /// accept the ioctl but clamp the value; read back
    /// [`bits_per_pixel`](Framebuffer::bits_per_pixel) to see what was
    /// actually applied.
    pub fn set_bits_per_pixel(&mut self, bpp: u32) -> Result<()> {
        let mut vinfo = self.vinfo;
        vinfo.set_bits_per_pixel(bpp);
        vinfo.activate_now();
        self.put_and_refresh(&vinfo, "pixel depth change")?;
        debug!("bits per pixel set to {}", self.vinfo.bits_per_pixel());
        Ok(())
    }

    /// Map the device memory for the current virtual geometry.
    ///
    /// The mapping length is `virtual_width * virtual_height *
    /// bytes_per_pixel`, so call this *after* all configuration.
    pub fn map(&self) -> Result<MappedSurface> {
        let geometry = self.geometry();
        let len = geometry.mapped_len();
        // SAFETY: mapping a framebuffer fd shared-writable is the device's
        // intended access mode; len is bounded by the driver's virtual size.
        let map = unsafe { MmapOptions::new().len(len).map_mut(self.dev.file()) }
            .map_err(Error::MappingFailed)?;
        Ok(MappedSurface { map, geometry })
    }

    /// Pan the visible window to `(x, y)` within the virtual surface.
    ///
    /// This is the flip primitive: with a double-height virtual surface,
    /// panning between `y = 0` and `y = height` swaps which half is shown.
    pub fn pan_to(&mut self, x: u32, y: u32) -> Result<()> {
        let (width, height) = self.vinfo.size();
        let (virtual_width, virtual_height) = self.vinfo.virtual_size();
        if x + width > virtual_width || y + height > virtual_height {
            return Err(Error::Config(format!(
                "pan offset ({x}, {y}) plus {width}x{height} exceeds virtual {virtual_width}x{virtual_height}",
            )));
        }

        let mut vinfo = self.vinfo;
        vinfo.set_offset(x, y);
        match ioctl::pan_display(&self.dev, &vinfo) {
            Ok(()) => {
                self.vinfo.set_offset(x, y);
                Ok(())
            }
            Err(errno) if errno.is_unsupported() => Err(Error::UnsupportedByDriver {
                operation: "display panning",
                errno,
            }),
            Err(errno) => Err(Error::DeviceIo(errno.into())),
        }
    }

    /// Set the blanking level directly.
    ///
    /// Drivers may reject transitions into the current state (EBUSY);
    /// callers should tolerate that.
    pub fn blank(&self, level: BlankingLevel) -> Result<()> {
        ioctl::blank(&self.dev, level).map_err(|errno| Error::DeviceIo(errno.into()))
    }

    /// Toggle screen power: `true` powers the screen down, `false` wakes it.
    pub fn set_blanking(&self, enabled: bool) -> Result<()> {
        let level = if enabled {
            BlankingLevel::Powerdown
        } else {
            BlankingLevel::Unblank
        };
        self.blank(level)
    }

    /// Block until the next vertical blanking interval.
    ///
    /// Check [`supports_vsync`](Framebuffer::supports_vsync) first; on
    /// drivers without the ioctl this returns immediately with an error.
    pub fn wait_for_vsync(&self) -> Result<()> {
        ioctl::wait_for_vsync(&self.dev).map_err(|errno| Error::DeviceIo(errno.into()))
    }

    /// Write `vinfo` to the driver and re-read what it actually applied.
    fn put_and_refresh(
        &mut self,
        vinfo: &ioctl::VarScreeninfo,
        operation: &'static str,
    ) -> Result<()> {
        match ioctl::put_vscreeninfo(&self.dev, vinfo) {
            Ok(()) => {}
            Err(errno) if errno.is_unsupported() => {
                return Err(Error::UnsupportedByDriver { operation, errno });
            }
            Err(errno) => return Err(Error::DeviceIo(errno.into())),
        }
        match ioctl::get_vscreeninfo(&self.dev) {
            Ok(applied) => self.vinfo = applied,
            Err(errno) => {
                warn!("re-reading screen info after {operation} failed: {errno}");
                self.vinfo = *vinfo;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("dev", &self.dev)
            .field("size", &self.size())
            .field("virtual_size", &self.virtual_size())
            .field("bits_per_pixel", &self.bits_per_pixel())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_mapped_len() {
        let g = Geometry {
            width: 800,
            height: 480,
            width_mm: 154,
            height_mm: 86,
            bits_per_pixel: 32,
            pixel_layout: PixelLayout {
                red: PixelChannel { offset: 16, length: 8, msb_right: false },
                green: PixelChannel { offset: 8, length: 8, msb_right: false },
                blue: PixelChannel { offset: 0, length: 8, msb_right: false },
                alpha: PixelChannel { offset: 24, length: 8, msb_right: false },
            },
            virtual_width: 800,
            virtual_height: 960,
            line_length: 3200,
        };
        assert_eq!(g.bytes_per_pixel(), 4);
        // Double-height virtual surface: twice the visible frame.
        assert_eq!(g.mapped_len(), 800 * 960 * 4);
        assert!(g.mapped_len() >= 800 * 480 * 4);
    }
}
