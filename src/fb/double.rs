//! Flip-based double buffering on top of panning.
//!
//! The virtual surface is configured to twice the visible height. Exactly
//! one half is visible (selected by the panning offset) while the other is
//! the back buffer being drawn into; `flip()` swaps the roles. Two flips
//! return the visible offset to where it started.

use log::warn;

use crate::error::Result;
use crate::fb::{BlankingLevel, Framebuffer, MappedSurface};

/// Which half of the double-height surface is the current back buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawTarget {
    First,
    Second,
}

impl DrawTarget {
    fn flipped(self) -> Self {
        match self {
            DrawTarget::First => DrawTarget::Second,
            DrawTarget::Second => DrawTarget::First,
        }
    }

    /// Byte range of this half within a mapping of `frame_len * 2` bytes.
    fn byte_range(self, frame_len: usize) -> (usize, usize) {
        match self {
            DrawTarget::First => (0, frame_len),
            DrawTarget::Second => (frame_len, frame_len * 2),
        }
    }

    /// Panning y-offset that makes the *other* half visible while this
    /// half is being drawn.
    fn visible_y(self, height: u32) -> u32 {
        match self {
            DrawTarget::First => height,
            DrawTarget::Second => 0,
        }
    }
}

/// Double-buffered drawing surface.
///
/// Takes ownership of the framebuffer: once constructed, all geometry is
/// final and the flip buffer is the only component panning the display.
pub struct FlipBuffer {
    fb: Framebuffer,
    surface: MappedSurface,
    width: u32,
    height: u32,
    target: DrawTarget,
    wait_vsync: bool,
}

impl FlipBuffer {
    /// Configure `fb` for double buffering and map it.
    ///
    /// Grows the virtual size to twice the visible height (failing with
    /// [`crate::Error::UnsupportedByDriver`] on drivers that cannot pan that
    /// far),
    /// then maps the doubled surface. An offset already sitting at the
    /// second half is kept, so the screen never shows a stale frame
    /// between construction and the first flip.
    ///
    /// When `wait_vsync` is set and the driver supports it, every flip
    /// blocks until the vertical blanking interval before panning.
    pub fn new(mut fb: Framebuffer, wait_vsync: bool) -> Result<Self> {
        let (width, height) = fb.size();
        let (virtual_width, virtual_height) = fb.virtual_size();
        if virtual_width != width || virtual_height != height * 2 {
            fb.set_virtual_size(width, height * 2)?;
        }

        let (offset_x, mut offset_y) = fb.offset();
        if offset_x != 0 || (offset_y != 0 && offset_y != height) {
            fb.pan_to(0, 0)?;
            offset_y = 0;
        }

        let surface = fb.map()?;
        // Draw into whichever half is not visible right now.
        let target = if offset_y == height {
            DrawTarget::First
        } else {
            DrawTarget::Second
        };

        let wait_vsync = wait_vsync && fb.supports_vsync();
        Ok(Self {
            fb,
            surface,
            width,
            height,
            target,
            wait_vsync,
        })
    }

    /// Visible width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Visible height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.fb.bytes_per_pixel()
    }

    /// Whether flips synchronize to the vertical blanking interval.
    pub fn vsynced(&self) -> bool {
        self.wait_vsync
    }

    /// The underlying framebuffer, for geometry queries and blanking.
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.fb
    }

    /// Mutable slice over the current back buffer.
    ///
    /// One visible frame long; nothing written here reaches the screen
    /// until [`flip`](FlipBuffer::flip). The slice is only valid for the
    /// current frame — a flip retargets it at the other half.
    pub fn back_buffer(&mut self) -> &mut [u8] {
        let frame_len = self.width as usize * self.height as usize * self.bytes_per_pixel() as usize;
        let (start, end) = self.target.byte_range(frame_len);
        &mut self.surface[start..end]
    }

    /// Make the back buffer visible and swap roles.
    pub fn flip(&mut self) -> Result<()> {
        if self.wait_vsync {
            if let Err(e) = self.fb.wait_for_vsync() {
                warn!("vsync wait failed, panning immediately: {e}");
            }
        }
        let next = self.target.flipped();
        self.fb.pan_to(0, next.visible_y(self.height))?;
        self.target = next;
        Ok(())
    }

    /// Blanking passthrough; see [`Framebuffer::blank`].
    pub fn blank(&self, level: BlankingLevel) -> Result<()> {
        self.fb.blank(level)
    }

    pub fn set_blanking(&self, enabled: bool) -> Result<()> {
        self.fb.set_blanking(enabled)
    }

    /// Release double buffering, returning the framebuffer.
    ///
    /// The mapping is dropped first; the caller gets the device back with
    /// its doubled virtual size still in place.
    pub fn into_framebuffer(self) -> Framebuffer {
        drop(self.surface);
        self.fb
    }
}

impl std::fmt::Debug for FlipBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("target", &self.target)
            .field("wait_vsync", &self.wait_vsync)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_twice_returns_to_origin() {
        let start = DrawTarget::Second;
        let flipped = start.flipped();
        assert_eq!(flipped, DrawTarget::First);
        assert_eq!(flipped.flipped(), start);

        // Offsets also round-trip: second-half-drawing shows y=0,
        // first-half-drawing shows y=height.
        assert_eq!(start.visible_y(480), 0);
        assert_eq!(flipped.visible_y(480), 480);
        assert_eq!(flipped.flipped().visible_y(480), 0);
    }

    #[test]
    fn test_back_buffer_ranges_do_not_overlap() {
        let frame_len = 800 * 480 * 4;
        let (a_start, a_end) = DrawTarget::First.byte_range(frame_len);
        let (b_start, b_end) = DrawTarget::Second.byte_range(frame_len);
        assert_eq!(a_end - a_start, frame_len);
        assert_eq!(b_end - b_start, frame_len);
        assert_eq!(a_end, b_start);
        assert_eq!(b_end, frame_len * 2);
    }

    #[test]
    fn test_draw_target_never_aliases_visible_half() {
        // The half being drawn must never be the half being shown.
        for target in [DrawTarget::First, DrawTarget::Second] {
            let height = 480;
            let frame_len = 800 * 480 * 4;
            let (start, _) = target.byte_range(frame_len);
            let drawn_y = (start / (800 * 4)) as u32;
            assert_ne!(drawn_y, target.visible_y(height));
        }
    }
}
