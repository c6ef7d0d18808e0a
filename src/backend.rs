//! Backend assembly — aggregated startup and ordered teardown.
//!
//! `BackendBuilder::build` acquires the surface, the console, and the
//! input subsystem as one unit; any failure tears down what was already
//! acquired and surfaces a single error, so the backend never runs in a
//! degraded state. Teardown runs in the reverse shape, with one
//! exception: console restoration is attempted unconditionally, even
//! when input or surface teardown misbehaves, because a console stuck in
//! graphics mode is the one failure the user cannot recover from.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Once};

use log::{info, warn};

use crate::config::BuilderValues;
use crate::error::Result;
use crate::fb::double::FlipBuffer;
use crate::fb::{BlankingLevel, Framebuffer, Geometry, MappedSurface};
use crate::input::event::Event;
use crate::input::hotplug::HotplugWatcher;
use crate::input::keymap::{KeymapConfig, ResolvedKeymap};
use crate::input::poller::{EventStream, InputPoller, Waker};
use crate::input::registry;
use crate::tty::TtyGuard;

// =============================================================================
// Signal path
// =============================================================================

/// Shutdown flag and waker of the live backend, for the signal handler.
/// Kept in a static because the termination handler can only be installed
/// once per process while backends may be rebuilt.
static SIGNAL_TARGETS: Mutex<Option<(Arc<AtomicBool>, Arc<Waker>)>> = Mutex::new(None);
static SIGNAL_HOOK: Once = Once::new();

/// Install the termination handler: restore the console first, then ask
/// the poll loop to wind down. The handler must not rely on any of the
/// backend's guards, which may be mid-teardown.
fn install_signal_hook() {
    SIGNAL_HOOK.call_once(|| {
        let result = ctrlc::set_handler(|| {
            crate::tty::restore_for_signal();
            if let Ok(targets) = SIGNAL_TARGETS.lock() {
                if let Some((running, waker)) = targets.as_ref() {
                    running.store(false, Ordering::SeqCst);
                    waker.notify();
                }
            }
        });
        if let Err(e) = result {
            warn!("signal handler not installed: {e}");
        }
    });
}

// =============================================================================
// Surface
// =============================================================================

/// The drawable surface handed to the consuming runtime.
///
/// Either a plain mapping of the visible frame or a flip pair. In both
/// cases [`frame`](Surface::frame) is a bounded, non-owning view valid
/// for the current frame only — after [`present`](Surface::present) it
/// must be re-borrowed.
pub enum Surface {
    /// Single-buffered: writes land on the visible frame directly.
    Direct {
        fb: Framebuffer,
        map: MappedSurface,
    },
    /// Double-buffered: writes land on the back half, `present` pans.
    DoubleBuffered(FlipBuffer),
}

impl Surface {
    /// Visible size in pixels.
    pub fn size(&self) -> (u32, u32) {
        match self {
            Surface::Direct { fb, .. } => fb.size(),
            Surface::DoubleBuffered(flip) => (flip.width(), flip.height()),
        }
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Surface::Direct { fb, .. } => fb.bytes_per_pixel(),
            Surface::DoubleBuffered(flip) => flip.bytes_per_pixel(),
        }
    }

    /// Geometry of the underlying device.
    pub fn geometry(&self) -> Geometry {
        self.framebuffer().geometry()
    }

    /// The frame to draw into.
    pub fn frame(&mut self) -> &mut [u8] {
        match self {
            Surface::Direct { map, .. } => &mut map[..],
            Surface::DoubleBuffered(flip) => flip.back_buffer(),
        }
    }

    /// Make the drawn frame visible. A no-op for direct surfaces.
    pub fn present(&mut self) -> Result<()> {
        match self {
            Surface::Direct { .. } => Ok(()),
            Surface::DoubleBuffered(flip) => flip.flip(),
        }
    }

    /// Whether `present` synchronizes to the vertical blanking interval.
    pub fn vsynced(&self) -> bool {
        match self {
            Surface::Direct { .. } => false,
            Surface::DoubleBuffered(flip) => flip.vsynced(),
        }
    }

    pub fn set_blanking(&self, enabled: bool) -> Result<()> {
        self.framebuffer().set_blanking(enabled)
    }

    pub fn blank(&self, level: BlankingLevel) -> Result<()> {
        self.framebuffer().blank(level)
    }

    /// The underlying framebuffer, for geometry queries.
    pub fn framebuffer(&self) -> &Framebuffer {
        match self {
            Surface::Direct { fb, .. } => fb,
            Surface::DoubleBuffered(flip) => flip.framebuffer(),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Backend`].
///
/// Unset values fall back to environment variables, then to compiled
/// defaults; see the crate documentation for the variable table.
#[derive(Debug, Default)]
pub struct BackendBuilder {
    values: BuilderValues,
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Framebuffer device path (e.g. `/dev/fb1`).
    pub fn with_framebuffer(mut self, path: impl Into<PathBuf>) -> Self {
        self.values.fb_path = Some(path.into());
        self
    }

    /// Console device path (e.g. `/dev/tty3`). `/dev/tty0` stays the
    /// fallback when this path cannot be opened.
    pub fn with_tty(mut self, path: impl Into<PathBuf>) -> Self {
        self.values.tty_path = Some(path.into());
        self
    }

    /// Enable or disable input device autodiscovery (default: on).
    /// When off, no input devices are attached at all.
    pub fn with_input_autodiscovery(mut self, enable: bool) -> Self {
        self.values.autodiscovery = Some(enable);
        self
    }

    /// Enable or disable hot-plug monitoring (default: on).
    pub fn with_hotplug(mut self, enable: bool) -> Self {
        self.values.hotplug = Some(enable);
        self
    }

    /// Admit only devices whose name exactly matches an entry.
    pub fn with_input_whitelist(mut self, names: Vec<String>) -> Self {
        self.values.whitelist = names;
        self
    }

    /// Reject devices whose name contains any entry.
    pub fn with_input_blacklist(mut self, names: Vec<String>) -> Self {
        self.values.blacklist = names;
        self
    }

    /// Enable flip-based double buffering (default: on).
    pub fn with_double_buffer(mut self, enable: bool) -> Self {
        self.values.double_buffer = Some(enable);
        self
    }

    /// Wait for vertical sync on flips, when the driver supports it
    /// (default: off). Check [`Surface::vsynced`] for what was actually
    /// negotiated.
    pub fn with_vsync(mut self, enable: bool) -> Self {
        self.values.vsync = Some(enable);
        self
    }

    /// Keymap configuration; unset fields fall back to `XKB_DEFAULT_*`
    /// and then to the rule database's defaults.
    pub fn with_keymap(mut self, keymap: KeymapConfig) -> Self {
        self.values.keymap = keymap;
        self
    }

    /// Acquire surface, console, and input as one unit.
    pub fn build(self) -> Result<Backend> {
        Backend::start(self)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// The assembled platform backend.
///
/// The consuming runtime draws into [`Surface::frame`], calls
/// [`Surface::present`], and pulls normalized input from
/// [`events`](Backend::events). Dropping the backend runs the full
/// teardown sequence.
pub struct Backend {
    surface: Surface,
    events: EventStream,
    poller: InputPoller,
    hotplug: Option<HotplugWatcher>,
    tty: TtyGuard,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Backend {
    /// Build with all defaults. Equivalent to `Backend::builder().build()`.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> BackendBuilder {
        BackendBuilder::new()
    }

    fn start(builder: BackendBuilder) -> Result<Self> {
        let config = builder.values.resolve();

        // Validate the keymap up front: an unresolvable layout must fail
        // the whole startup, not the first key press.
        ResolvedKeymap::resolve(&config.keymap)?;

        let fb = Framebuffer::open(&config.fb_path)?;
        let surface = if config.double_buffer {
            Surface::DoubleBuffered(FlipBuffer::new(fb, config.vsync)?)
        } else {
            let map = fb.map()?;
            Surface::Direct { fb, map }
        };

        let tty = TtyGuard::acquire(&config.tty_candidates)?;

        // Input subsystem. The poll thread owns all drivers; this thread
        // only enumerates.
        let running = Arc::new(AtomicBool::new(true));
        let waker = Arc::new(Waker::new()?);
        let (event_tx, event_rx) = mpsc::channel();
        let (hotplug_tx, hotplug_rx) = mpsc::channel();

        let initial = if config.autodiscovery {
            registry::enumerate(&config.filter)
        } else {
            Vec::new()
        };
        info!("attaching {} input device(s)", initial.len());
        let known: HashSet<PathBuf> = initial.iter().map(|(_, d)| d.path.clone()).collect();

        let poller = InputPoller::spawn(
            initial,
            config.keymap.clone(),
            surface.size(),
            hotplug_rx,
            event_tx,
            waker.clone(),
            running.clone(),
        )?;

        let hotplug = if config.autodiscovery && config.hotplug {
            Some(HotplugWatcher::spawn(
                config.filter.clone(),
                known,
                hotplug_tx,
                waker.clone(),
                running.clone(),
            )?)
        } else {
            None
        };

        *SIGNAL_TARGETS.lock().unwrap() = Some((running.clone(), waker.clone()));
        install_signal_hook();

        Ok(Self {
            surface,
            events: EventStream::new(event_rx),
            poller,
            hotplug,
            tty,
            running,
            waker,
        })
    }

    /// The drawable surface.
    pub fn surface(&mut self) -> &mut Surface {
        &mut self.surface
    }

    /// The normalized input stream.
    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// Convenience for `events().next()`.
    pub fn next_event(&self) -> Option<Event> {
        self.events.next()
    }

    /// Console mode that will be restored on teardown.
    pub fn restored_console_mode(&self) -> crate::tty::ConsoleMode {
        self.tty.previous_mode()
    }

    /// Whether the event loop is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the poll loop to stop. The stream delivers a final
    /// `ShutdownRequested` and then ends; full teardown happens on drop.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.waker.notify();
    }

    /// Tear down explicitly. Same as dropping, but visible in the code.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        // Stop notification producers before the consumer of their
        // notices, then restore the console no matter what. The surface
        // unmaps and closes when its field drops afterwards.
        if let Ok(mut targets) = SIGNAL_TARGETS.lock() {
            *targets = None;
        }
        if let Some(watcher) = self.hotplug.as_mut() {
            watcher.stop();
        }
        self.poller.stop();
        self.tty.release();
    }
}
