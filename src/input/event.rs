//! Normalized input events and device descriptors.
//!
//! Everything the multiplexer delivers is one of these closed variants.
//! Events are immutable once produced; ownership moves from the driver to
//! the poll loop's channel and from there to the consuming runtime.

use std::path::PathBuf;
use std::time::Instant;

use xkbcommon::xkb::Keysym;

bitflags::bitflags! {
    /// Input capabilities recognized on a device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const TOUCH   = 1 << 0;
        const POINTER = 1 << 1;
        const KEYBOARD = 1 << 2;
    }
}

/// Stable identity of an input device, for de-duplication across
/// hot-plug cycles.
///
/// Event-node paths get renumbered when devices reconnect, so identity is
/// the kernel input id plus the advertised name instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub name: String,
}

/// A discovered input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Event node path at discovery time. Transient; not identity.
    pub path: PathBuf,
    /// Human-readable device name.
    pub name: String,
    pub capabilities: Capabilities,
    pub id: DeviceId,
}

/// Pointer button, mapped from the raw button code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

/// Lifecycle of a touch contact within its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
}

/// One normalized input event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Relative pointer motion, one per device sync boundary.
    PointerMove { dx: i32, dy: i32 },
    /// A pointer button changed state. Emitted immediately, never batched
    /// with motion.
    Button { button: Button, pressed: bool },
    /// A touch contact changed, scaled into surface pixel coordinates.
    Touch {
        slot: u32,
        x: i32,
        y: i32,
        phase: TouchPhase,
    },
    /// A key changed state. Carries both the raw code and the resolved
    /// symbol so the consumer can apply its own remapping.
    Key {
        /// Raw kernel keycode.
        code: u16,
        /// Symbol resolved through the active keymap.
        keysym: Keysym,
        /// Text produced by the key, when it produces any.
        text: Option<String>,
        pressed: bool,
        /// True for kernel auto-repeat of a held key.
        repeat: bool,
    },
    /// Accumulated wheel motion, flushed on the sync boundary.
    Wheel { dx: i32, dy: i32 },
    /// A device passed the filter and its driver was attached.
    DeviceAdded(DeviceDescriptor),
    /// A device went away. All events it produced have already been
    /// delivered.
    DeviceRemoved(DeviceId),
    /// A termination signal asked the backend to shut down.
    ShutdownRequested,
}

/// A normalized event with its arrival timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Monotonic timestamp taken when the poll loop normalized the event.
    pub time: Instant,
    pub kind: EventKind,
}

impl Event {
    pub(crate) fn now(kind: EventKind) -> Self {
        Self {
            time: Instant::now(),
            kind,
        }
    }
}
