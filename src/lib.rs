//! fbstage — display and input platform backend for embedded Linux.
//!
//! For devices without a windowing server: the kernel framebuffer is the
//! drawable surface, and every touch/pointer/keyboard device is folded
//! into one ordered event stream. A GUI runtime sits on top and supplies
//! pixels; this crate supplies everything below it.
//!
//! # Architecture
//!
//! ```text
//! GUI runtime (not this crate)
//!   │ draw into frame, present()          │ pull normalized events
//!   ▼                                     ▼
//! ┌─────────────────────┐   ┌──────────────────────────────────┐
//! │ Surface             │   │ EventStream                      │
//! │  Framebuffer (mmap) │   │   ▲ single poll thread           │
//! │  FlipBuffer (pan)   │   │ drivers: touch / pointer / key   │
//! └─────────────────────┘   │ registry + hot-plug watcher      │
//! ┌─────────────────────┐   │ keymap (XKB rules)               │
//! │ TtyGuard            │   └──────────────────────────────────┘
//! │  KD_GRAPHICS +      │
//! │  guaranteed restore │
//! └─────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use fbstage::{Backend, EventKind};
//!
//! let mut backend = Backend::builder()
//!     .with_vsync(true)
//!     .build()
//!     .expect("backend startup");
//!
//! loop {
//!     while let Some(event) = backend.events().try_next() {
//!         match event.kind {
//!             EventKind::ShutdownRequested => return,
//!             other => { /* feed the UI */ let _ = other; }
//!         }
//!     }
//!     let surface = backend.surface();
//!     surface.frame().fill(0x00);
//!     surface.present().expect("flip");
//! }
//! ```
//!
//! # Configuration
//!
//! Builder calls override environment variables, which override the
//! compiled defaults:
//!
//! | Setting | Variable | Default |
//! |---|---|---|
//! | Framebuffer device | `SLINT_FRAMEBUFFER` | `/dev/fb0` |
//! | Console device | `SLINT_TTY_DEVICE` | `/dev/tty1`, then `/dev/tty0` |
//! | Keymap rules/model/layout/variant/options | `XKB_DEFAULT_*` | system defaults |
//!
//! The console is always restored to its original mode — on drop, on
//! panic unwind, and on termination signals.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod fb;
pub mod input;
pub mod tty;

pub use backend::{Backend, BackendBuilder, Surface};
pub use error::{Error, Result};
pub use fb::double::FlipBuffer;
pub use fb::{BlankingLevel, Framebuffer, Geometry, MappedSurface, PixelChannel, PixelLayout};
pub use input::{
    Button, Capabilities, DeviceDescriptor, DeviceId, Event, EventKind, EventStream, FilterPolicy,
    KeymapConfig, TouchPhase,
};
pub use tty::{ConsoleMode, TtyGuard};
