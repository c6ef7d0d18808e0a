//! Input subsystem — device discovery, drivers, and the event multiplexer.
//!
//! ```text
//! /dev/input/event* ──► registry (filter) ──► drivers (touch/pointer/key)
//!         ▲                                          │
//!    hot-plug watcher ──► notices ──► poll loop ◄────┘
//!                                        │
//!                                 normalized events
//!                                        ▼
//!                                  EventStream
//! ```
//!
//! The registry decides *which* devices participate, the drivers decide
//! *what* their raw protocols mean, and the poll loop decides *when*
//! anything is read. The consumer only ever sees [`EventStream`].

pub mod driver;
pub mod event;
pub mod hotplug;
pub mod keyboard;
pub mod keymap;
pub mod pointer;
pub mod poller;
pub mod registry;
pub mod touch;

pub use event::{
    Button, Capabilities, DeviceDescriptor, DeviceId, Event, EventKind, TouchPhase,
};
pub use keymap::{KeymapConfig, ResolvedKeymap};
pub use poller::EventStream;
pub use registry::FilterPolicy;
