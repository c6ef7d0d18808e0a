//! Driver attachment and dispatch.
//!
//! The protocol set is fixed and finite, so per-device behavior is a
//! closed variant chosen once at attach time — no dynamic dispatch.
//! Devices advertising several capabilities get the most specific driver:
//! touch beats pointer beats keyboard.

use evdev::Device;
use log::{debug, warn};

use crate::input::event::{Capabilities, DeviceDescriptor, Event};
use crate::input::keyboard::KeyboardDriver;
use crate::input::keymap::ResolvedKeymap;
use crate::input::pointer::PointerDriver;
use crate::input::touch::TouchDriver;

/// Kernel auto-repeat applied to keyboards at attach time.
const KEY_REPEAT_DELAY_MS: u32 = 250;
const KEY_REPEAT_PERIOD_MS: u32 = 33;

/// Per-device protocol state machine.
pub enum Driver {
    Touch(TouchDriver),
    Pointer(PointerDriver),
    Keyboard(KeyboardDriver),
}

impl Driver {
    /// Choose and initialize the driver for `device`.
    ///
    /// `surface_size` is the pixel geometry touch coordinates scale into.
    pub(crate) fn attach(
        device: &mut Device,
        descriptor: &DeviceDescriptor,
        surface_size: (u32, u32),
        keymap: &ResolvedKeymap,
    ) -> Self {
        let caps = descriptor.capabilities;
        if caps.contains(Capabilities::TOUCH) {
            debug!("attaching touch driver to {:?}", descriptor.name);
            Driver::Touch(TouchDriver::from_device(device, surface_size))
        } else if caps.contains(Capabilities::POINTER) {
            debug!("attaching pointer driver to {:?}", descriptor.name);
            Driver::Pointer(PointerDriver::new())
        } else {
            debug!("attaching keyboard driver to {:?}", descriptor.name);
            let repeat = evdev::AutoRepeat {
                delay: KEY_REPEAT_DELAY_MS,
                period: KEY_REPEAT_PERIOD_MS,
            };
            if let Err(e) = device.update_auto_repeat(&repeat) {
                warn!("cannot set auto-repeat on {:?}: {e}", descriptor.name);
            }
            Driver::Keyboard(KeyboardDriver::new(keymap))
        }
    }

    /// Feed one batch of raw events through the device's state machine.
    pub fn process(&mut self, events: &[evdev::InputEvent], out: &mut Vec<Event>) {
        match self {
            Driver::Touch(d) => d.process(events, out),
            Driver::Pointer(d) => d.process(events, out),
            Driver::Keyboard(d) => d.process(events, out),
        }
    }
}

/// A device with its driver, as held by the poll loop.
pub(crate) struct AttachedDevice {
    pub device: Device,
    pub descriptor: DeviceDescriptor,
    pub driver: Driver,
}
