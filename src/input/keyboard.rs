//! Keyboard driver — scan codes to symbols through the active keymap.
//!
//! Each device carries its own lookup state (modifiers, lock keys, group)
//! derived from the shared compiled keymap. The raw kernel code is always
//! delivered alongside the resolved symbol, so a consumer can layer its
//! own remapping on top.

use evdev::{EventSummary, InputEvent};
use xkbcommon::xkb;

use crate::input::event::{Event, EventKind};
use crate::input::keymap::ResolvedKeymap;

/// Offset between kernel keycodes and XKB keycodes.
const XKB_KEYCODE_OFFSET: u32 = 8;

pub struct KeyboardDriver {
    state: xkb::State,
}

impl KeyboardDriver {
    pub(crate) fn new(keymap: &ResolvedKeymap) -> Self {
        Self {
            state: keymap.new_state(),
        }
    }

    /// Feed one batch of raw events, appending normalized events to `out`.
    pub fn process(&mut self, events: &[InputEvent], out: &mut Vec<Event>) {
        for ev in events {
            let EventSummary::Key(_, code, value) = ev.destructure() else {
                continue;
            };
            let keycode: xkb::Keycode = (code.code() as u32 + XKB_KEYCODE_OFFSET).into();

            // 0 = release, 1 = press, 2 = kernel auto-repeat. Repeats do
            // not feed the modifier state machine.
            let (pressed, repeat) = match value {
                0 => (false, false),
                1 => (true, false),
                2 => (true, true),
                _ => continue,
            };
            if !repeat {
                let direction = if pressed {
                    xkb::KeyDirection::Down
                } else {
                    xkb::KeyDirection::Up
                };
                let _ = self.state.update_key(keycode, direction);
            }

            let keysym = self.state.key_get_one_sym(keycode);
            let text = if pressed {
                let utf8 = self.state.key_get_utf8(keycode);
                if utf8.is_empty() { None } else { Some(utf8) }
            } else {
                None
            };

            out.push(Event::now(EventKind::Key {
                code: code.code(),
                keysym,
                text,
                pressed,
                repeat,
            }));
        }
    }
}
