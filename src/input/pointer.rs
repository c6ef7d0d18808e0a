//! Pointer driver — relative motion and buttons.
//!
//! Motion deltas accumulate between sync markers and flush as one
//! `PointerMove` per boundary; wheel deltas flush as one `Wheel` the same
//! way. Button transitions are emitted immediately, never batched with
//! motion, so a press cannot be delayed by a busy motion stream.

use evdev::{EventSummary, InputEvent, KeyCode, RelativeAxisCode};

use crate::input::event::{Button, Event, EventKind};

#[derive(Debug, Default)]
pub struct PointerDriver {
    dx: i32,
    dy: i32,
    wheel_dx: i32,
    wheel_dy: i32,
}

impl PointerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one batch of raw events, appending normalized events to `out`.
    pub fn process(&mut self, events: &[InputEvent], out: &mut Vec<Event>) {
        for ev in events {
            match ev.destructure() {
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_X, value) => {
                    self.dx += value;
                }
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_Y, value) => {
                    self.dy += value;
                }
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_WHEEL, value) => {
                    self.wheel_dy += value;
                }
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_HWHEEL, value) => {
                    self.wheel_dx += value;
                }
                EventSummary::Key(_, code, value) => {
                    // Auto-repeat (value 2) on buttons carries no state change.
                    if let (Some(button), 0 | 1) = (map_button(code), value) {
                        out.push(Event::now(EventKind::Button {
                            button,
                            pressed: value == 1,
                        }));
                    }
                }
                EventSummary::Synchronization(_, _, _) => {
                    if self.dx != 0 || self.dy != 0 {
                        out.push(Event::now(EventKind::PointerMove {
                            dx: self.dx,
                            dy: self.dy,
                        }));
                        self.dx = 0;
                        self.dy = 0;
                    }
                    if self.wheel_dx != 0 || self.wheel_dy != 0 {
                        out.push(Event::now(EventKind::Wheel {
                            dx: self.wheel_dx,
                            dy: self.wheel_dy,
                        }));
                        self.wheel_dx = 0;
                        self.wheel_dy = 0;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Map a raw button code to its pointer button.
fn map_button(code: KeyCode) -> Option<Button> {
    match code {
        KeyCode::BTN_LEFT => Some(Button::Left),
        KeyCode::BTN_RIGHT => Some(Button::Right),
        KeyCode::BTN_MIDDLE => Some(Button::Middle),
        KeyCode::BTN_SIDE => Some(Button::Back),
        KeyCode::BTN_EXTRA => Some(Button::Forward),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::{EventType, SynchronizationCode};

    fn rel(code: RelativeAxisCode, value: i32) -> InputEvent {
        InputEvent::new(EventType::RELATIVE.0, code.0, value)
    }

    fn key(code: KeyCode, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY.0, code.code(), value)
    }

    fn syn() -> InputEvent {
        InputEvent::new(
            EventType::SYNCHRONIZATION.0,
            SynchronizationCode::SYN_REPORT.0,
            0,
        )
    }

    #[test]
    fn test_motion_accumulates_until_sync() {
        let mut driver = PointerDriver::new();
        let mut out = Vec::new();

        driver.process(
            &[
                rel(RelativeAxisCode::REL_X, 3),
                rel(RelativeAxisCode::REL_Y, -1),
                rel(RelativeAxisCode::REL_X, 2),
                syn(),
            ],
            &mut out,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::PointerMove { dx: 5, dy: -1 });
    }

    #[test]
    fn test_button_emitted_before_pending_motion() {
        let mut driver = PointerDriver::new();
        let mut out = Vec::new();

        driver.process(
            &[
                rel(RelativeAxisCode::REL_X, 4),
                key(KeyCode::BTN_LEFT, 1),
                syn(),
            ],
            &mut out,
        );

        // The press comes first even though motion arrived earlier.
        assert_eq!(
            out[0].kind,
            EventKind::Button { button: Button::Left, pressed: true }
        );
        assert_eq!(out[1].kind, EventKind::PointerMove { dx: 4, dy: 0 });
    }

    #[test]
    fn test_sync_without_motion_emits_nothing() {
        let mut driver = PointerDriver::new();
        let mut out = Vec::new();
        driver.process(&[syn(), syn()], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_wheel_flushes_on_sync() {
        let mut driver = PointerDriver::new();
        let mut out = Vec::new();

        driver.process(
            &[
                rel(RelativeAxisCode::REL_WHEEL, 1),
                rel(RelativeAxisCode::REL_WHEEL, 1),
                rel(RelativeAxisCode::REL_HWHEEL, -1),
                syn(),
            ],
            &mut out,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Wheel { dx: -1, dy: 2 });
    }

    #[test]
    fn test_release_and_unknown_buttons() {
        let mut driver = PointerDriver::new();
        let mut out = Vec::new();

        driver.process(
            &[
                key(KeyCode::BTN_RIGHT, 0),
                key(KeyCode::KEY_A, 1), // not a pointer button
                syn(),
            ],
            &mut out,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].kind,
            EventKind::Button { button: Button::Right, pressed: false }
        );
    }
}
