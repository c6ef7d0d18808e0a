//! Touch driver — multitouch contact tracking.
//!
//! Supports both kernel multitouch protocols:
//!
//! - **Stateful (type B)**: the device maintains slots; contacts are
//!   addressed by slot number and lifted with a tracking id of -1.
//! - **Stateless (type A)**: contacts are re-reported every frame, each
//!   terminated by an MT-sync marker; contacts are assigned ascending
//!   slots within the frame and anything unreported at frame end is
//!   lifted.
//!
//! Single-point devices that only report plain absolute axes map onto
//! slot 0, with the touch button signalling contact.
//!
//! Coordinates are scaled from the device's reported axis range into the
//! surface's pixel geometry. Phase events (Down/Move/Up) are derived per
//! slot at each frame boundary; a lift for a slot that never went down is
//! a protocol artifact and produces nothing.

use evdev::{AbsInfo, AbsoluteAxisCode, Device, EventSummary, InputEvent, KeyCode, SynchronizationCode};

use crate::input::event::{Event, EventKind, TouchPhase};

/// Hardware contact slots tracked per device.
const MAX_SLOTS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    active: bool,
    x: i32,
    y: i32,
    /// Whether a Down has been emitted and not yet closed with an Up.
    down_sent: bool,
    /// Last emitted surface position, to suppress no-move frames.
    last_emit: Option<(i32, i32)>,
}

pub struct TouchDriver {
    slots: [Slot; MAX_SLOTS],
    current: usize,
    stateful: bool,
    /// Stateless protocol: an MT-sync was seen this frame.
    mt_report_seen: bool,
    /// Stateless protocol: coordinate data seen since the last MT-sync,
    /// so an empty report (all contacts lifted) does not advance the slot.
    contact_data_seen: bool,
    x_range: Option<AbsInfo>,
    y_range: Option<AbsInfo>,
    screen: (u32, u32),
}

impl TouchDriver {
    /// Probe `device` for protocol and axis ranges.
    pub(crate) fn from_device(device: &Device, screen: (u32, u32)) -> Self {
        let stateful = device
            .supported_absolute_axes()
            .is_some_and(|axes| axes.contains(AbsoluteAxisCode::ABS_MT_SLOT));

        let mut x_range = None;
        let mut y_range = None;
        if let Ok(axes) = device.get_absinfo() {
            for (code, info) in axes {
                match code {
                    AbsoluteAxisCode::ABS_X | AbsoluteAxisCode::ABS_MT_POSITION_X => {
                        x_range = Some(info);
                    }
                    AbsoluteAxisCode::ABS_Y | AbsoluteAxisCode::ABS_MT_POSITION_Y => {
                        y_range = Some(info);
                    }
                    _ => {}
                }
            }
        }

        Self::new(stateful, x_range, y_range, screen)
    }

    fn new(
        stateful: bool,
        x_range: Option<AbsInfo>,
        y_range: Option<AbsInfo>,
        screen: (u32, u32),
    ) -> Self {
        Self {
            slots: [Slot::default(); MAX_SLOTS],
            current: 0,
            stateful,
            mt_report_seen: false,
            contact_data_seen: false,
            x_range,
            y_range,
            screen,
        }
    }

    /// Feed one batch of raw events, appending normalized events to `out`.
    pub fn process(&mut self, events: &[InputEvent], out: &mut Vec<Event>) {
        for ev in events {
            match ev.destructure() {
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_SLOT, value) => {
                    if (0..MAX_SLOTS as i32).contains(&value) {
                        self.current = value as usize;
                    }
                }
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_TRACKING_ID, value) => {
                    self.slots[self.current].active = value != -1;
                }
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_POSITION_X, value) => {
                    self.slots[self.current].x = value;
                    if !self.stateful {
                        self.slots[self.current].active = true;
                        self.contact_data_seen = true;
                    }
                }
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_POSITION_Y, value) => {
                    self.slots[self.current].y = value;
                    if !self.stateful {
                        self.slots[self.current].active = true;
                        self.contact_data_seen = true;
                    }
                }
                // Legacy single-touch axes map onto slot 0. Stateful
                // devices mirror these for old clients; ignore there.
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_X, value) if !self.stateful => {
                    self.slots[0].x = value;
                }
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_Y, value) if !self.stateful => {
                    self.slots[0].y = value;
                }
                EventSummary::Key(_, KeyCode::BTN_TOUCH, value) if !self.stateful => {
                    if value == 1 {
                        self.slots[0].active = true;
                    } else if value == 0 && !self.mt_report_seen {
                        // Single-touch lift. Stateless MT lifts are handled
                        // at frame end instead.
                        for slot in &mut self.slots {
                            slot.active = false;
                        }
                    }
                }
                EventSummary::Synchronization(_, SynchronizationCode::SYN_MT_REPORT, _) => {
                    if !self.stateful {
                        self.mt_report_seen = true;
                        if self.contact_data_seen {
                            self.contact_data_seen = false;
                            if self.current < MAX_SLOTS - 1 {
                                self.current += 1;
                            }
                        }
                    }
                }
                EventSummary::Synchronization(_, SynchronizationCode::SYN_REPORT, _) => {
                    if self.mt_report_seen {
                        // Contacts not re-reported this frame are gone.
                        for slot in &mut self.slots[self.current..] {
                            slot.active = false;
                        }
                        self.current = 0;
                        self.mt_report_seen = false;
                    }
                    self.emit_frame(out);
                }
                _ => {}
            }
        }
    }

    /// Derive per-slot phase transitions at a frame boundary.
    fn emit_frame(&mut self, out: &mut Vec<Event>) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let pos = (
                scale_axis(slot.x, self.x_range.as_ref(), self.screen.0),
                scale_axis(slot.y, self.y_range.as_ref(), self.screen.1),
            );
            if slot.active && !slot.down_sent {
                slot.down_sent = true;
                slot.last_emit = Some(pos);
                out.push(Event::now(EventKind::Touch {
                    slot: index as u32,
                    x: pos.0,
                    y: pos.1,
                    phase: TouchPhase::Down,
                }));
            } else if slot.active && slot.last_emit != Some(pos) {
                slot.last_emit = Some(pos);
                out.push(Event::now(EventKind::Touch {
                    slot: index as u32,
                    x: pos.0,
                    y: pos.1,
                    phase: TouchPhase::Move,
                }));
            } else if !slot.active && slot.down_sent {
                let (x, y) = slot.last_emit.unwrap_or(pos);
                slot.down_sent = false;
                slot.last_emit = None;
                out.push(Event::now(EventKind::Touch {
                    slot: index as u32,
                    x,
                    y,
                    phase: TouchPhase::Up,
                }));
            }
        }
    }
}

/// Map a raw axis value into `[0, screen)` using the device's range.
///
/// Devices that report no range information pass values through
/// unscaled, clamped to the surface.
fn scale_axis(value: i32, range: Option<&AbsInfo>, screen: u32) -> i32 {
    let max_pixel = screen.saturating_sub(1) as i32;
    if let Some(info) = range {
        let span = (info.maximum() - info.minimum()) as f64;
        if span > 0.0 {
            let normalized = (value - info.minimum()) as f64 / span;
            return ((normalized * max_pixel as f64).round() as i32).clamp(0, max_pixel);
        }
    }
    value.clamp(0, max_pixel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    const SCREEN: (u32, u32) = (800, 480);

    fn abs(code: AbsoluteAxisCode, value: i32) -> InputEvent {
        InputEvent::new(EventType::ABSOLUTE.0, code.0, value)
    }

    fn syn(code: SynchronizationCode) -> InputEvent {
        InputEvent::new(EventType::SYNCHRONIZATION.0, code.0, 0)
    }

    fn key(code: KeyCode, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY.0, code.code(), value)
    }

    fn touches(out: &[Event]) -> Vec<(u32, TouchPhase)> {
        out.iter()
            .filter_map(|e| match e.kind {
                EventKind::Touch { slot, phase, .. } => Some((slot, phase)),
                _ => None,
            })
            .collect()
    }

    fn full_range_driver(stateful: bool) -> TouchDriver {
        // Axis range matching the screen, so coordinates pass through.
        let x = AbsInfo::new(0, 0, 799, 0, 0, 0);
        let y = AbsInfo::new(0, 0, 479, 0, 0, 0);
        TouchDriver::new(stateful, Some(x), Some(y), SCREEN)
    }

    #[test]
    fn test_stateful_down_move_up_on_slot_3() {
        let mut driver = full_range_driver(true);
        let mut out = Vec::new();

        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_SLOT, 3),
                abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 77),
                abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 100),
                abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 200),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );
        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 140),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );
        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, -1),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );

        assert_eq!(
            touches(&out),
            vec![
                (3, TouchPhase::Down),
                (3, TouchPhase::Move),
                (3, TouchPhase::Up),
            ]
        );
    }

    #[test]
    fn test_lift_without_down_is_ignored() {
        let mut driver = full_range_driver(true);
        let mut out = Vec::new();

        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_SLOT, 2),
                abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, -1),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );

        assert!(touches(&out).is_empty());
    }

    #[test]
    fn test_stationary_contact_emits_no_move() {
        let mut driver = full_range_driver(true);
        let mut out = Vec::new();

        let frame = [
            abs(AbsoluteAxisCode::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 50),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 60),
            syn(SynchronizationCode::SYN_REPORT),
        ];
        driver.process(&frame, &mut out);
        // Same position re-reported: no event.
        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 50),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );

        assert_eq!(touches(&out), vec![(0, TouchPhase::Down)]);
    }

    #[test]
    fn test_stateless_frame_cycle() {
        let mut driver = full_range_driver(false);
        let mut out = Vec::new();

        // Two contacts reported, each closed by an MT-sync.
        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 10),
                abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 20),
                syn(SynchronizationCode::SYN_MT_REPORT),
                abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 300),
                abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 400),
                syn(SynchronizationCode::SYN_MT_REPORT),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );
        assert_eq!(
            touches(&out),
            vec![(0, TouchPhase::Down), (1, TouchPhase::Down)]
        );
        out.clear();

        // Next frame reports only the first contact: the second lifts.
        driver.process(
            &[
                abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 12),
                abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 20),
                syn(SynchronizationCode::SYN_MT_REPORT),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );
        assert_eq!(
            touches(&out),
            vec![(0, TouchPhase::Move), (1, TouchPhase::Up)]
        );
        out.clear();

        // Empty report: everything lifts.
        driver.process(
            &[
                syn(SynchronizationCode::SYN_MT_REPORT),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );
        assert_eq!(touches(&out), vec![(0, TouchPhase::Up)]);
    }

    #[test]
    fn test_single_touch_button_lift() {
        let mut driver = full_range_driver(false);
        let mut out = Vec::new();

        driver.process(
            &[
                key(KeyCode::BTN_TOUCH, 1),
                abs(AbsoluteAxisCode::ABS_X, 400),
                abs(AbsoluteAxisCode::ABS_Y, 240),
                syn(SynchronizationCode::SYN_REPORT),
            ],
            &mut out,
        );
        driver.process(
            &[key(KeyCode::BTN_TOUCH, 0), syn(SynchronizationCode::SYN_REPORT)],
            &mut out,
        );

        assert_eq!(
            touches(&out),
            vec![(0, TouchPhase::Down), (0, TouchPhase::Up)]
        );
        // Coordinates passed through the matching range unscaled.
        match out[0].kind {
            EventKind::Touch { x, y, .. } => {
                assert_eq!((x, y), (400, 240));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_axis_scaling_into_surface() {
        // Device range 0..4095 onto an 800-wide surface.
        let info = AbsInfo::new(0, 0, 4095, 0, 0, 0);
        assert_eq!(scale_axis(0, Some(&info), 800), 0);
        assert_eq!(scale_axis(4095, Some(&info), 800), 799);
        assert_eq!(scale_axis(2048, Some(&info), 800), 400);
        // Without range information, values clamp to the surface.
        assert_eq!(scale_axis(5000, None, 800), 799);
        assert_eq!(scale_axis(-3, None, 800), 0);
    }
}
