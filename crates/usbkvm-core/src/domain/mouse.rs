//! Mouse state buffer: buttons, wheel and pointer position awaiting the next
//! mouse report.
//!
//! The pointer is either an absolute point normalized to `[0, 1]` on both
//! axes, or a pending relative delta that grows with every motion sample until
//! a report is sent and [`MouseStateBuffer::clear_point`] resets it.

use serde::{Deserialize, Serialize};

/// The five buttons a CH9329 mouse report can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Extra1,
    Extra2,
}

impl MouseButton {
    /// Bit owned by this button in the report's button byte.
    pub fn bit(self) -> u8 {
        match self {
            MouseButton::Left => 0x01,
            MouseButton::Right => 0x02,
            MouseButton::Middle => 0x04,
            MouseButton::Extra1 => 0x08,
            MouseButton::Extra2 => 0x10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Button byte of a mouse report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const NONE: ButtonMask = ButtonMask(0);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_pressed(self, button: MouseButton) -> bool {
        self.0 & button.bit() != 0
    }

    fn set(&mut self, button: MouseButton, state: ButtonState) {
        match state {
            ButtonState::Pressed => self.0 |= button.bit(),
            ButtonState::Released => self.0 &= !button.bit(),
        }
    }
}

/// One-shot wheel motion for the next report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelState {
    Up,
    Down,
    #[default]
    Neutral,
}

/// Where the pointer should go in the next report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerPosition {
    /// Normalized coordinates, both in `[0, 1]`.
    Absolute { x: f64, y: f64 },
    /// Accumulated motion since the last report, in device counts.
    Relative { dx: i32, dy: i32 },
}

impl Default for PointerPosition {
    fn default() -> Self {
        PointerPosition::Absolute { x: 0.0, y: 0.0 }
    }
}

/// Immutable copy of the mouse state, handed to the dispatcher by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MouseSnapshot {
    pub buttons: ButtonMask,
    pub wheel: WheelState,
    pub point: PointerPosition,
}

impl MouseSnapshot {
    /// All buttons up, wheel still, pointer at the origin.
    pub fn released() -> Self {
        Self::default()
    }

    /// The absolute point, or `(0, 0)` when the buffer held a relative delta.
    pub fn absolute_point(&self) -> (f64, f64) {
        match self.point {
            PointerPosition::Absolute { x, y } => (x, y),
            PointerPosition::Relative { .. } => (0.0, 0.0),
        }
    }

    /// The relative delta, or `(0, 0)` when the buffer held an absolute point.
    pub fn relative_delta(&self) -> (i32, i32) {
        match self.point {
            PointerPosition::Relative { dx, dy } => (dx, dy),
            PointerPosition::Absolute { .. } => (0, 0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MouseStateBuffer {
    buttons: ButtonMask,
    wheel: WheelState,
    point: PointerPosition,
    dirty: bool,
}

impl MouseStateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_button(&mut self, button: MouseButton, state: ButtonState) {
        self.buttons.set(button, state);
        self.dirty = true;
    }

    /// Sets an absolute point; values outside `[0, 1]` are clamped.
    pub fn set_point_absolute(&mut self, x: f64, y: f64) {
        self.point = PointerPosition::Absolute {
            x: clamp_unit(x),
            y: clamp_unit(y),
        };
        self.dirty = true;
    }

    /// Adds `(dx, dy)` to the pending relative delta.  An absolute point, if
    /// any, is replaced.
    pub fn set_point_relative_delta(&mut self, dx: i32, dy: i32) {
        self.point = match self.point {
            PointerPosition::Relative { dx: px, dy: py } => PointerPosition::Relative {
                dx: px.saturating_add(dx),
                dy: py.saturating_add(dy),
            },
            PointerPosition::Absolute { .. } => PointerPosition::Relative { dx, dy },
        };
        self.dirty = true;
    }

    /// Discards a pending relative delta.  An absolute point is left alone.
    pub fn clear_point(&mut self) {
        if let PointerPosition::Relative { .. } = self.point {
            self.point = PointerPosition::Relative { dx: 0, dy: 0 };
        }
    }

    pub fn set_wheel(&mut self, state: WheelState) {
        self.wheel = state;
        self.dirty = true;
    }

    pub fn clear_wheel(&mut self) {
        self.wheel = WheelState::Neutral;
    }

    pub fn clear_button(&mut self) {
        self.buttons = ButtonMask::NONE;
    }

    /// Releases every button, stops the wheel, drops any relative delta and
    /// marks the buffer clean.
    pub fn clear(&mut self) {
        self.clear_button();
        self.clear_wheel();
        self.clear_point();
        self.dirty = false;
    }

    pub fn buttons(&self) -> ButtonMask {
        self.buttons
    }

    pub fn wheel(&self) -> WheelState {
        self.wheel
    }

    pub fn point(&self) -> PointerPosition {
        self.point
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn snapshot(&self) -> MouseSnapshot {
        MouseSnapshot {
            buttons: self.buttons,
            wheel: self.wheel,
            point: self.point,
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_deltas_accumulate_until_cleared() {
        // Arrange
        let mut buffer = MouseStateBuffer::new();

        // Act
        buffer.set_point_relative_delta(2, 3);
        buffer.set_point_relative_delta(-1, 1);

        // Assert
        assert_eq!(buffer.snapshot().relative_delta(), (1, 4));
        buffer.clear_point();
        assert_eq!(buffer.snapshot().relative_delta(), (0, 0));
    }

    #[test]
    fn test_clear_point_keeps_absolute_point() {
        let mut buffer = MouseStateBuffer::new();
        buffer.set_point_absolute(0.25, 0.75);
        buffer.clear_point();
        assert_eq!(buffer.snapshot().absolute_point(), (0.25, 0.75));
    }

    #[test]
    fn test_absolute_point_is_clamped() {
        let mut buffer = MouseStateBuffer::new();
        buffer.set_point_absolute(-0.5, 1.5);
        assert_eq!(buffer.snapshot().absolute_point(), (0.0, 1.0));
        buffer.set_point_absolute(f64::NAN, 0.5);
        assert_eq!(buffer.snapshot().absolute_point(), (0.0, 0.5));
    }

    #[test]
    fn test_buttons_are_independent_bits() {
        // Arrange
        let mut buffer = MouseStateBuffer::new();

        // Act
        buffer.set_button(MouseButton::Left, ButtonState::Pressed);
        buffer.set_button(MouseButton::Extra2, ButtonState::Pressed);
        buffer.set_button(MouseButton::Left, ButtonState::Released);

        // Assert
        let buttons = buffer.buttons();
        assert!(!buttons.is_pressed(MouseButton::Left));
        assert!(buttons.is_pressed(MouseButton::Extra2));
        assert_eq!(buttons.bits(), 0x10);
    }

    #[test]
    fn test_dirty_flag_tracks_changes() {
        let mut buffer = MouseStateBuffer::new();
        assert!(!buffer.is_dirty());
        buffer.set_wheel(WheelState::Up);
        assert!(buffer.is_dirty());
        buffer.mark_clean();
        assert!(!buffer.is_dirty());
        buffer.set_point_relative_delta(1, 0);
        assert!(buffer.is_dirty());
    }

    #[test]
    fn test_clear_resets_buttons_wheel_and_delta() {
        let mut buffer = MouseStateBuffer::new();
        buffer.set_button(MouseButton::Middle, ButtonState::Pressed);
        buffer.set_wheel(WheelState::Down);
        buffer.set_point_relative_delta(5, 5);

        buffer.clear();

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.buttons, ButtonMask::NONE);
        assert_eq!(snapshot.wheel, WheelState::Neutral);
        assert_eq!(snapshot.relative_delta(), (0, 0));
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn test_absolute_write_after_relative_replaces_kind() {
        let mut buffer = MouseStateBuffer::new();
        buffer.set_point_relative_delta(3, 3);
        buffer.set_point_absolute(0.5, 0.5);
        assert_eq!(buffer.snapshot().relative_delta(), (0, 0));
        assert_eq!(buffer.snapshot().absolute_point(), (0.5, 0.5));
    }
}
