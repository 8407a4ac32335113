//! InputTranslator: turns local input events into queued device commands.
//!
//! This use case owns the keyboard and mouse buffers.  Each event mutates a
//! buffer and, where the device must hear about it immediately (keys,
//! buttons, wheel), queues a snapshot.  Pointer motion only marks the mouse
//! buffer dirty; [`InputTranslator::flush_mouse`] sends it on a timer so fast
//! motion coalesces into one report per tick.
//!
//! # Architecture
//!
//! Like the other use cases this depends only on traits and handles:
//! [`CursorController`] for the local pointer, [`DispatcherHandle`] for the
//! queue.  Tests inject a mock cursor and a detached handle and inspect the
//! queued commands directly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use usbkvm_core::{
    expand_text, resolve_key_names, AbsoluteMapper, ButtonState, Command, HidKeyCode, KeyState,
    KeyboardKeyBuffer, LockKey, MouseButton, MouseStateBuffer, Point, PointerMode,
    RelativeTracker, ReleaseTarget, Resolution, Viewport, WheelState,
};

use crate::application::dispatcher::{DispatchError, DispatcherHandle};
use crate::application::indicator_sync::IndicatorSync;

/// Wheel delta reported by one notch of a standard mouse wheel.
pub const WHEEL_NOTCH: i32 = 120;

/// Trait for controlling the local pointer while it is captured.
///
/// The desktop implementation warps the real cursor; the headless binary uses
/// [`DetachedCursor`].
#[cfg_attr(test, mockall::automock)]
pub trait CursorController: Send + Sync {
    /// Teleports the local cursor to (x, y) in screen coordinates.
    fn teleport_cursor(&self, x: i32, y: i32);

    /// Returns the current local cursor position in screen coordinates.
    fn get_cursor_pos(&self) -> (i32, i32);
}

/// Cursor controller for sessions with no local pointer to capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedCursor;

impl CursorController for DetachedCursor {
    fn teleport_cursor(&self, _x: i32, _y: i32) {}

    fn get_cursor_pos(&self) -> (i32, i32) {
        (0, 0)
    }
}

/// Maps a vertical wheel delta onto the one-shot wheel state.
///
/// A positive notch maps to [`WheelState::Down`] and a negative one to
/// [`WheelState::Up`], the reverse of the usual convention.  Only exact
/// single notches move the wheel; any other delta stops it.
pub fn wheel_state_for_delta(delta_y: i32) -> WheelState {
    match delta_y {
        WHEEL_NOTCH => WheelState::Down,
        d if d == -WHEEL_NOTCH => WheelState::Up,
        _ => WheelState::Neutral,
    }
}

/// Tunables for [`InputTranslator`].
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorSettings {
    /// Remote screen size, for aspect-ratio letterboxing.
    pub target: Resolution,
    pub keep_aspect_ratio: bool,
    /// Pixel correction added to the viewport origin in absolute mode.
    pub cursor_offset: Option<Point>,
    /// Multiplier applied to relative motion.
    pub relative_speed: f64,
    /// Pause after each typed character.
    pub paste_interval: Duration,
    /// How long a shortcut chord is held before release.
    pub shortcut_hold: Duration,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            target: Resolution::new(1920, 1080),
            keep_aspect_ratio: true,
            cursor_offset: None,
            relative_speed: 1.0,
            paste_interval: Duration::from_millis(10),
            shortcut_hold: Duration::from_millis(50),
        }
    }
}

/// The input-translation use case.
pub struct InputTranslator {
    keyboard: KeyboardKeyBuffer,
    mouse: MouseStateBuffer,
    indicators: IndicatorSync,
    dispatcher: DispatcherHandle,
    cursor: Arc<dyn CursorController>,
    mapper: AbsoluteMapper,
    tracker: RelativeTracker,
    mode: PointerMode,
    viewport: Viewport,
    capture_center: Option<Point>,
    paste_interval: Duration,
    shortcut_hold: Duration,
}

impl InputTranslator {
    pub fn new(
        dispatcher: DispatcherHandle,
        cursor: Arc<dyn CursorController>,
        settings: TranslatorSettings,
    ) -> Self {
        let mut mapper = AbsoluteMapper::new(settings.target, settings.keep_aspect_ratio);
        mapper.cursor_offset = settings.cursor_offset;
        Self {
            keyboard: KeyboardKeyBuffer::new(),
            mouse: MouseStateBuffer::new(),
            indicators: IndicatorSync::new(dispatcher.clone()),
            dispatcher,
            cursor,
            mapper,
            tracker: RelativeTracker::new(settings.relative_speed),
            mode: PointerMode::Absolute,
            viewport: Viewport::new(
                0.0,
                0.0,
                f64::from(settings.target.width),
                f64::from(settings.target.height),
            ),
            capture_center: None,
            paste_interval: settings.paste_interval,
            shortcut_hold: settings.shortcut_hold,
        }
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    /// Handles a local key press.
    ///
    /// Lock keys flip the matching indicator immediately and are sent as a
    /// full tap; the chip only reports the real state on the next refresh.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn key_press(&mut self, code: HidKeyCode) -> Result<(), DispatchError> {
        match code.lock_key() {
            Some(lock) => self.tap_lock(lock),
            None => self.update_key(code, KeyState::Pressed),
        }
    }

    /// Handles a local key release.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn key_release(&mut self, code: HidKeyCode) -> Result<(), DispatchError> {
        self.update_key(code, KeyState::Released)
    }

    fn update_key(&mut self, code: HidKeyCode, state: KeyState) -> Result<(), DispatchError> {
        match state {
            KeyState::Pressed => self.keyboard.press(code),
            KeyState::Released => self.keyboard.release(code),
        }
        let result = self
            .dispatcher
            .submit(Command::KeyboardWrite(self.keyboard.snapshot()));
        self.keyboard.clear_released();
        result
    }

    fn tap_lock(&mut self, lock: LockKey) -> Result<(), DispatchError> {
        self.indicators.toggle(lock);
        let code = lock.key_code();
        self.update_key(code, KeyState::Pressed)?;
        self.update_key(code, KeyState::Released)
    }

    fn tap(&mut self, code: HidKeyCode, shift: bool) -> Result<(), DispatchError> {
        if shift {
            self.update_key(HidKeyCode::ShiftLeft, KeyState::Pressed)?;
        }
        self.update_key(code, KeyState::Pressed)?;
        self.update_key(code, KeyState::Released)?;
        if shift {
            self.update_key(HidKeyCode::ShiftLeft, KeyState::Released)?;
        }
        Ok(())
    }

    /// Types `text` on the remote host, one character tap at a time.
    ///
    /// Caps Lock is switched off first if the cache says it is on.
    /// Characters with no key are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn type_text(&mut self, text: &str) -> Result<(), DispatchError> {
        let caps_on = self.indicators.is_on(LockKey::CapsLock);
        let strokes = expand_text(text, caps_on);
        debug!(chars = text.len(), strokes = strokes.len(), "typing text");

        for stroke in strokes {
            if stroke.key == HidKeyCode::CapsLock {
                self.tap_lock(LockKey::CapsLock)?;
                continue;
            }
            self.tap(stroke.key, stroke.shift)?;
            if !self.paste_interval.is_zero() {
                tokio::time::sleep(self.paste_interval).await;
            }
        }
        Ok(())
    }

    /// Presses `keys` in order, holds them briefly, then releases in order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn send_shortcut(&mut self, keys: &[HidKeyCode]) -> Result<(), DispatchError> {
        if keys.is_empty() {
            warn!("empty shortcut, nothing to send");
            return Ok(());
        }
        for key in keys {
            self.update_key(*key, KeyState::Pressed)?;
        }
        tokio::time::sleep(self.shortcut_hold).await;
        for key in keys {
            self.update_key(*key, KeyState::Released)?;
        }
        Ok(())
    }

    /// [`InputTranslator::send_shortcut`] for key names such as
    /// `["ctrl", "alt", "delete"]`.  Unknown names are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn send_key_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), DispatchError> {
        let keys = resolve_key_names(names);
        self.send_shortcut(&keys).await
    }

    /// Empties the key buffer and tells the chip nothing is held.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn clear_keyboard(&mut self) -> Result<(), DispatchError> {
        self.keyboard.clear();
        self.dispatcher
            .submit(Command::KeyboardWrite(self.keyboard.snapshot()))
    }

    // ── Mouse ─────────────────────────────────────────────────────────────────

    /// Handles a button press or release and writes it out immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn mouse_button(
        &mut self,
        button: MouseButton,
        state: ButtonState,
    ) -> Result<(), DispatchError> {
        self.mouse.set_button(button, state);
        if self.mode == PointerMode::Relative {
            self.mouse.clear_point();
        }
        let result = self.submit_mouse();
        self.mouse.mark_clean();
        result
    }

    /// Handles a vertical wheel event.  The wheel is reset to neutral right
    /// after the write, so each notch produces one report.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn wheel(&mut self, delta_y: i32) -> Result<(), DispatchError> {
        self.mouse.set_wheel(wheel_state_for_delta(delta_y));
        let result = self.submit_mouse();
        if self.mode == PointerMode::Relative {
            self.mouse.clear_point();
        }
        self.mouse.clear_wheel();
        self.mouse.mark_clean();
        result
    }

    /// Records local pointer motion.
    ///
    /// In absolute mode `pointer` is mapped through the viewport.  In
    /// relative mode the live cursor position is sampled instead, and the
    /// cursor is warped back to the capture centre when it strays.
    pub fn pointer_moved(&mut self, pointer: Point) {
        match self.mode {
            PointerMode::Absolute => {
                let (x, y) = self.mapper.normalize(&self.viewport, pointer);
                self.mouse.set_point_absolute(x, y);
            }
            PointerMode::Relative => {
                let center = self.capture_center();
                let (cx, cy) = self.cursor.get_cursor_pos();
                let sample = self
                    .tracker
                    .sample(Point::new(f64::from(cx), f64::from(cy)), center);
                if sample.seeded {
                    self.mouse.clear_point();
                } else {
                    self.mouse
                        .set_point_relative_delta(sample.delta.0, sample.delta.1);
                }
                if sample.recenter {
                    self.cursor
                        .teleport_cursor(center.x.round() as i32, center.y.round() as i32);
                }
            }
        }
    }

    /// Sends the mouse state if it changed since the last report.
    ///
    /// Called on the mouse report timer.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub fn flush_mouse(&mut self) -> Result<(), DispatchError> {
        if !self.mouse.is_dirty() {
            return Ok(());
        }
        let result = self.submit_mouse();
        if self.mode == PointerMode::Relative {
            self.mouse.clear_point();
        }
        if self.mouse.wheel() != WheelState::Neutral {
            self.mouse.clear_wheel();
        }
        self.mouse.mark_clean();
        result
    }

    fn submit_mouse(&self) -> Result<(), DispatchError> {
        self.dispatcher
            .submit(self.mode.write_command(self.mouse.snapshot()))
    }

    // ── State ─────────────────────────────────────────────────────────────────

    /// Clears the local buffers covered by `target`, without queuing anything.
    pub fn clear_buffers(&mut self, target: ReleaseTarget) {
        if target.includes_keyboard() {
            self.keyboard.clear();
        }
        if target.includes_mouse() {
            self.mouse.clear();
        }
    }

    pub fn set_pointer_mode(&mut self, mode: PointerMode) {
        if mode != self.mode {
            debug!(?mode, "pointer mode changed");
            self.mode = mode;
            self.tracker.reset();
            self.mouse.clear_point();
        }
    }

    pub fn pointer_mode(&self) -> PointerMode {
        self.mode
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Overrides the point the cursor is warped back to in relative mode.
    /// Defaults to the viewport centre.
    pub fn set_capture_center(&mut self, center: Point) {
        self.capture_center = Some(center);
    }

    fn capture_center(&self) -> Point {
        self.capture_center
            .unwrap_or_else(|| self.viewport.center())
    }

    pub fn keyboard(&self) -> &KeyboardKeyBuffer {
        &self.keyboard
    }

    pub fn mouse(&self) -> &MouseStateBuffer {
        &self.mouse
    }

    pub fn indicators(&self) -> &IndicatorSync {
        &self.indicators
    }

    pub fn indicators_mut(&mut self) -> &mut IndicatorSync {
        &mut self.indicators
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
