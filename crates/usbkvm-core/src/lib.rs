//! # usbkvm-core
//!
//! Shared library for USB-KVM containing the input buffers, pointer geometry,
//! key tables and the CH9329 frame codec.
//!
//! It performs no I/O of its own: no serial ports, threads or timers.  The
//! `usbkvm-client` crate wires these pieces to a real chip.
//!
//! # Architecture overview (for beginners)
//!
//! USB-KVM drives a remote computer through a small USB "HID emulation" chip
//! (the WCH CH9329).  The local machine talks to the chip over a serial line;
//! the chip shows up on the remote machine as an ordinary USB keyboard and
//! mouse.
//!
//! This crate defines:
//!
//! - **`keymap`**: USB HID Usage IDs, key names and the ASCII table used to
//!   type text.
//!
//! - **`domain`**: the keyboard, mouse and indicator buffers that collect
//!   local input, plus the viewport geometry that turns a local pointer
//!   position into remote coordinates.
//!
//! - **`protocol`**: the commands queued for the chip, the replies they
//!   produce, and the byte-level CH9329 frame format.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `usbkvm_core::KeyboardKeyBuffer` instead of the full module path.
pub use domain::geometry::{
    letterbox, AbsoluteMapper, Letterbox, Point, RelativeSample, RelativeTracker, Resolution,
    Viewport, RECENTER_THRESHOLD,
};
pub use domain::indicator::{IndicatorBuffer, IndicatorReport};
pub use domain::keyboard::{
    KeyState, KeyboardKeyBuffer, KeyboardSnapshot, ModifierMask, MAX_PRESSED_KEYS,
};
pub use domain::mouse::{
    ButtonMask, ButtonState, MouseButton, MouseSnapshot, MouseStateBuffer, PointerPosition,
    WheelState,
};
pub use keymap::hid::{HidKeyCode, LockKey};
pub use keymap::{expand_text, resolve_key_names, Keystroke};
pub use protocol::ch9329::ProtocolError;
pub use protocol::command::{
    Command, CommandName, CommandReply, PointerMode, ReleaseTarget, ReplyData, Status,
};
