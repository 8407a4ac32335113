//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! This is the key representation carried in every keyboard report the
//! HID-emulation chip accepts.  The chip takes one byte per key, so the
//! codes are stored as `u8`.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The **USB Human Interface Device (HID)** standard assigns a number to every
//! key *position* on a keyboard.  Letter A is `0x04`, Enter is `0x28`, Left
//! Ctrl is `0xE0`.  The character a key produces on the target machine depends
//! on its keyboard layout and on the modifier keys held down; the chip only
//! ever reports positions.
//!
//! # Modifier keys
//!
//! The eight modifier keys (`0xE0..=0xE7`) are not sent in the key slots of a
//! boot keyboard report.  Each one owns a bit in the leading modifier byte
//! instead, see [`HidKeyCode::modifier_bit`].
//!
//! # Key names
//!
//! Every variant also has a lower-case name (`"ctrl_left"`, `"a"`, `"f5"`)
//! used by the shortcut table in the configuration file and by the CLI.

use serde::{Deserialize, Serialize};

/// Declares [`HidKeyCode`] together with its numeric and name lookups so the
/// three can never drift apart.
macro_rules! hid_key_table {
    ($( $variant:ident = $code:literal => $name:literal, )*) => {
        /// USB HID Usage ID for keyboard keys (page 0x07).
        ///
        /// [`HidKeyCode::Unknown`] represents any code with no mapping; it is
        /// dropped from outgoing reports.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum HidKeyCode {
            $( $variant = $code, )*
            /// Sentinel for keys with no HID mapping.
            Unknown = 0x00,
        }

        impl HidKeyCode {
            /// Converts a raw HID Usage ID into a [`HidKeyCode`].
            ///
            /// Returns [`HidKeyCode::Unknown`] for unassigned values.
            pub fn from_u8(value: u8) -> Self {
                match value {
                    $( $code => HidKeyCode::$variant, )*
                    _ => HidKeyCode::Unknown,
                }
            }

            /// Returns the canonical lower-case name of this key.
            pub fn name(self) -> &'static str {
                match self {
                    $( HidKeyCode::$variant => $name, )*
                    HidKeyCode::Unknown => "unknown",
                }
            }

            fn from_canonical_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(HidKeyCode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

hid_key_table! {
    KeyA = 0x04 => "a",
    KeyB = 0x05 => "b",
    KeyC = 0x06 => "c",
    KeyD = 0x07 => "d",
    KeyE = 0x08 => "e",
    KeyF = 0x09 => "f",
    KeyG = 0x0A => "g",
    KeyH = 0x0B => "h",
    KeyI = 0x0C => "i",
    KeyJ = 0x0D => "j",
    KeyK = 0x0E => "k",
    KeyL = 0x0F => "l",
    KeyM = 0x10 => "m",
    KeyN = 0x11 => "n",
    KeyO = 0x12 => "o",
    KeyP = 0x13 => "p",
    KeyQ = 0x14 => "q",
    KeyR = 0x15 => "r",
    KeyS = 0x16 => "s",
    KeyT = 0x17 => "t",
    KeyU = 0x18 => "u",
    KeyV = 0x19 => "v",
    KeyW = 0x1A => "w",
    KeyX = 0x1B => "x",
    KeyY = 0x1C => "y",
    KeyZ = 0x1D => "z",
    Digit1 = 0x1E => "1",
    Digit2 = 0x1F => "2",
    Digit3 = 0x20 => "3",
    Digit4 = 0x21 => "4",
    Digit5 = 0x22 => "5",
    Digit6 = 0x23 => "6",
    Digit7 = 0x24 => "7",
    Digit8 = 0x25 => "8",
    Digit9 = 0x26 => "9",
    Digit0 = 0x27 => "0",
    Enter = 0x28 => "enter",
    Escape = 0x29 => "esc",
    Backspace = 0x2A => "backspace",
    Tab = 0x2B => "tab",
    Space = 0x2C => "space",
    Minus = 0x2D => "minus",
    Equal = 0x2E => "equal",
    BracketLeft = 0x2F => "bracket_left",
    BracketRight = 0x30 => "bracket_right",
    Backslash = 0x31 => "backslash",
    Semicolon = 0x33 => "semicolon",
    Quote = 0x34 => "quote",
    Backquote = 0x35 => "backquote",
    Comma = 0x36 => "comma",
    Period = 0x37 => "period",
    Slash = 0x38 => "slash",
    CapsLock = 0x39 => "caps_lock",
    F1 = 0x3A => "f1",
    F2 = 0x3B => "f2",
    F3 = 0x3C => "f3",
    F4 = 0x3D => "f4",
    F5 = 0x3E => "f5",
    F6 = 0x3F => "f6",
    F7 = 0x40 => "f7",
    F8 = 0x41 => "f8",
    F9 = 0x42 => "f9",
    F10 = 0x43 => "f10",
    F11 = 0x44 => "f11",
    F12 = 0x45 => "f12",
    PrintScreen = 0x46 => "print_screen",
    ScrollLock = 0x47 => "scroll_lock",
    Pause = 0x48 => "pause",
    Insert = 0x49 => "insert",
    Home = 0x4A => "home",
    PageUp = 0x4B => "page_up",
    Delete = 0x4C => "delete",
    End = 0x4D => "end",
    PageDown = 0x4E => "page_down",
    ArrowRight = 0x4F => "right",
    ArrowLeft = 0x50 => "left",
    ArrowDown = 0x51 => "down",
    ArrowUp = 0x52 => "up",
    NumLock = 0x53 => "num_lock",
    NumpadDivide = 0x54 => "kp_divide",
    NumpadMultiply = 0x55 => "kp_multiply",
    NumpadSubtract = 0x56 => "kp_minus",
    NumpadAdd = 0x57 => "kp_plus",
    NumpadEnter = 0x58 => "kp_enter",
    Numpad1 = 0x59 => "kp_1",
    Numpad2 = 0x5A => "kp_2",
    Numpad3 = 0x5B => "kp_3",
    Numpad4 = 0x5C => "kp_4",
    Numpad5 = 0x5D => "kp_5",
    Numpad6 = 0x5E => "kp_6",
    Numpad7 = 0x5F => "kp_7",
    Numpad8 = 0x60 => "kp_8",
    Numpad9 = 0x61 => "kp_9",
    Numpad0 = 0x62 => "kp_0",
    NumpadDecimal = 0x63 => "kp_decimal",
    ContextMenu = 0x65 => "win_app",
    ControlLeft = 0xE0 => "ctrl_left",
    ShiftLeft = 0xE1 => "shift_left",
    AltLeft = 0xE2 => "alt_left",
    MetaLeft = 0xE3 => "win_left",
    ControlRight = 0xE4 => "ctrl_right",
    ShiftRight = 0xE5 => "shift_right",
    AltRight = 0xE6 => "alt_right",
    MetaRight = 0xE7 => "win_right",
}

/// One of the three keys whose state the remote host echoes back as an
/// indicator light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockKey {
    NumLock,
    CapsLock,
    ScrollLock,
}

impl LockKey {
    /// The key that toggles this indicator.
    pub fn key_code(self) -> HidKeyCode {
        match self {
            LockKey::NumLock => HidKeyCode::NumLock,
            LockKey::CapsLock => HidKeyCode::CapsLock,
            LockKey::ScrollLock => HidKeyCode::ScrollLock,
        }
    }
}

impl HidKeyCode {
    /// Returns the raw USB HID Usage ID value for this key code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if this is one of the eight modifier keys.
    pub fn is_modifier(self) -> bool {
        matches!(self.as_u8(), 0xE0..=0xE7)
    }

    /// Returns the bit this key owns in the report's modifier byte, or `None`
    /// for regular keys.
    ///
    /// Bit order follows the HID boot protocol: left ctrl/shift/alt/meta in
    /// bits 0-3, right ctrl/shift/alt/meta in bits 4-7.
    pub fn modifier_bit(self) -> Option<u8> {
        if self.is_modifier() {
            Some(1 << (self.as_u8() - 0xE0))
        } else {
            None
        }
    }

    /// Returns the indicator toggled by this key, if any.
    pub fn lock_key(self) -> Option<LockKey> {
        match self {
            HidKeyCode::NumLock => Some(LockKey::NumLock),
            HidKeyCode::CapsLock => Some(LockKey::CapsLock),
            HidKeyCode::ScrollLock => Some(LockKey::ScrollLock),
            _ => None,
        }
    }

    /// Looks up a key by name.
    ///
    /// Accepts the canonical names returned by [`HidKeyCode::name`] (case
    /// insensitive) plus the side-less aliases `ctrl`, `shift`, `alt`, `win`
    /// and `meta`, which resolve to the left-hand key.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "ctrl" | "control" => Some(HidKeyCode::ControlLeft),
            "shift" => Some(HidKeyCode::ShiftLeft),
            "alt" => Some(HidKeyCode::AltLeft),
            "win" | "meta" => Some(HidKeyCode::MetaLeft),
            "escape" => Some(HidKeyCode::Escape),
            "return" => Some(HidKeyCode::Enter),
            other => Self::from_canonical_name(other),
        }
    }
}
