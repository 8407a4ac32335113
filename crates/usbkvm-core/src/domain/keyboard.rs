//! Keyboard key buffer: the set of keys the next keyboard report will carry.
//!
//! A boot-protocol keyboard report has room for six regular keys plus a
//! modifier byte.  [`KeyboardKeyBuffer`] mirrors that shape exactly so a
//! snapshot always fits in one report.
//!
//! Released keys are not removed straight away.  The caller sends a report,
//! then calls [`KeyboardKeyBuffer::clear_released`]; until then the key still
//! occupies its slot but is left out of snapshots.

use serde::{Deserialize, Serialize};

use crate::keymap::hid::HidKeyCode;

/// Maximum number of regular (non-modifier) keys in one report.
pub const MAX_PRESSED_KEYS: usize = 6;

/// Pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    Pressed,
    Released,
}

/// The 8-bit modifier byte of a keyboard report.
///
/// Each modifier key owns one bit (see [`HidKeyCode::modifier_bit`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierMask(u8);

impl ModifierMask {
    pub const NONE: ModifierMask = ModifierMask(0);
    pub const CTRL_LEFT: ModifierMask = ModifierMask(0x01);
    pub const SHIFT_LEFT: ModifierMask = ModifierMask(0x02);
    pub const ALT_LEFT: ModifierMask = ModifierMask(0x04);
    pub const META_LEFT: ModifierMask = ModifierMask(0x08);
    pub const CTRL_RIGHT: ModifierMask = ModifierMask(0x10);
    pub const SHIFT_RIGHT: ModifierMask = ModifierMask(0x20);
    pub const ALT_RIGHT: ModifierMask = ModifierMask(0x40);
    pub const META_RIGHT: ModifierMask = ModifierMask(0x80);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: ModifierMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn insert(&mut self, bit: u8) {
        self.0 |= bit;
    }

    fn remove(&mut self, bit: u8) {
        self.0 &= !bit;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyEntry {
    code: HidKeyCode,
    state: KeyState,
}

/// Immutable copy of the pressed keys, handed to the dispatcher by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardSnapshot {
    pub modifiers: ModifierMask,
    /// Pressed regular keys in press order, at most [`MAX_PRESSED_KEYS`].
    pub keys: Vec<HidKeyCode>,
}

impl KeyboardSnapshot {
    /// A report with nothing held.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty() && self.keys.is_empty()
    }
}

/// Ordered set of up to six regular keys plus the modifier mask.
#[derive(Debug, Clone, Default)]
pub struct KeyboardKeyBuffer {
    entries: Vec<KeyEntry>,
    modifiers: ModifierMask,
}

impl KeyboardKeyBuffer {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_PRESSED_KEYS),
            modifiers: ModifierMask::NONE,
        }
    }

    /// Marks `code` as pressed.
    ///
    /// Modifiers set their mask bit.  A regular key already in the buffer is
    /// re-marked pressed in place.  A new regular key is appended unless all
    /// six slots are taken, in which case the press is dropped.
    pub fn press(&mut self, code: HidKeyCode) {
        if code == HidKeyCode::Unknown {
            return;
        }
        if let Some(bit) = code.modifier_bit() {
            self.modifiers.insert(bit);
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.code == code) {
            entry.state = KeyState::Pressed;
            return;
        }
        // Full: new presses are dropped, held keys are never evicted.
        if self.entries.len() >= MAX_PRESSED_KEYS {
            tracing::debug!(key = code.name(), "keyboard buffer full, dropping press");
            return;
        }
        self.entries.push(KeyEntry {
            code,
            state: KeyState::Pressed,
        });
    }

    /// Marks `code` as released.  Releasing a key that was never pressed is a
    /// no-op.
    pub fn release(&mut self, code: HidKeyCode) {
        if let Some(bit) = code.modifier_bit() {
            self.modifiers.remove(bit);
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.code == code) {
            entry.state = KeyState::Released;
        }
    }

    /// Drops every entry currently marked released, freeing its slot.
    pub fn clear_released(&mut self) {
        self.entries.retain(|e| e.state == KeyState::Pressed);
    }

    /// Empties the buffer, modifiers included.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.modifiers = ModifierMask::NONE;
    }

    pub fn key_state(&self, code: HidKeyCode) -> KeyState {
        let pressed = match code.modifier_bit() {
            Some(bit) => self.modifiers.bits() & bit != 0,
            None => self
                .entries
                .iter()
                .any(|e| e.code == code && e.state == KeyState::Pressed),
        };
        if pressed {
            KeyState::Pressed
        } else {
            KeyState::Released
        }
    }

    pub fn modifiers(&self) -> ModifierMask {
        self.modifiers
    }

    /// Number of occupied regular-key slots, released-but-not-cleared included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.modifiers.is_empty()
    }

    pub fn snapshot(&self) -> KeyboardSnapshot {
        KeyboardSnapshot {
            modifiers: self.modifiers,
            keys: self
                .entries
                .iter()
                .filter(|e| e.state == KeyState::Pressed)
                .map(|e| e.code)
                .collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
