//! Text and key-name translation into HID key strokes.
//!
//! The chip only understands key *positions* (see [`hid`]).  Typing a string
//! on the remote host therefore means turning every character into the key
//! that produces it on a US layout, plus a Shift press where needed.
//!
//! # How pasting works (for beginners)
//!
//! `expand_text("Hi!", false)` yields three [`Keystroke`]s:
//!
//! ```text
//! H -> KeyH + shift
//! i -> KeyI
//! ! -> Digit1 + shift
//! ```
//!
//! The caller taps each stroke (press, report, release, report).  If Caps Lock
//! is on at the remote end, `H` would come out lower-case, so a single
//! CapsLock stroke is emitted first to switch it off.

pub mod hid;

pub use hid::{HidKeyCode, LockKey};

use tracing::warn;

/// Characters that are typed with Shift held on a US layout, besides the
/// upper-case letters.
pub const SHIFT_SYMBOLS: &str = "~!@#$%^&*()_+{}|:\"<>?";

/// One key tap produced by text expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub key: HidKeyCode,
    pub shift: bool,
}

impl Keystroke {
    pub fn plain(key: HidKeyCode) -> Self {
        Self { key, shift: false }
    }

    pub fn shifted(key: HidKeyCode) -> Self {
        Self { key, shift: true }
    }
}

/// Returns `true` if typing `c` needs Shift held.
pub fn requires_shift(c: char) -> bool {
    c.is_ascii_uppercase() || SHIFT_SYMBOLS.contains(c)
}

/// Maps an ASCII character to the key that produces it on a US layout.
///
/// Shifted characters map to their unshifted key position (`'A'` → `KeyA`,
/// `'!'` → `Digit1`); use [`requires_shift`] to decide on the Shift press.
/// Returns `None` for characters with no key (control characters, `\r`).
pub fn ascii_to_key(c: char) -> Option<HidKeyCode> {
    let key = match c {
        'a'..='z' => HidKeyCode::from_u8(0x04 + (c as u8 - b'a')),
        'A'..='Z' => HidKeyCode::from_u8(0x04 + (c as u8 - b'A')),
        '1'..='9' => HidKeyCode::from_u8(0x1E + (c as u8 - b'1')),
        '0' | ')' => HidKeyCode::Digit0,
        '!' => HidKeyCode::Digit1,
        '@' => HidKeyCode::Digit2,
        '#' => HidKeyCode::Digit3,
        '$' => HidKeyCode::Digit4,
        '%' => HidKeyCode::Digit5,
        '^' => HidKeyCode::Digit6,
        '&' => HidKeyCode::Digit7,
        '*' => HidKeyCode::Digit8,
        '(' => HidKeyCode::Digit9,
        ' ' => HidKeyCode::Space,
        '\n' => HidKeyCode::Enter,
        '\t' => HidKeyCode::Tab,
        '-' | '_' => HidKeyCode::Minus,
        '=' | '+' => HidKeyCode::Equal,
        '[' | '{' => HidKeyCode::BracketLeft,
        ']' | '}' => HidKeyCode::BracketRight,
        '\\' | '|' => HidKeyCode::Backslash,
        ';' | ':' => HidKeyCode::Semicolon,
        '\'' | '"' => HidKeyCode::Quote,
        '`' | '~' => HidKeyCode::Backquote,
        ',' | '<' => HidKeyCode::Comma,
        '.' | '>' => HidKeyCode::Period,
        '/' | '?' => HidKeyCode::Slash,
        _ => return None,
    };
    Some(key)
}

/// Expands `text` into the key strokes that type it.
///
/// When `caps_lock_on` is set the result starts with one plain CapsLock
/// stroke.  Non-ASCII characters and ASCII characters without a key are
/// logged and skipped; the rest of the text is still produced.
pub fn expand_text(text: &str, caps_lock_on: bool) -> Vec<Keystroke> {
    let mut strokes = Vec::with_capacity(text.len() + 1);
    if caps_lock_on {
        strokes.push(Keystroke::plain(HidKeyCode::CapsLock));
    }

    for c in text.chars() {
        if !c.is_ascii() {
            warn!(character = %c, "skipping non-ASCII character");
            continue;
        }
        match ascii_to_key(c) {
            Some(key) => strokes.push(Keystroke {
                key,
                shift: requires_shift(c),
            }),
            None => warn!(character = ?c, "no key mapping for character, skipping"),
        }
    }
    strokes
}

/// Resolves a list of key names (as used in `shortcut_keys`) into key codes.
///
/// Unknown names are logged and dropped so the rest of the chord still goes
/// out.
pub fn resolve_key_names<S: AsRef<str>>(names: &[S]) -> Vec<HidKeyCode> {
    names
        .iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let key = HidKeyCode::from_name(name);
            if key.is_none() {
                warn!(name, "unknown key name, dropping from chord");
            }
            key
        })
        .collect()
}
