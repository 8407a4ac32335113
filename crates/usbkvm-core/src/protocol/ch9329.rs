//! Frame codec for the WCH CH9329 serial-to-HID chip.
//!
//! Wire format (both directions):
//! ```text
//! [0x57][0xAB][addr:1][cmd:1][len:1][data:len][sum:1]
//! ```
//! `sum` is the low byte of the sum of every preceding byte.  The chip
//! answers a command `c` with `c | 0x80` on success or `c | 0xC0` with a
//! single status byte on failure.
//!
//! # Reports (for beginners)
//!
//! The chip presents itself to the remote host as a USB keyboard plus a USB
//! mouse.  Sending it a keyboard frame is the same as the remote host
//! receiving a HID keyboard report: "these keys are down now".  Keys not in
//! the report are up.  So a key tap is two frames: one with the key, one
//! without it.

use thiserror::Error;
use tracing::warn;

use crate::domain::geometry::Resolution;
use crate::domain::indicator::IndicatorReport;
use crate::domain::keyboard::{KeyboardSnapshot, MAX_PRESSED_KEYS};
use crate::domain::mouse::{MouseSnapshot, WheelState};
use crate::keymap::hid::HidKeyCode;

/// Frame start marker.
pub const HEADER: [u8; 2] = [0x57, 0xAB];
/// Default chip address.
pub const DEFAULT_ADDRESS: u8 = 0x00;
/// Bytes before the data section: header, address, command, length.
pub const PREFIX_LEN: usize = 5;
/// Largest data section the chip accepts.
pub const MAX_DATA_LEN: usize = 64;
/// Resolution of the absolute-mouse coordinate space on both axes.
pub const ABSOLUTE_RANGE: u32 = 4096;

const REPLY_OK_BIT: u8 = 0x80;
const REPLY_ERR_BITS: u8 = 0xC0;

/// USB string descriptor selector for the product name.
pub const USB_STRING_PRODUCT: u8 = 0x01;

/// Commands this codec knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChipCommand {
    GetInfo = 0x01,
    SendKeyboard = 0x02,
    SendMouseAbsolute = 0x04,
    SendMouseRelative = 0x05,
    GetUsbString = 0x0A,
    Reset = 0x0F,
}

impl ChipCommand {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn ok_reply(self) -> u8 {
        self.code() | REPLY_OK_BIT
    }

    pub fn error_reply(self) -> u8 {
        self.code() | REPLY_ERR_BITS
    }
}

/// Errors produced while encoding or decoding CH9329 frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The data section does not fit in one frame.
    #[error("payload too long: {len} bytes, maximum is {max}")]
    PayloadTooLong { len: usize, max: usize },

    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch: frame says 0x{declared:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { declared: u8, computed: u8 },

    /// A reply arrived for a different command than the one awaited.
    #[error("unexpected reply 0x{actual:02X} while waiting for 0x{expected:02X}")]
    UnexpectedReply { expected: u8, actual: u8 },

    /// The chip answered with its error reply.
    #[error("chip rejected command 0x{command:02X} with status 0x{status:02X}")]
    ChipError { command: u8, status: u8 },

    /// A string reply contained bytes that are not printable ASCII.
    #[error("string reply is not valid ASCII")]
    InvalidStringEncoding,

    /// The payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Human-readable meaning of a chip status byte.
pub fn describe_status(status: u8) -> &'static str {
    match status {
        0x00 => "success",
        0xE1 => "serial receive timeout",
        0xE2 => "bad frame header",
        0xE3 => "unknown command",
        0xE4 => "checksum mismatch",
        0xE5 => "bad parameter",
        0xE6 => "operation failed",
        _ => "unknown status",
    }
}

/// Low byte of the sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Builds a complete frame for `command` with `data` as its data section.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLong`] if `data` exceeds
/// [`MAX_DATA_LEN`].
pub fn encode_frame(command: ChipCommand, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    encode_raw(DEFAULT_ADDRESS, command.code(), data)
}

fn encode_raw(address: u8, command: u8, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if data.len() > MAX_DATA_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: data.len(),
            max: MAX_DATA_LEN,
        });
    }
    let mut buf = Vec::with_capacity(PREFIX_LEN + data.len() + 1);
    buf.extend_from_slice(&HEADER);
    buf.push(address);
    buf.push(command);
    buf.push(data.len() as u8);
    buf.extend_from_slice(data);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Keyboard data section: `[modifiers, 0, k1..k6]`.
///
/// Keys past the sixth are dropped, as are [`HidKeyCode::Unknown`] entries
/// (with a warning); the remaining slots are zero.
pub fn keyboard_payload(snapshot: &KeyboardSnapshot) -> [u8; 8] {
    let mut data = [0u8; 8];
    data[0] = snapshot.modifiers.bits();

    let mut slot = 2;
    for key in &snapshot.keys {
        if *key == HidKeyCode::Unknown {
            warn!("dropping key with no HID mapping from keyboard report");
            continue;
        }
        if key.is_modifier() {
            // Modifiers travel in byte 0 only.
            continue;
        }
        if slot - 2 >= MAX_PRESSED_KEYS {
            break;
        }
        data[slot] = key.as_u8();
        slot += 1;
    }
    data
}

/// Wheel byte: up is `-1`, down is `+1`, neutral is `0`.
pub fn wheel_byte(wheel: WheelState) -> u8 {
    match wheel {
        WheelState::Up => (-1i8) as u8,
        WheelState::Down => 1,
        WheelState::Neutral => 0,
    }
}

/// Scales a normalized coordinate onto the chip's `0..=4096` range for a
/// screen `extent` pixels wide.
fn scale_absolute(v: f64, extent: u32) -> u16 {
    if extent == 0 {
        return 0;
    }
    let pixels = (v.clamp(0.0, 1.0) * f64::from(extent)).round() as u32;
    let pixels = pixels.min(extent);
    (u64::from(ABSOLUTE_RANGE) * u64::from(pixels) / u64::from(extent)) as u16
}

/// Absolute-mouse data section: `[0x02, buttons, x_lo, x_hi, y_lo, y_hi, wheel]`.
pub fn absolute_mouse_payload(snapshot: &MouseSnapshot, screen: Resolution) -> [u8; 7] {
    let (x01, y01) = snapshot.absolute_point();
    let x = scale_absolute(x01, screen.width).to_le_bytes();
    let y = scale_absolute(y01, screen.height).to_le_bytes();
    [
        0x02,
        snapshot.buttons.bits(),
        x[0],
        x[1],
        y[0],
        y[1],
        wheel_byte(snapshot.wheel),
    ]
}

fn clamp_i8(v: i32) -> u8 {
    v.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8 as u8
}

/// Relative-mouse data section: `[0x01, buttons, dx, dy, wheel]`, with the
/// deltas clamped to `-128..=127`.
pub fn relative_mouse_payload(snapshot: &MouseSnapshot) -> [u8; 5] {
    let (dx, dy) = snapshot.relative_delta();
    [
        0x01,
        snapshot.buttons.bits(),
        clamp_i8(dx),
        clamp_i8(dy),
        wheel_byte(snapshot.wheel),
    ]
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// One checksum-verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Returns the data section if this frame is the success reply to
    /// `command`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ChipError`] for the chip's error reply and
    /// [`ProtocolError::UnexpectedReply`] for anything else.
    pub fn expect_reply(&self, command: ChipCommand) -> Result<&[u8], ProtocolError> {
        if self.command == command.ok_reply() {
            Ok(&self.data)
        } else if self.command == command.error_reply() {
            Err(ProtocolError::ChipError {
                command: command.code(),
                status: self.data.first().copied().unwrap_or(0xFF),
            })
        } else {
            Err(ProtocolError::UnexpectedReply {
                expected: command.ok_reply(),
                actual: self.command,
            })
        }
    }

    /// `true` if this frame answers `command`, successfully or not.
    pub fn answers(&self, command: ChipCommand) -> bool {
        self.command == command.ok_reply() || self.command == command.error_reply()
    }
}

/// Incremental decoder for frames arriving in arbitrary chunks.
///
/// Leading bytes that are not a frame header are discarded.  A frame with a
/// bad checksum is reported once and skipped by dropping its first byte, so
/// the decoder resynchronizes on the next header.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes held but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Returns the next complete frame, an error for a corrupt one, or `None`
    /// when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Result<Frame, ProtocolError>> {
        self.skip_to_header();
        if self.buf.len() < PREFIX_LEN {
            return None;
        }
        let len = self.buf[4] as usize;
        let total = PREFIX_LEN + len + 1;
        if self.buf.len() < total {
            return None;
        }

        let declared = self.buf[total - 1];
        let computed = checksum(&self.buf[..total - 1]);
        if declared != computed {
            self.buf.drain(..1);
            return Some(Err(ProtocolError::ChecksumMismatch { declared, computed }));
        }

        let frame = Frame {
            command: self.buf[3],
            data: self.buf[PREFIX_LEN..total - 1].to_vec(),
        };
        self.buf.drain(..total);
        Some(Ok(frame))
    }

    fn skip_to_header(&mut self) {
        match self.buf.windows(2).position(|w| w == HEADER) {
            Some(0) => {}
            Some(start) => {
                self.buf.drain(..start);
            }
            None => {
                // Keep a trailing 0x57: it may be the first half of a header.
                let keep = usize::from(self.buf.last() == Some(&HEADER[0]));
                let drop = self.buf.len() - keep;
                self.buf.drain(..drop);
            }
        }
    }
}

/// Decoded `GET_INFO` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub version: u8,
    pub indicators: IndicatorReport,
}

/// Parses the data section of a `GET_INFO` reply:
/// `[version, usb_status, indicator_bits, reserved…]`.
pub fn decode_info(data: &[u8]) -> Result<ChipInfo, ProtocolError> {
    if data.len() < 3 {
        return Err(ProtocolError::InsufficientData {
            needed: 3,
            available: data.len(),
        });
    }
    let bits = data[2];
    Ok(ChipInfo {
        version: data[0],
        indicators: IndicatorReport {
            usb_connected: data[1] != 0,
            num_lock: bits & 0x01 != 0,
            caps_lock: bits & 0x02 != 0,
            scroll_lock: bits & 0x04 != 0,
        },
    })
}

/// Parses the data section of a `GET_USB_STRING` reply: `[type, len, ascii…]`.
pub fn decode_usb_string(data: &[u8]) -> Result<String, ProtocolError> {
    if data.len() < 2 {
        return Err(ProtocolError::InsufficientData {
            needed: 2,
            available: data.len(),
        });
    }
    let len = data[1] as usize;
    let body = data.get(2..2 + len).ok_or(ProtocolError::InsufficientData {
        needed: 2 + len,
        available: data.len(),
    })?;
    if !body.iter().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        return Err(ProtocolError::InvalidStringEncoding);
    }
    Ok(body.iter().map(|&b| b as char).collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
