//! Serial links to the HID-emulation chip.
//!
//! # Link vs. connection (for beginners)
//!
//! A [`HidLink`] is one open port speaking the chip's frame protocol.  It
//! knows nothing about health, retries or locking; those belong to
//! [`crate::infrastructure::connection_manager::ConnectionManager`], which
//! owns at most one link at a time and builds new ones through a
//! [`LinkOpener`].
//!
//! Two implementations exist:
//!
//! - [`ch9329::SerialOpener`] opens a real port with the `serialport` crate.
//! - [`mock::MockOpener`] records every operation in memory.  It backs the
//!   `--dry-run` flag and the integration tests.

pub mod ch9329;
pub mod mock;

use std::time::Duration;

use thiserror::Error;
use usbkvm_core::protocol::ch9329::ChipInfo;
use usbkvm_core::{KeyboardSnapshot, MouseSnapshot, ProtocolError, Resolution};

/// Port name that selects the last enumerated serial port.
pub const AUTO_PORT: &str = "auto";

/// Parameters for opening a link.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    /// Device path (`/dev/ttyUSB0`, `COM3`) or [`AUTO_PORT`].
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout for chip replies.
    pub timeout: Duration,
    /// Remote screen size, used to scale absolute coordinates.
    pub screen: Resolution,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: 9600,
            timeout: Duration::from_millis(1000),
            screen: Resolution::new(1920, 1080),
        }
    }
}

/// Error type for link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Reading from or writing to the port failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port could not be enumerated or opened.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The port name was empty, or `auto` found no ports.
    #[error("no serial port to open")]
    NoPort,

    /// The chip did not answer before the read timeout.
    #[error("timed out waiting for the chip to reply")]
    Timeout,

    /// The chip answered with a bad or unexpected frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl LinkError {
    /// `true` if the link can no longer be trusted and must be dropped.
    ///
    /// Timeouts and protocol errors leave the port usable; the next command
    /// starts with a clean decoder.
    pub fn is_fatal(&self) -> bool {
        match self {
            LinkError::Io(err) => err.kind() != std::io::ErrorKind::TimedOut,
            LinkError::Serial(_) | LinkError::NoPort => true,
            LinkError::Timeout | LinkError::Protocol(_) => false,
        }
    }
}

/// One open link to the chip.
pub trait HidLink: Send {
    /// Name of the port this link was opened on.
    fn port_name(&self) -> &str;

    fn send_keyboard(&mut self, snapshot: &KeyboardSnapshot) -> Result<(), LinkError>;

    fn send_mouse_absolute(&mut self, snapshot: &MouseSnapshot) -> Result<(), LinkError>;

    fn send_mouse_relative(&mut self, snapshot: &MouseSnapshot) -> Result<(), LinkError>;

    /// Queries chip version, USB status and lock indicators.
    fn read_info(&mut self) -> Result<ChipInfo, LinkError>;

    /// Reads the USB product string descriptor.
    fn product_string(&mut self) -> Result<String, LinkError>;

    /// Soft-resets the chip.
    fn reset_chip(&mut self) -> Result<(), LinkError>;
}

/// Factory for links.
pub trait LinkOpener: Send + Sync {
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn HidLink>, LinkError>;
}
