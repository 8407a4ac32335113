//! The `Controller` trait: every operation the dispatcher can perform on the
//! HID-emulation device.
//!
//! The dispatcher only ever sees this trait.  The production implementation
//! is [`crate::infrastructure::connection_manager::ConnectionManager`]; tests
//! substitute in-memory fakes.

use thiserror::Error;
use usbkvm_core::{
    IndicatorReport, KeyboardSnapshot, MouseSnapshot, PointerMode, ProtocolError, ReleaseTarget,
};

/// Error type for device operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// No connection is open, or the open one is unhealthy.
    #[error("controller connection is not available")]
    ConnectionUnavailable,

    /// The transport failed; the connection has been torn down.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The chip answered with something that could not be decoded.
    #[error("could not decode device reply: {0}")]
    Decoding(#[from] ProtocolError),
}

/// Device operations, all taking `&self` so one instance can be shared
/// between the dispatcher thread and its owner.
///
/// Implementations serialize access internally.  `open` and `check` report
/// failure as `false` rather than an error: a missing device is an expected
/// state, not an exceptional one.
pub trait Controller: Send + Sync {
    /// Opens the connection, closing any previous one first.
    fn open(&self) -> bool;

    /// Releases everything held on the chip (best effort) and closes.
    fn close(&self);

    /// `true` if a connection is open and usable.
    fn check(&self) -> bool;

    /// Closes then reopens the connection.
    fn reset(&self) -> bool {
        self.close();
        self.open()
    }

    fn send_keyboard(&self, snapshot: &KeyboardSnapshot) -> Result<(), ControllerError>;

    fn send_mouse(&self, snapshot: &MouseSnapshot, mode: PointerMode)
        -> Result<(), ControllerError>;

    /// Queries the chip for the remote lock indicators.
    fn read_indicators(&self) -> Result<IndicatorReport, ControllerError>;

    /// Sends all-released reports for the targeted device(s).
    fn release(&self, target: ReleaseTarget) -> Result<(), ControllerError>;

    /// Soft-resets the chip.  The local connection stays open.
    fn reset_chip(&self) -> Result<(), ControllerError>;

    /// Reads the chip's USB product string.
    fn product(&self) -> Result<String, ControllerError>;
}
