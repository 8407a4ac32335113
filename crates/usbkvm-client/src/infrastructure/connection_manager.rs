//! ConnectionManager: the single owner of the serial link.
//!
//! # Locking (for beginners)
//!
//! The link lives in a `Mutex<Option<Box<dyn HidLink>>>`.  `None` means
//! closed.  Every operation, including open and close, takes the lock for its
//! whole duration and releases it when the guard goes out of scope, so no two
//! operations ever interleave on the wire.  In normal operation only the
//! dispatcher thread calls in, but the lock keeps direct callers safe too.
//!
//! # Failure handling
//!
//! A fatal link error (anything but a timeout or a bad reply) drops the link
//! on the spot.  The next `device_check` then reports the connection as
//! unhealthy and the session reconnects.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};
use usbkvm_core::protocol::ch9329::describe_status;
use usbkvm_core::{
    IndicatorReport, KeyboardSnapshot, MouseSnapshot, PointerMode, ProtocolError, ReleaseTarget,
};

use crate::application::controller::{Controller, ControllerError};
use crate::infrastructure::serial::{HidLink, LinkError, LinkOpener, SerialSettings};

type LinkSlot = Option<Box<dyn HidLink>>;

pub struct ConnectionManager {
    opener: Box<dyn LinkOpener>,
    settings: SerialSettings,
    link: Mutex<LinkSlot>,
}

impl ConnectionManager {
    pub fn new(opener: Box<dyn LinkOpener>, settings: SerialSettings) -> Self {
        Self {
            opener,
            settings,
            link: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkSlot> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` on the open link, dropping the link if it fails fatally.
    fn with_link<T, F>(&self, op: &'static str, f: F) -> Result<T, ControllerError>
    where
        F: FnOnce(&mut dyn HidLink) -> Result<T, LinkError>,
    {
        let mut guard = self.lock();
        let link = guard
            .as_mut()
            .ok_or(ControllerError::ConnectionUnavailable)?;

        match f(link.as_mut()) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_fatal() {
                    error!(op, port = link.port_name(), error = %err, "link failed, closing");
                    *guard = None;
                }
                Err(into_controller_error(op, err))
            }
        }
    }
}

fn into_controller_error(op: &'static str, err: LinkError) -> ControllerError {
    match err {
        LinkError::Protocol(err) => {
            if let ProtocolError::ChipError { status, .. } = &err {
                warn!(op, status = describe_status(*status), "chip reported an error");
            }
            ControllerError::Decoding(err)
        }
        other => ControllerError::Transport(other.to_string()),
    }
}

/// Sends all-released reports for `target` on `link`.
fn release_on(link: &mut dyn HidLink, target: ReleaseTarget) -> Result<(), LinkError> {
    if target.includes_keyboard() {
        link.send_keyboard(&KeyboardSnapshot::empty())?;
    }
    if target.includes_mouse() {
        link.send_mouse_relative(&MouseSnapshot::released())?;
    }
    Ok(())
}

/// Releases everything on the link in `slot` (best effort) and drops it.
fn close_slot(slot: &mut LinkSlot) {
    if let Some(mut link) = slot.take() {
        if let Err(err) = release_on(link.as_mut(), ReleaseTarget::All) {
            debug!(error = %err, "release before close failed");
        }
        info!(port = link.port_name(), "controller connection closed");
    }
}

impl Controller for ConnectionManager {
    fn open(&self) -> bool {
        let mut guard = self.lock();
        close_slot(&mut guard);

        match self.opener.open(&self.settings) {
            Ok(link) => {
                info!(port = link.port_name(), "controller connection opened");
                *guard = Some(link);
                true
            }
            Err(err) => {
                warn!(port = %self.settings.port, error = %err, "could not open controller");
                false
            }
        }
    }

    fn close(&self) {
        close_slot(&mut self.lock());
    }

    fn check(&self) -> bool {
        self.lock().is_some()
    }

    fn send_keyboard(&self, snapshot: &KeyboardSnapshot) -> Result<(), ControllerError> {
        self.with_link("keyboard_write", |link| link.send_keyboard(snapshot))
    }

    fn send_mouse(&self, snapshot: &MouseSnapshot, mode: PointerMode) -> Result<(), ControllerError> {
        match mode {
            PointerMode::Absolute => {
                self.with_link("mouse_absolute_write", |link| link.send_mouse_absolute(snapshot))
            }
            PointerMode::Relative => {
                self.with_link("mouse_relative_write", |link| link.send_mouse_relative(snapshot))
            }
        }
    }

    fn read_indicators(&self) -> Result<IndicatorReport, ControllerError> {
        self.with_link("keyboard_read", |link| link.read_info())
            .map(|info| info.indicators)
    }

    fn release(&self, target: ReleaseTarget) -> Result<(), ControllerError> {
        self.with_link("device_release", |link| release_on(link, target))
    }

    fn reset_chip(&self) -> Result<(), ControllerError> {
        self.with_link("device_reset", |link| {
            release_on(link, ReleaseTarget::All)?;
            link.reset_chip()
        })
    }

    fn product(&self) -> Result<String, ControllerError> {
        self.with_link("device_info", |link| link.product_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::serial::mock::{LinkEvent, MockOpener, MockRecorder};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn manager() -> (ConnectionManager, MockRecorder, Arc<AtomicBool>, Arc<AtomicBool>) {
        let opener = MockOpener::new();
        let recorder = opener.recorder();
        let fail_open = Arc::clone(&opener.fail_open);
        let fail_io = Arc::clone(&opener.fail_io);
        let manager = ConnectionManager::new(Box::new(opener), SerialSettings::default());
        (manager, recorder, fail_open, fail_io)
    }

    #[test]
    fn test_operations_fail_fast_when_closed() {
        let (manager, recorder, _, _) = manager();

        let result = manager.send_keyboard(&KeyboardSnapshot::empty());

        assert!(matches!(result, Err(ControllerError::ConnectionUnavailable)));
        assert!(!manager.check());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_open_failure_leaves_closed() {
        let (manager, _, fail_open, _) = manager();
        fail_open.store(true, Ordering::SeqCst);

        assert!(!manager.open());
        assert!(!manager.check());
    }

    #[test]
    fn test_empty_port_is_refused() {
        let manager = ConnectionManager::new(
            Box::new(MockOpener::new()),
            SerialSettings {
                port: String::new(),
                ..SerialSettings::default()
            },
        );
        assert!(!manager.open());
    }

    #[test]
    fn test_reopen_closes_previous_link_first() {
        // Arrange
        let (manager, recorder, _, _) = manager();
        assert!(manager.open());

        // Act
        assert!(manager.open());

        // Assert: release all, close, open again
        let events = recorder.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[1], LinkEvent::Keyboard([0; 8]));
        assert_eq!(events[2], LinkEvent::MouseRelative([0x01, 0, 0, 0, 0]));
        assert_eq!(events[3], LinkEvent::Closed);
        assert!(matches!(events[4], LinkEvent::Opened(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (manager, recorder, _, _) = manager();
        assert!(manager.open());
        manager.close();
        manager.close();
        let closes = recorder
            .events()
            .iter()
            .filter(|e| **e == LinkEvent::Closed)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_fatal_error_tears_link_down() {
        // Arrange
        let (manager, _, _, fail_io) = manager();
        assert!(manager.open());
        fail_io.store(true, Ordering::SeqCst);

        // Act
        let result = manager.send_mouse(&MouseSnapshot::released(), PointerMode::Absolute);

        // Assert
        assert!(matches!(result, Err(ControllerError::Transport(_))));
        assert!(!manager.check());
    }

    #[test]
    fn test_reset_releases_then_resets_chip() {
        let (manager, recorder, _, _) = manager();
        assert!(manager.open());
        recorder.clear();

        manager.reset_chip().unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                LinkEvent::Keyboard([0; 8]),
                LinkEvent::MouseRelative([0x01, 0, 0, 0, 0]),
                LinkEvent::ChipReset,
            ]
        );
        assert!(manager.check(), "chip reset keeps the port open");
    }

    #[test]
    fn test_read_indicators_and_product() {
        let (manager, _, _, _) = manager();
        assert!(manager.open());

        let indicators = manager.read_indicators().unwrap();
        let product = manager.product().unwrap();

        assert!(indicators.usb_connected);
        assert_eq!(product, "CH9329 dry run");
    }

    #[test]
    fn test_release_keyboard_only() {
        let (manager, recorder, _, _) = manager();
        assert!(manager.open());
        recorder.clear();

        manager.release(ReleaseTarget::Keyboard).unwrap();

        assert_eq!(recorder.events(), vec![LinkEvent::Keyboard([0; 8])]);
    }
}
