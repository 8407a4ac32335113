//! Recording link for dry runs and tests.
//!
//! # How it works
//!
//! [`MockOpener`] hands out [`MockLink`]s that share one event log.  Every
//! operation encodes its payload with the real CH9329 codec and pushes a
//! [`LinkEvent`], so a dry run shows exactly the bytes a real chip would
//! receive.  Dropping a link records [`LinkEvent::Closed`].
//!
//! # Failure injection
//!
//! Set `fail_open` to make [`LinkOpener::open`] fail, or `fail_io` to make
//! every operation on an open link fail with a fatal broken-pipe error.
//!
//! # Overlap detection
//!
//! Each operation marks the shared log busy while it runs.  If a second
//! operation starts before the first ends, `overlaps()` counts it.  With
//! `op_delay` set, the window is wide enough for tests to catch unserialized
//! access.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::info;
use usbkvm_core::protocol::ch9329::{
    absolute_mouse_payload, keyboard_payload, relative_mouse_payload, ChipInfo,
};
use usbkvm_core::{IndicatorReport, KeyboardSnapshot, MouseSnapshot, Resolution};

use super::{HidLink, LinkError, LinkOpener, SerialSettings};

/// One recorded link operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened(String),
    Keyboard([u8; 8]),
    MouseAbsolute([u8; 7]),
    MouseRelative([u8; 5]),
    InfoRead,
    ProductRead,
    ChipReset,
    Closed,
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<LinkEvent>>,
    busy: AtomicBool,
    overlaps: AtomicUsize,
}

impl Shared {
    fn record(&self, event: LinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Hands out recording links.
pub struct MockOpener {
    shared: Arc<Shared>,
    /// When `true`, `open` fails as if no port were present.
    pub fail_open: Arc<AtomicBool>,
    /// When `true`, every link operation fails with a fatal I/O error.
    pub fail_io: Arc<AtomicBool>,
    /// Indicator state reported by `read_info`.
    pub indicators: IndicatorReport,
    /// Product string reported by `product_string`.
    pub product: String,
    /// Time each operation holds the link busy.
    pub op_delay: Duration,
}

impl Default for MockOpener {
    fn default() -> Self {
        Self {
            shared: Arc::default(),
            fail_open: Arc::default(),
            fail_io: Arc::default(),
            indicators: IndicatorReport {
                usb_connected: true,
                ..IndicatorReport::default()
            },
            product: "CH9329 dry run".to_string(),
            op_delay: Duration::ZERO,
        }
    }
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the shared event log that stays valid after the
    /// opener has been moved into a connection manager.
    pub fn recorder(&self) -> MockRecorder {
        MockRecorder {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl LinkOpener for MockOpener {
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn HidLink>, LinkError> {
        if self.fail_open.load(Ordering::SeqCst) || settings.port.trim().is_empty() {
            return Err(LinkError::NoPort);
        }
        info!(port = %settings.port, "mock link opened");
        self.shared.record(LinkEvent::Opened(settings.port.clone()));
        Ok(Box::new(MockLink {
            shared: Arc::clone(&self.shared),
            name: settings.port.clone(),
            screen: settings.screen,
            fail_io: Arc::clone(&self.fail_io),
            indicators: self.indicators,
            product: self.product.clone(),
            op_delay: self.op_delay,
        }))
    }
}

/// Read access to a [`MockOpener`]'s event log.
#[derive(Clone)]
pub struct MockRecorder {
    shared: Arc<Shared>,
}

impl MockRecorder {
    pub fn events(&self) -> Vec<LinkEvent> {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of operations that started while another was still running.
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }
}

/// A link that records instead of talking to hardware.
pub struct MockLink {
    shared: Arc<Shared>,
    name: String,
    screen: Resolution,
    fail_io: Arc<AtomicBool>,
    indicators: IndicatorReport,
    product: String,
    op_delay: Duration,
}

impl MockLink {
    fn operate(&self, event: LinkEvent) -> Result<(), LinkError> {
        if self.shared.busy.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.op_delay.is_zero() {
            std::thread::sleep(self.op_delay);
        }
        let result = if self.fail_io.load(Ordering::SeqCst) {
            Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock link failure",
            )))
        } else {
            self.shared.record(event);
            Ok(())
        };
        self.shared.busy.store(false, Ordering::SeqCst);
        result
    }
}

impl HidLink for MockLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn send_keyboard(&mut self, snapshot: &KeyboardSnapshot) -> Result<(), LinkError> {
        self.operate(LinkEvent::Keyboard(keyboard_payload(snapshot)))
    }

    fn send_mouse_absolute(&mut self, snapshot: &MouseSnapshot) -> Result<(), LinkError> {
        self.operate(LinkEvent::MouseAbsolute(absolute_mouse_payload(
            snapshot,
            self.screen,
        )))
    }

    fn send_mouse_relative(&mut self, snapshot: &MouseSnapshot) -> Result<(), LinkError> {
        self.operate(LinkEvent::MouseRelative(relative_mouse_payload(snapshot)))
    }

    fn read_info(&mut self) -> Result<ChipInfo, LinkError> {
        self.operate(LinkEvent::InfoRead)?;
        Ok(ChipInfo {
            version: 0x30,
            indicators: self.indicators,
        })
    }

    fn product_string(&mut self) -> Result<String, LinkError> {
        self.operate(LinkEvent::ProductRead)?;
        Ok(self.product.clone())
    }

    fn reset_chip(&mut self) -> Result<(), LinkError> {
        self.operate(LinkEvent::ChipReset)
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.shared.record(LinkEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbkvm_core::{HidKeyCode, KeyboardKeyBuffer};

    #[test]
    fn test_link_records_encoded_payloads() {
        // Arrange
        let opener = MockOpener::new();
        let recorder = opener.recorder();
        let mut link = opener.open(&SerialSettings::default()).unwrap();
        let mut buffer = KeyboardKeyBuffer::new();
        buffer.press(HidKeyCode::KeyB);

        // Act
        link.send_keyboard(&buffer.snapshot()).unwrap();
        drop(link);

        // Assert
        assert_eq!(
            recorder.events(),
            vec![
                LinkEvent::Opened("auto".to_string()),
                LinkEvent::Keyboard([0, 0, 0x05, 0, 0, 0, 0, 0]),
                LinkEvent::Closed,
            ]
        );
    }

    #[test]
    fn test_fail_open_refuses_link() {
        let opener = MockOpener::new();
        opener.fail_open.store(true, Ordering::SeqCst);
        assert!(matches!(
            opener.open(&SerialSettings::default()),
            Err(LinkError::NoPort)
        ));
    }

    #[test]
    fn test_fail_io_is_fatal() {
        let opener = MockOpener::new();
        let mut link = opener.open(&SerialSettings::default()).unwrap();
        opener.fail_io.store(true, Ordering::SeqCst);

        let err = link.reset_chip().unwrap_err();

        assert!(err.is_fatal());
    }
}
