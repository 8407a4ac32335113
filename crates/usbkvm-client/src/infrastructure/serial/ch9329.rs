//! CH9329 link over a real serial port.
//!
//! Writes (keyboard and mouse reports) are fire-and-forget: the chip's
//! acknowledgement frames are left in the input buffer and skipped by the
//! next query.  Queries write one frame, then read until the matching reply
//! arrives.  A query gives up after one read timeout in total, or after
//! [`MAX_QUERY_BYTES`] bytes without a reply, even if the port keeps talking.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};
use usbkvm_core::protocol::ch9329::{
    absolute_mouse_payload, decode_info, decode_usb_string, encode_frame, keyboard_payload,
    relative_mouse_payload, ChipCommand, ChipInfo, FrameDecoder, USB_STRING_PRODUCT,
};
use usbkvm_core::{KeyboardSnapshot, MouseSnapshot, Resolution};

use super::{HidLink, LinkError, LinkOpener, SerialSettings, AUTO_PORT};

const READ_CHUNK: usize = 64;

/// Upper bound on bytes read while waiting for one reply.
pub const MAX_QUERY_BYTES: usize = 4096;

/// Picks the port to open from the configured name and the enumerated ports.
///
/// `auto` selects the last enumerated port.  Returns `None` when nothing
/// usable remains.
pub fn pick_port(requested: &str, available: &[String]) -> Option<String> {
    let requested = requested.trim();
    if requested == AUTO_PORT {
        return available.last().cloned();
    }
    if requested.is_empty() {
        return None;
    }
    Some(requested.to_string())
}

/// A link speaking the CH9329 frame protocol over any byte stream.
pub struct Ch9329Link<P> {
    port: P,
    name: String,
    screen: Resolution,
    timeout: Duration,
    decoder: FrameDecoder,
}

impl<P: Read + Write + Send> Ch9329Link<P> {
    /// `timeout` bounds each query as a whole, not just each read.
    pub fn new(port: P, name: impl Into<String>, screen: Resolution, timeout: Duration) -> Self {
        Self {
            port,
            name: name.into(),
            screen,
            timeout,
            decoder: FrameDecoder::new(),
        }
    }

    fn write_frame(&mut self, command: ChipCommand, data: &[u8]) -> Result<(), LinkError> {
        let bytes = encode_frame(command, data)?;
        trace!(command = ?command, len = bytes.len(), "writing frame");
        self.port.write_all(&bytes)?;
        self.port.flush()?;
        Ok(())
    }

    /// Sends `command` and returns the data section of its success reply.
    fn query(&mut self, command: ChipCommand, data: &[u8]) -> Result<Vec<u8>, LinkError> {
        self.decoder.clear();
        self.write_frame(command, data)?;

        let deadline = Instant::now() + self.timeout;
        let mut received = 0usize;
        let mut buf = [0u8; READ_CHUNK];
        loop {
            while let Some(frame) = self.decoder.next_frame() {
                match frame {
                    Ok(frame) if frame.answers(command) => {
                        return Ok(frame.expect_reply(command)?.to_vec());
                    }
                    Ok(frame) => {
                        trace!(reply = frame.command, "skipping unrelated frame");
                    }
                    Err(err) => {
                        debug!(error = %err, "discarding corrupt reply bytes");
                    }
                }
            }

            if received >= MAX_QUERY_BYTES || Instant::now() >= deadline {
                debug!(command = ?command, received, "no reply before deadline");
                return Err(LinkError::Timeout);
            }

            let read = match self.port.read(&mut buf) {
                Ok(0) => return Err(LinkError::Timeout),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Err(LinkError::Timeout),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            received += read;
            self.decoder.push(&buf[..read]);
        }
    }
}

impl<P: Read + Write + Send> HidLink for Ch9329Link<P> {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn send_keyboard(&mut self, snapshot: &KeyboardSnapshot) -> Result<(), LinkError> {
        self.write_frame(ChipCommand::SendKeyboard, &keyboard_payload(snapshot))
    }

    fn send_mouse_absolute(&mut self, snapshot: &MouseSnapshot) -> Result<(), LinkError> {
        let data = absolute_mouse_payload(snapshot, self.screen);
        self.write_frame(ChipCommand::SendMouseAbsolute, &data)
    }

    fn send_mouse_relative(&mut self, snapshot: &MouseSnapshot) -> Result<(), LinkError> {
        self.write_frame(ChipCommand::SendMouseRelative, &relative_mouse_payload(snapshot))
    }

    fn read_info(&mut self) -> Result<ChipInfo, LinkError> {
        let data = self.query(ChipCommand::GetInfo, &[])?;
        Ok(decode_info(&data)?)
    }

    fn product_string(&mut self) -> Result<String, LinkError> {
        let data = self.query(ChipCommand::GetUsbString, &[USB_STRING_PRODUCT])?;
        Ok(decode_usb_string(&data)?)
    }

    fn reset_chip(&mut self) -> Result<(), LinkError> {
        self.query(ChipCommand::Reset, &[])?;
        Ok(())
    }
}

/// Opens real serial ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn HidLink>, LinkError> {
        let available: Vec<String> = if settings.port.trim() == AUTO_PORT {
            serialport::available_ports()?
                .into_iter()
                .map(|info| info.port_name)
                .collect()
        } else {
            Vec::new()
        };
        let name = pick_port(&settings.port, &available).ok_or(LinkError::NoPort)?;

        let port = serialport::new(&name, settings.baud_rate)
            .timeout(settings.timeout)
            .open()?;
        info!(port = %name, baud = settings.baud_rate, "serial port opened");
        Ok(Box::new(Ch9329Link::new(
            port,
            name,
            settings.screen,
            settings.timeout,
        )))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use usbkvm_core::protocol::ch9329::checksum;
    use usbkvm_core::{HidKeyCode, KeyboardKeyBuffer, ProtocolError};

    /// In-memory port: records writes, serves queued bytes in small chunks,
    /// and times out once the queue is empty.
    #[derive(Default)]
    struct FakePort {
        written: Vec<u8>,
        incoming: VecDeque<u8>,
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.incoming.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(3).min(self.incoming.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.incoming.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn reply(command: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x57, 0xAB, 0x00, command, data.len() as u8];
        frame.extend_from_slice(data);
        frame.push(checksum(&frame));
        frame
    }

    fn link_with(incoming: Vec<u8>) -> Ch9329Link<FakePort> {
        let port = FakePort {
            written: Vec::new(),
            incoming: incoming.into(),
        };
        Ch9329Link::new(
            port,
            "fake",
            Resolution::new(1920, 1080),
            Duration::from_secs(1),
        )
    }

    /// Port attached to something that never stops sending and never
    /// answers: every read returns one byte of noise.
    struct StreamingPort {
        pause: Duration,
    }

    impl Read for StreamingPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }
            buf[0] = b'$';
            Ok(1)
        }
    }

    impl Write for StreamingPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pick_port_auto_takes_last() {
        let ports = vec!["/dev/ttyS0".to_string(), "/dev/ttyUSB0".to_string()];
        assert_eq!(pick_port("auto", &ports).as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(pick_port("auto", &[]), None);
        assert_eq!(pick_port("  ", &ports), None);
        assert_eq!(pick_port("COM3", &[]).as_deref(), Some("COM3"));
    }

    #[test]
    fn test_keyboard_write_emits_one_frame() {
        // Arrange
        let mut link = link_with(Vec::new());
        let mut buffer = KeyboardKeyBuffer::new();
        buffer.press(HidKeyCode::KeyA);

        // Act
        link.send_keyboard(&buffer.snapshot()).unwrap();

        // Assert
        let written = &link.port.written;
        assert_eq!(&written[..5], &[0x57, 0xAB, 0x00, 0x02, 0x08]);
        assert_eq!(written[7], 0x04);
        assert_eq!(*written.last().unwrap(), checksum(&written[..written.len() - 1]));
    }

    #[test]
    fn test_read_info_skips_stale_acks() {
        // Arrange: a leftover keyboard ack, line noise, then the info reply
        let mut incoming = reply(0x82, &[0x00]);
        incoming.extend_from_slice(&[0x13, 0x37]);
        incoming.extend(reply(0x81, &[0x30, 0x01, 0x02, 0, 0, 0, 0, 0]));
        let mut link = link_with(incoming);

        // Act
        let info = link.read_info().unwrap();

        // Assert
        assert_eq!(info.version, 0x30);
        assert!(info.indicators.usb_connected);
        assert!(info.indicators.caps_lock);
        assert!(!info.indicators.num_lock);
    }

    #[test]
    fn test_query_without_reply_times_out() {
        let mut link = link_with(Vec::new());
        let err = link.read_info().unwrap_err();
        assert!(matches!(err, LinkError::Timeout));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_query_gives_up_at_deadline_on_chatty_port() {
        // Arrange: a byte every millisecond, never a reply
        let port = StreamingPort {
            pause: Duration::from_millis(1),
        };
        let mut link = Ch9329Link::new(
            port,
            "chatty",
            Resolution::new(1920, 1080),
            Duration::from_millis(50),
        );

        // Act
        let started = Instant::now();
        let err = link.read_info().unwrap_err();

        // Assert
        assert!(matches!(err, LinkError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_query_gives_up_after_byte_cap() {
        // Arrange: noise as fast as it can be read, with a generous timeout
        let port = StreamingPort {
            pause: Duration::ZERO,
        };
        let mut link = Ch9329Link::new(
            port,
            "flood",
            Resolution::new(1920, 1080),
            Duration::from_secs(60),
        );

        // Act
        let started = Instant::now();
        let err = link.product_string().unwrap_err();

        // Assert
        assert!(matches!(err, LinkError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_product_string_rejects_garbage() {
        let mut link = link_with(reply(0x8A, &[0x01, 0x02, 0xFF, 0x00]));
        let err = link.product_string().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Protocol(ProtocolError::InvalidStringEncoding)
        ));
    }

    #[test]
    fn test_product_string_decodes_ascii() {
        let mut link = link_with(reply(0x8A, &[0x01, 0x06, b'C', b'H', b'9', b'3', b'2', b'9']));
        assert_eq!(link.product_string().unwrap(), "CH9329");
        // Request carried the product selector.
        assert_eq!(&link.port.written[3..6], &[0x0A, 0x01, 0x01]);
    }

    #[test]
    fn test_chip_error_reply_surfaces_status() {
        let mut link = link_with(reply(0xCF, &[0xE5]));
        let err = link.reset_chip().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Protocol(ProtocolError::ChipError {
                command: 0x0F,
                status: 0xE5
            })
        ));
    }
}
