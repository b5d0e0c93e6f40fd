//! Byte channels to the printer.
//!
//! The printer is reached either through a serial device such as a
//! Bluetooth RFCOMM port (`/dev/rfcomm0`), opened raw at 115200 baud, or
//! directly over USB bulk endpoints. Both look the same to a session: a blocking writer plus a
//! reader that hands back terminator-delimited chunks within a time bound.

use std::time::Duration;

use log::info;

use crate::error::TransportError;

mod stream;
mod usb;

pub use stream::{StreamTransport, TimedStream, BAUD_RATE};
pub use usb::UsbTransport;

/// Duplex byte channel to a printer.
pub trait Transport: Send {
    /// Write the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Read up to and including the next `delimiter`.
    ///
    /// Fails with [`TransportError::ReadTimeout`] if no complete chunk
    /// arrives within `timeout`. Bytes already received are kept for the
    /// next call.
    fn read_until(&mut self, delimiter: &[u8], timeout: Duration)
        -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(buf)
    }

    fn read_until(
        &mut self,
        delimiter: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read_until(delimiter, timeout)
    }
}

/// Open the transport named by `identifier`.
///
/// `usb:VID:PID` or `usb:VID:PID:SERIAL` (ids in hex) opens a USB printer,
/// anything else is taken as the name of a serial device.
pub fn open(identifier: &str) -> Result<Box<dyn Transport>, TransportError> {
    match identifier.strip_prefix("usb:") {
        Some(rest) => {
            let (vid, pid, serial) = parse_usb_identifier(rest)
                .ok_or_else(|| TransportError::InvalidIdentifier(identifier.to_string()))?;
            info!("opening USB printer {:04x}:{:04x}", vid, pid);
            Ok(Box::new(UsbTransport::open(vid, pid, serial)?))
        }
        None if identifier.is_empty() => {
            Err(TransportError::InvalidIdentifier(identifier.to_string()))
        }
        None => {
            info!("opening printer device {}", identifier);
            Ok(Box::new(StreamTransport::open(identifier)?))
        }
    }
}

fn parse_usb_identifier(s: &str) -> Option<(u16, u16, Option<String>)> {
    let mut parts = s.splitn(3, ':');
    let vid = u16::from_str_radix(parts.next()?, 16).ok()?;
    let pid = u16::from_str_radix(parts.next()?, 16).ok()?;
    let serial = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    Some((vid, pid, serial))
}

/// Bytes received but not yet handed out as a chunk.
#[derive(Debug, Default)]
pub(crate) struct ChunkBuffer {
    pending: Vec<u8>,
}

impl ChunkBuffer {
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Split off everything up to and including the first `delimiter`.
    pub(crate) fn take_chunk(&mut self, delimiter: &[u8]) -> Option<Vec<u8>> {
        if delimiter.is_empty() {
            return None;
        }
        let end = self
            .pending
            .windows(delimiter.len())
            .position(|w| w == delimiter)?
            + delimiter.len();
        let rest = self.pending.split_off(end);
        Some(std::mem::replace(&mut self.pending, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usb_identifiers() {
        assert_eq!(parse_usb_identifier("04f9:209b"), Some((0x04F9, 0x209B, None)));
        assert_eq!(
            parse_usb_identifier("04f9:209b:000G2G844181"),
            Some((0x04F9, 0x209B, Some("000G2G844181".to_string())))
        );
        assert_eq!(parse_usb_identifier("04f9"), None);
        assert_eq!(parse_usb_identifier("zz:209b"), None);
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(matches!(
            open("usb:nope"),
            Err(TransportError::InvalidIdentifier(_))
        ));
        assert!(matches!(open(""), Err(TransportError::InvalidIdentifier(_))));
    }

    #[test]
    fn chunk_buffer_splits_on_delimiter() {
        let mut buf = ChunkBuffer::default();
        buf.extend(&[0xAA, 0xAA, 0x01, 0x55]);
        assert_eq!(buf.take_chunk(&[0x55, 0x55]), None);
        buf.extend(&[0x55, 0xAA, 0xAA, 0x01, 0x55, 0x55, 0xAA]);
        assert_eq!(
            buf.take_chunk(&[0x55, 0x55]),
            Some(vec![0xAA, 0xAA, 0x01, 0x55, 0x55])
        );
        assert_eq!(
            buf.take_chunk(&[0x55, 0x55]),
            Some(vec![0xAA, 0xAA, 0x01, 0x55, 0x55])
        );
        assert_eq!(buf.take_chunk(&[0x55, 0x55]), None);
        assert_eq!(buf.pending, vec![0xAA]);
    }
}
