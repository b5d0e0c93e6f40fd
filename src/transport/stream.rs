use log::{debug, warn};
use serialport::SerialPort;
use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use super::{ChunkBuffer, Transport};
use crate::error::TransportError;

/// Line speed of the printer's serial and RFCOMM ports.
pub const BAUD_RATE: u32 = 115_200;

const READ_BLOCK: usize = 256;

/// Shortest read bound handed to the port.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Byte stream whose reads give up after a set time.
pub trait TimedStream: Read + Write + Send {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl TimedStream for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(self.as_mut(), timeout).map_err(io::Error::from)
    }
}

#[cfg(unix)]
impl TimedStream for std::os::unix::net::UnixStream {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, Some(timeout))
    }
}

/// Printer behind a byte stream such as a serial or RFCOMM port.
///
/// The stream is owned outright, dropping the transport closes the device.
pub struct StreamTransport<S: TimedStream = Box<dyn SerialPort>> {
    port: S,
    buffer: ChunkBuffer,
}

impl StreamTransport<Box<dyn SerialPort>> {
    /// Open a serial device (`/dev/rfcomm0`, `/dev/ttyUSB0`, `COM3`) at
    /// [`BAUD_RATE`].
    pub fn open(path: &str) -> Result<Self, TransportError> {
        Self::open_with_baud_rate(path, BAUD_RATE)
    }

    /// Open a serial device in raw 8N1 mode at `baud_rate`.
    pub fn open_with_baud_rate(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;
        debug!("opened {} at {} baud", path, baud_rate);
        Ok(Self::new(port))
    }
}

impl<S: TimedStream> StreamTransport<S> {
    pub fn new(port: S) -> Self {
        StreamTransport {
            port,
            buffer: ChunkBuffer::default(),
        }
    }

    pub fn into_inner(self) -> S {
        self.port
    }
}

impl<S: TimedStream> Transport for StreamTransport<S> {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(buf).map_err(|err| match err.kind() {
            io::ErrorKind::WriteZero => TransportError::WriteFailure {
                written: 0,
                expected: buf.len(),
            },
            io::ErrorKind::BrokenPipe => TransportError::ChannelClosed,
            _ => TransportError::Io(err),
        })?;
        self.port.flush()?;
        Ok(())
    }

    fn read_until(
        &mut self,
        delimiter: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut block = [0u8; READ_BLOCK];

        loop {
            if let Some(chunk) = self.buffer.take_chunk(delimiter) {
                return Ok(chunk);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < MIN_READ_TIMEOUT {
                return Err(TransportError::ReadTimeout(timeout));
            }
            self.port.set_read_timeout(remaining)?;

            match self.port.read(&mut block) {
                Ok(0) => return Err(TransportError::ChannelClosed),
                Ok(n) => self.buffer.extend(&block[..n]),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => {
                    warn!("read from printer failed: {}", err);
                    return Err(TransportError::Io(err));
                }
            }
        }
    }
}
