//! Error types for print-data encoding and printer communication.
//!
//! Errors fall into three families. [`ValidationError`]s are raised while a
//! mission is being encoded, before a single byte reaches the printer.
//! [`TransportError`]s and [`ProtocolError`]s are raised while a mission is
//! being dispatched, after bytes may already have been printed.

use std::time::Duration;
use thiserror::Error;

/// Main error type for printer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The job was rejected while it was being encoded.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Communication with the printer failed during dispatch.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The printer answered with something other than the expected frames.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session was shut down before the mission could be sent.
    #[error("Session is closed")]
    SessionClosed,

    /// An earlier mission timed out and the session was configured to abort.
    #[error("Session aborted after a previous mission failed")]
    SessionAborted,

    /// The session was shut down while this mission was waiting for its
    /// acknowledgment. The job may have printed.
    #[error("Mission abandoned while waiting for acknowledgment")]
    Abandoned,

    #[error("Session worker is already running")]
    AlreadyStarted,

    #[error("Session worker panicked")]
    WorkerPanicked,
}

impl Error {
    /// `true` when the job never reached the printer.
    ///
    /// Such jobs can be corrected and resubmitted without risk of duplicate
    /// output. Every other error may have left a partial print behind.
    pub fn is_rejected_before_send(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::SessionClosed | Self::SessionAborted
        )
    }

    /// `true` for failures an explicit retry may clear.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_transient(),
            Self::Protocol(_) => true,
            _ => false,
        }
    }
}

/// Errors raised while building a canvas or encoding a mission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid canvas height {0}, must be within 1..=65535")]
    InvalidHeight(usize),

    #[error("No glyph for character {0:?}")]
    UnknownGlyph(char),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rows 0-3 are reserved for protocol bookkeeping.
    #[error("Row {0} is inside the reserved region")]
    ReservedRegion(usize),

    #[error("Content does not fit in {height} rows")]
    ContentTooLong { height: usize },
}

/// Errors raised by the byte channel to the printer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Short write: wrote {written} of {expected} bytes")]
    WriteFailure { written: usize, expected: usize },

    /// The printer did not finish a read within the configured bound.
    #[error("Transport timeout after {0:?}")]
    ReadTimeout(Duration),

    #[error("Channel closed by device")]
    ChannelClosed,

    #[error("Invalid transport identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Device is offline")]
    DeviceOffline,

    #[error("Device is missing endpoint")]
    MissingEndpoint,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ReadTimeout(_) | Self::WriteFailure { .. } => true,
            Self::Usb(rusb::Error::Timeout) | Self::Usb(rusb::Error::Busy) => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Errors raised when bytes from the printer do not follow the wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No acknowledgment among the chunks read for one mission.
    #[error("Unexpected response from printer after {chunks} chunks: {last:02X?}")]
    UnexpectedResponse { chunks: usize, last: Vec<u8> },

    #[error("Malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("Frame payload of {0} bytes does not fit the length byte")]
    PayloadTooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_rejected_before_send() {
        let err: Error = ValidationError::ReservedRegion(2).into();
        assert!(err.is_rejected_before_send());
        assert!(!err.is_retryable());
    }

    #[test]
    fn timeouts_may_have_printed() {
        let err: Error = TransportError::ReadTimeout(Duration::from_millis(5)).into();
        assert!(!err.is_rejected_before_send());
        assert!(err.is_retryable());
    }

    #[test]
    fn closed_channel_is_not_retryable() {
        let err: Error = TransportError::ChannelClosed.into();
        assert!(!err.is_retryable());
    }
}
