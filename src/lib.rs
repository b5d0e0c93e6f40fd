//! Guagua Thermal Printer Driver
//!
//! This crate turns text and grayscale images into print jobs for 384-dot
//! Guagua thermal printers and sends them over a serial/RFCOMM device or USB.
//!
//! # Example
//!
//! ```rust,no_run
//! use guagua::{print_job, Glyph, GlyphTable, Job, SessionConfig};
//!
//! let glyphs = GlyphTable::new().with('#', Glyph::from_packed(vec![vec![0xFF; 2]; 16]).unwrap());
//! print_job("/dev/rfcomm0", &Job::Text("###"), &glyphs, SessionConfig::default()).unwrap();
//! ```

mod canvas;
mod dither;
mod driver;
mod error;
mod glyph;
mod protocol;
mod retry;
mod session;
pub mod transport;

pub use crate::{
    canvas::{
        compute_required_height, Canvas, Cursor, Row, LINE_HEIGHT, MAX_HEIGHT, RESERVED_ROWS,
        ROW_BYTES, WIDTH_DOTS,
    },
    dither::{dither, dither_to_canvas, DitherOptions, Raster, DEFAULT_THRESHOLD},
    driver::{print_job, Job},
    error::{Error, ProtocolError, TransportError, ValidationError},
    glyph::{Glyph, GlyphTable},
    protocol::{
        encode, footer, frames, header, split_frames, Frame, Mission, ACK, MAX_PAYLOAD, SYNC, TERM,
    },
    retry::{calculate_backoff, submit_with_retry, RetryPolicy},
    session::{
        MissionQueue, Session, SessionConfig, SessionState, ShutdownMode, Ticket, TimeoutPolicy,
    },
    transport::Transport,
};

/// Type alias for 1-bit bitmap data.
///
/// Each inner `Vec<u8>` represents a single row of pixels, with 8 pixels
/// packed into each byte, most significant bit first. The outer Vec
/// represents multiple rows.
pub type Matrix = Vec<Vec<u8>>;
