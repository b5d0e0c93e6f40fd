//! Printer wire format.
//!
//! Every frame is `AA AA | LEN | CMD | PAYLOAD | 55 55`, where `LEN` counts
//! the command byte plus the payload. A print job is a fixed six frame
//! header, one row frame per canvas row and a fixed two frame footer. When
//! the paper has been fed the printer answers with [`ACK`].

use crate::{
    canvas::{Canvas, Row, ROW_BYTES},
    error::ProtocolError,
};

/// Start of every frame.
pub const SYNC: [u8; 2] = [0xAA, 0xAA];

/// End of every frame, also the read delimiter.
pub const TERM: [u8; 2] = [0x55, 0x55];

/// Sent by the printer once a job has been printed.
pub const ACK: [u8; 18] = [
    0xAA, 0xAA, 0x0D, 0x01, 0x30, 0x00, 0x80, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x34,
    0x01, 0x55, 0x55,
];

const CMD_PRINT_SETUP: u8 = 0x02;
const CMD_ROW: u8 = 0x03;

/// Single-byte frames of the header and footer: the code is the command
/// and the payload is empty.
const CTRL_RESET: u8 = 0x01;
const CTRL_WAKE: u8 = 0xAC;
const CTRL_BEGIN: u8 = 0x04;

const PRINT_SETUP: [u8; 7] = [0xB6, 0x00, 0x00, 0x00, 0x00, 0x01, 0x1B];

/// Rows carried by one row frame.
const ROWS_PER_FRAME: u8 = 0x01;

const OVERHEAD: usize = SYNC.len() + 1 + TERM.len();

/// Largest payload the length byte can describe next to the command byte.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - 1;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: u8,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: u8, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(payload.len()));
        }
        Ok(Frame { command, payload })
    }

    fn control(code: u8) -> Self {
        Frame {
            command: code,
            payload: Vec::new(),
        }
    }

    /// Frame carrying canvas row `index`.
    pub fn row(index: u16, data: &Row) -> Self {
        let mut payload = Vec::with_capacity(3 + ROW_BYTES);
        payload.extend_from_slice(&index.to_le_bytes());
        payload.push(ROWS_PER_FRAME);
        payload.extend_from_slice(data);
        Frame {
            command: CMD_ROW,
            payload,
        }
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size on the wire.
    pub fn encoded_len(&self) -> usize {
        OVERHEAD + 1 + self.payload.len()
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&SYNC);
        buf.push((1 + self.payload.len()) as u8);
        buf.push(self.command);
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&TERM);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode exactly one frame.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < OVERHEAD + 1 {
            return Err(ProtocolError::MalformedFrame("frame is too short"));
        }
        if bytes[..2] != SYNC {
            return Err(ProtocolError::MalformedFrame("missing sync marker"));
        }
        let len = bytes[2] as usize;
        if len == 0 || bytes.len() != OVERHEAD + len {
            return Err(ProtocolError::MalformedFrame("length byte does not match frame"));
        }
        if bytes[bytes.len() - 2..] != TERM {
            return Err(ProtocolError::MalformedFrame("missing terminator"));
        }
        Ok(Frame {
            command: bytes[3],
            payload: bytes[4..bytes.len() - 2].to_vec(),
        })
    }

    /// `true` if `bytes` is the printer's completion acknowledgment.
    pub fn is_ack(bytes: &[u8]) -> bool {
        bytes == ACK
    }
}

/// The six frames sent before any row data.
pub fn header() -> [Frame; 6] {
    [
        Frame::control(CTRL_RESET),
        Frame::control(CTRL_WAKE),
        Frame::control(CTRL_WAKE),
        Frame::control(CTRL_BEGIN),
        Frame::control(CTRL_RESET),
        Frame {
            command: CMD_PRINT_SETUP,
            payload: PRINT_SETUP.to_vec(),
        },
    ]
}

/// The two frames sent after the last row.
pub fn footer() -> [Frame; 2] {
    [Frame::control(CTRL_RESET), Frame::control(CTRL_RESET)]
}

/// Every frame of a job, in wire order.
pub fn frames(canvas: &Canvas) -> impl Iterator<Item = Frame> + '_ {
    let rows = canvas
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| Frame::row(i as u16, row));
    header().into_iter().chain(rows).chain(footer())
}

/// Encode `canvas` into a ready-to-send mission.
pub fn encode(canvas: &Canvas) -> Mission {
    let size = header().iter().map(Frame::encoded_len).sum::<usize>()
        + canvas.height() * (OVERHEAD + 4 + ROW_BYTES)
        + footer().iter().map(Frame::encoded_len).sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    for frame in frames(canvas) {
        frame.encode_into(&mut buf);
    }
    Mission(buf)
}

/// Split a byte stream into frames.
///
/// Trailing bytes that do not yet form a complete frame are returned
/// separately so the caller can wait for the rest.
pub fn split_frames(mut bytes: &[u8]) -> Result<(Vec<Frame>, &[u8]), ProtocolError> {
    let mut frames = Vec::new();
    loop {
        if bytes.len() < 3 {
            if !bytes.is_empty() && bytes[0] != SYNC[0] {
                return Err(ProtocolError::MalformedFrame("missing sync marker"));
            }
            return Ok((frames, bytes));
        }
        if bytes[..2] != SYNC {
            return Err(ProtocolError::MalformedFrame("missing sync marker"));
        }
        let end = OVERHEAD + bytes[2] as usize;
        if bytes.len() < end {
            return Ok((frames, bytes));
        }
        frames.push(Frame::parse(&bytes[..end])?);
        bytes = &bytes[end..];
    }
}

/// One fully encoded print job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mission(Vec<u8>);

impl Mission {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Mission {
    fn from(bytes: Vec<u8>) -> Self {
        Mission(bytes)
    }
}

impl From<&Canvas> for Mission {
    fn from(canvas: &Canvas) -> Self {
        encode(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [&[u8]; 6] = [
        &[0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55],
        &[0xAA, 0xAA, 0x01, 0xAC, 0x55, 0x55],
        &[0xAA, 0xAA, 0x01, 0xAC, 0x55, 0x55],
        &[0xAA, 0xAA, 0x01, 0x04, 0x55, 0x55],
        &[0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55],
        &[
            0xAA, 0xAA, 0x08, 0x02, 0xB6, 0x00, 0x00, 0x00, 0x00, 0x01, 0x1B, 0x55, 0x55,
        ],
    ];

    const FOOTER: [&[u8]; 2] = [
        &[0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55],
        &[0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55],
    ];

    #[test]
    fn header_and_footer_are_byte_exact() {
        for (frame, expected) in header().iter().zip(HEADER.iter()) {
            assert_eq!(frame.encode(), *expected);
        }
        for (frame, expected) in footer().iter().zip(FOOTER.iter()) {
            assert_eq!(frame.encode(), *expected);
        }
    }

    #[test]
    fn blank_single_row_canvas() {
        let canvas = Canvas::new(1).unwrap();
        let mission = encode(&canvas);

        let mut expected: Vec<u8> = HEADER.concat();
        expected.extend_from_slice(&[0xAA, 0xAA, 0x34, 0x03, 0x00, 0x00, 0x01]);
        expected.extend_from_slice(&[0x00; 48]);
        expected.extend_from_slice(&[0x55, 0x55]);
        expected.extend_from_slice(&FOOTER.concat());

        assert_eq!(mission.as_bytes(), expected.as_slice());
    }

    #[test]
    fn row_index_is_16_bit_little_endian() {
        let mut row = [0u8; ROW_BYTES];
        row[0] = 0x80;
        let bytes = Frame::row(0x0102, &row).encode();
        assert_eq!(bytes.len(), 57);
        assert_eq!(&bytes[..7], &[0xAA, 0xAA, 0x34, 0x03, 0x02, 0x01, 0x01]);
        assert_eq!(bytes[7], 0x80);
        assert_eq!(&bytes[55..], &TERM);

        let bytes = Frame::row(256, &[0u8; ROW_BYTES]).encode();
        assert_eq!(&bytes[4..6], &[0x00, 0x01]);
    }

    #[test]
    fn rows_follow_canvas_order() {
        let canvas = Canvas::new(300).unwrap();
        let rows: Vec<Frame> = frames(&canvas).skip(6).take(300).collect();
        for (i, frame) in rows.iter().enumerate() {
            assert_eq!(frame.command(), 0x03);
            let payload = frame.payload();
            assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), i as u16);
        }
        assert_eq!(frames(&canvas).count(), 6 + 300 + 2);
    }

    #[test]
    fn encoded_length_matches_capacity_estimate() {
        let canvas = Canvas::new(10).unwrap();
        let mission = encode(&canvas);
        assert_eq!(mission.len(), 5 * 6 + 13 + 10 * 57 + 2 * 6);
    }

    #[test]
    fn parses_ack() {
        let frame = Frame::parse(&ACK).unwrap();
        assert_eq!(frame.command(), 0x01);
        assert_eq!(frame.payload().len(), 12);
        assert!(Frame::is_ack(&ACK));
        assert!(!Frame::is_ack(&ACK[..16]));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(Frame::parse(&[0xAA, 0xAA, 0x01]).is_err());
        assert!(Frame::parse(&[0xAB, 0xAA, 0x01, 0x01, 0x55, 0x55]).is_err());
        assert!(Frame::parse(&[0xAA, 0xAA, 0x02, 0x01, 0x55, 0x55]).is_err());
        assert!(Frame::parse(&[0xAA, 0xAA, 0x01, 0x01, 0x55, 0x54]).is_err());
    }

    #[test]
    fn splits_a_mission_back_into_frames() {
        let mut canvas = Canvas::new(5).unwrap();
        canvas.set_pixel(7, 4, true).unwrap();
        let mission = encode(&canvas);

        let (decoded, rest) = split_frames(mission.as_bytes()).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, frames(&canvas).collect::<Vec<_>>());
        assert_eq!(decoded[6 + 4].payload()[3], 0x01);

        let (decoded, rest) = split_frames(&mission.as_bytes()[..20]).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(rest, &[0xAA, 0xAA]);
    }

    #[test]
    fn control_frames_carry_no_payload() {
        let header = header();
        for frame in &header[..5] {
            assert!(frame.payload().is_empty());
            assert_eq!(frame.encoded_len(), 6);
        }
        assert_eq!(header[1].encode(), vec![0xAA, 0xAA, 0x01, 0xAC, 0x55, 0x55]);
        assert_eq!(
            &encode(&Canvas::new(1).unwrap()).as_bytes()[..12],
            &[0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55, 0xAA, 0xAA, 0x01, 0xAC, 0x55, 0x55]
        );
    }

    #[test]
    fn payload_must_fit_the_length_byte() {
        let frame = Frame::new(0x02, vec![0x11; MAX_PAYLOAD]).unwrap();
        assert_eq!(frame.encode()[2], 0xFF);
        assert_eq!(
            Frame::new(0x02, vec![0x11; MAX_PAYLOAD + 1]),
            Err(ProtocolError::PayloadTooLong(MAX_PAYLOAD + 1))
        );
    }
}
