//! Command frames understood by the printer.
//!
//! Every frame has the same shape:
//!
//! ```text
//! 51 78 <cmd> 00 <len_lo> <len_hi> <payload ...> <crc8> FF
//! ```
//!
//! where the checksum covers the payload only. The codec has no state.

use std::io::Read;

use log::trace;

use crate::{
    error::Error,
    tables::{crc8, CRC8, MIRROR},
};

pub const MAGIC: [u8; 2] = [0x51, 0x78];
pub const TERMINATOR: u8 = 0xFF;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 112;

/// Bytes in a frame besides the payload.
pub const FRAME_OVERHEAD: usize = 8;

/// Switch the printer into text mode.
pub const CMD_MODE_TEXT: [u8; 9] = [0x51, 0x78, 0xBE, 0x00, 0x01, 0x00, 0x01, 0x07, 0xFF];

/// Switch the printer into bitmap mode.
pub const CMD_MODE_BITMAP: [u8; 9] = [0x51, 0x78, 0xBE, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF];

/// Lattice payload sent before the first row of a picture.
pub const LATTICE_START: [u8; 11] = [
    0xAA, 0x55, 0x17, 0x38, 0x44, 0x5F, 0x5F, 0x5F, 0x44, 0x38, 0x2C,
];

/// Lattice payload sent after the last row of a picture.
pub const LATTICE_END: [u8; 11] = [
    0xAA, 0x55, 0x17, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17,
];

const FEED_TEMPLATE: [u8; 10] = [0x51, 0x78, 0xA1, 0x00, 0x02, 0x00, 0x1E, 0x5A, 0xFF, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Feed,
    Print,
    /// Print one row sent as colour runs, see [`encode_runs`].
    PrintCompressed,
    Quality,
    Lattice,
    Energy,
    DrawingMode,
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Self::Feed => 0xA1,
            Self::Print => 0xA2,
            Self::PrintCompressed => 0xBF,
            Self::Quality => 0xA4,
            Self::Lattice => 0xA6,
            Self::Energy => 0xAF,
            Self::DrawingMode => 0xBE,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0xA1 => Some(Self::Feed),
            0xA2 => Some(Self::Print),
            0xBF => Some(Self::PrintCompressed),
            0xA4 => Some(Self::Quality),
            0xA6 => Some(Self::Lattice),
            0xAF => Some(Self::Energy),
            0xBE => Some(Self::DrawingMode),
            _ => None,
        }
    }
}

/// An encoded frame living on the stack.
#[derive(Clone)]
pub struct FrameBuf {
    buf: [u8; MAX_PAYLOAD + FRAME_OVERHEAD],
    len: usize,
}

impl FrameBuf {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for FrameBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameBuf({:02X?})", self.as_bytes())
    }
}

fn encode(cmd: Command, payload: &[u8], mirror: bool) -> Result<FrameBuf, Error> {
    let len = payload.len();
    if len == 0 || len > MAX_PAYLOAD {
        return Err(Error::PayloadLength(len));
    }

    let mut frame = FrameBuf {
        buf: [0u8; MAX_PAYLOAD + FRAME_OVERHEAD],
        len: len + FRAME_OVERHEAD,
    };
    let buf = &mut frame.buf;
    buf[0] = MAGIC[0];
    buf[1] = MAGIC[1];
    buf[2] = cmd.code();
    buf[3] = 0x00;
    buf[4] = (len & 0xFF) as u8;
    buf[5] = (len >> 8) as u8;

    let mut crc = 0u8;
    for (dst, &b) in buf[6..6 + len].iter_mut().zip(payload) {
        let b = if mirror { MIRROR[b as usize] } else { b };
        *dst = b;
        crc = CRC8[(crc ^ b) as usize];
    }
    buf[6 + len] = crc;
    buf[7 + len] = TERMINATOR;

    trace!("frame {:?} len {}", cmd, len);
    Ok(frame)
}

/// A print data frame.
///
/// With `mirror` set every payload byte is bit-reversed on the way out, which
/// is what bitmap rows need. Text goes out verbatim.
pub fn data_frame(payload: &[u8], mirror: bool) -> Result<FrameBuf, Error> {
    encode(Command::Print, payload, mirror)
}

/// Any command with an arbitrary payload, never mirrored.
pub fn command_frame(cmd: Command, payload: &[u8]) -> Result<FrameBuf, Error> {
    encode(cmd, payload, false)
}

/// Feed `lines` dot rows of paper.
pub fn feed_frame(lines: u16) -> [u8; 10] {
    let mut frame = FEED_TEMPLATE;
    let [lo, hi] = lines.to_le_bytes();
    frame[6] = lo;
    frame[7] = hi;
    frame[8] = crc8(&frame[6..8]);
    frame
}

/// Run-length encode a row for [`Command::PrintCompressed`].
///
/// Pixels are taken most significant bit first, the order they have in BMP
/// and PBM files. Each output byte holds the colour in bit 7 and a run of
/// 1..=127 pixels in the low bits. Returns `None` for an empty row, or when
/// more than `limit` runs would be needed; such rows go out uncompressed.
pub fn encode_runs(row: &[u8], limit: usize) -> Option<Vec<u8>> {
    let mut runs: Vec<u8> = Vec::with_capacity(limit.min(row.len() * 8));
    for &byte in row {
        for shift in (0..8).rev() {
            let bit = (byte >> shift) & 0x01;
            match runs.last_mut() {
                Some(run) if *run >> 7 == bit && *run & 0x7F < 0x7F => *run += 1,
                _ => {
                    if runs.len() == limit {
                        return None;
                    }
                    runs.push(bit << 7 | 1);
                }
            }
        }
    }
    if runs.is_empty() {
        None
    } else {
        Some(runs)
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.command)
    }

    /// Decode the frame at the start of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied.
    pub fn parse(buf: &[u8]) -> Result<(Frame, usize), Error> {
        if buf.len() < FRAME_OVERHEAD {
            return Err(Error::InvalidFrame("truncated"));
        }
        if buf[0..2] != MAGIC {
            return Err(Error::InvalidFrame("bad magic"));
        }
        if buf[3] != 0x00 {
            return Err(Error::InvalidFrame("reserved byte is not zero"));
        }
        let len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
        let total = len + FRAME_OVERHEAD;
        if buf.len() < total {
            return Err(Error::InvalidFrame("truncated"));
        }
        let payload = &buf[6..6 + len];
        let expected = crc8(payload);
        let actual = buf[6 + len];
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        if buf[7 + len] != TERMINATOR {
            return Err(Error::InvalidFrame("missing terminator"));
        }

        Ok((
            Frame {
                command: buf[2],
                payload: payload.to_vec(),
            },
            total,
        ))
    }
}

/// Reads consecutive frames out of a captured byte stream.
pub struct FrameReader<R: Read> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader { inner }
    }

    /// Next frame, or `None` at a clean end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut header = [0u8; 6];
        let mut filled = 0;
        while filled < header.len() {
            match self.inner.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(Error::InvalidFrame("truncated")),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let len = u16::from_le_bytes([header[4], header[5]]) as usize;
        let mut buf = Vec::with_capacity(len + FRAME_OVERHEAD);
        buf.extend_from_slice(&header);
        buf.resize(len + FRAME_OVERHEAD, 0);
        self.inner.read_exact(&mut buf[6..]).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::InvalidFrame("truncated")
            } else {
                Error::Io(e)
            }
        })?;

        Frame::parse(&buf).map(|(frame, _)| Some(frame))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
