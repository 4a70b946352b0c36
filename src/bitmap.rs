//! Random access reader for uncompressed BMP and binary Netpbm images.
//!
//! Only the header (and palette) is parsed up front. Pixel rows are read on
//! demand by seeking to the row and reading exactly one row's worth of bytes,
//! so a tall image never has to fit in memory.

use std::{
    convert::TryFrom,
    fs::File,
    io::{BufReader, ErrorKind, Read, Seek, SeekFrom},
    path::Path,
};

use log::debug;

use crate::error::Error;

/// Anything the reader can seek around in.
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek> ByteSource for T {}

/// Palette entry in BMP order: blue, green, red, reserved/alpha.
pub type Quad = [u8; 4];

const PBM_PALETTE: [Quad; 2] = [[0xFF, 0xFF, 0xFF, 0x00], [0x00, 0x00, 0x00, 0x00]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bmp,
    Pnm,
}

impl Format {
    /// Pick a parser from the file suffix, ignoring case.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("bmp") => Ok(Self::Bmp),
            Some("pbm") | Some("pgm") | Some("ppm") | Some("pnm") => Ok(Self::Pnm),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Open an image file, dispatching on its suffix.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Bitmap<BufReader<File>>, Error> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::FileMissing(path.to_path_buf()))
        }
        Err(e) => return Err(Error::Io(e)),
    };
    debug!("opening {} as {:?}", path.display(), format);
    Bitmap::from_source(BufReader::new(file), format)
}

/// An opened image.
///
/// The header fields are fixed at construction. The source keeps the read
/// cursor, which moves on every [`Bitmap::row`] call.
#[derive(Debug)]
pub struct Bitmap<S: ByteSource> {
    source: S,
    width: u32,
    height: u32,
    bits_per_pixel: u16,
    bytes_per_row: usize,
    stride: i64,
    data_start: u64,
    palette: Option<Vec<Quad>>,
}

impl<S: ByteSource> Bitmap<S> {
    pub fn from_source(source: S, format: Format) -> Result<Self, Error> {
        match format {
            Format::Bmp => Self::from_bmp(source),
            Format::Pnm => Self::from_pnm(source),
        }
    }

    /// Parse a Windows bitmap header.
    pub fn from_bmp(mut source: S) -> Result<Self, Error> {
        let mut header = [0u8; 34];
        source.seek(SeekFrom::Start(0))?;
        read_header(&mut source, &mut header)?;

        if &header[0..2] != b"BM" {
            return Err(Error::MalformedHeader("missing BM signature".to_string()));
        }

        let data_start = u32_at(&header, 10) as u64;
        let header_size = u32_at(&header, 14) as u64;
        let width = u32_at(&header, 18) as i32;
        let height = u32_at(&header, 22) as i32;
        let bits_per_pixel = match u16::from_le_bytes([header[28], header[29]]) {
            0 => 1,
            n => n,
        };
        let compression = u32_at(&header, 30);

        if compression != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "compressed BMP (method {})",
                compression
            )));
        }
        if !matches!(bits_per_pixel, 1 | 8 | 24) {
            return Err(Error::UnsupportedFormat(format!(
                "{} bits per pixel BMP",
                bits_per_pixel
            )));
        }
        if width <= 0 {
            return Err(Error::MalformedHeader(format!("width {}", width)));
        }
        if height == 0 {
            return Err(Error::MalformedHeader("zero height".to_string()));
        }

        let width = width as u32;
        let rows = height.unsigned_abs();
        let oversized = || too_large(width, rows, bits_per_pixel);
        let bits = bits_per_pixel as u64 * width as u64;
        let stride_abs = i64::try_from((bits + 31) / 32 * 4).map_err(|_| oversized())?;

        // Positive height means the last visual row is stored first.
        let (stride, data_start) = if height > 0 {
            let last = row_offset(data_start, stride_abs, rows - 1).ok_or_else(oversized)?;
            (-stride_abs, last)
        } else {
            (stride_abs, data_start)
        };
        let bytes_per_row = bytes_per_row(bits_per_pixel, width).ok_or_else(oversized)?;
        check_extent(data_start, stride, rows, bytes_per_row).ok_or_else(oversized)?;

        let palette = if bits_per_pixel <= 8 {
            let count = 1usize << bits_per_pixel;
            let mut raw = vec![0u8; 4 * count];
            source.seek(SeekFrom::Start(header_size + 14))?;
            read_header(&mut source, &mut raw)?;
            Some(
                raw.chunks_exact(4)
                    .map(|q| [q[0], q[1], q[2], q[3]])
                    .collect(),
            )
        } else {
            None
        };

        let bitmap = Bitmap {
            source,
            width,
            height: rows,
            bits_per_pixel,
            bytes_per_row,
            stride,
            data_start,
            palette,
        };
        debug!("bmp header {}", bitmap.describe());
        Ok(bitmap)
    }

    /// Parse a binary Netpbm header (P4, P5 or P6).
    pub fn from_pnm(mut source: S) -> Result<Self, Error> {
        source.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 2];
        read_header(&mut source, &mut magic)?;
        if magic[0] != b'P' {
            return Err(Error::MalformedHeader("missing P magic".to_string()));
        }

        let wanted = match magic[1] {
            b'4' => 2,
            b'5' | b'6' => 3,
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "Netpbm P{}",
                    char::from(other)
                )))
            }
        };

        let (tokens, data_start) = scan_tokens(&mut source, wanted)?;
        let width = tokens[0];
        let height = tokens[1];
        if width == 0 || height == 0 {
            return Err(Error::MalformedHeader(format!(
                "dimensions {}x{}",
                width, height
            )));
        }

        let (bits_per_pixel, palette) = match magic[1] {
            b'4' => (1, Some(PBM_PALETTE.to_vec())),
            channel => {
                let maxval = tokens[2];
                if maxval == 0 || maxval > 65535 {
                    return Err(Error::MalformedHeader(format!("maxval {}", maxval)));
                }
                // ceil(log2(maxval + 1))
                let depth = (32 - maxval.leading_zeros()) as u16;
                let channels = if channel == b'6' { 3 } else { 1 };
                (depth * channels, None)
            }
        };

        let oversized = || too_large(width, height, bits_per_pixel);
        let bytes_per_row = bytes_per_row(bits_per_pixel, width).ok_or_else(oversized)?;
        let stride = i64::try_from(bytes_per_row).map_err(|_| oversized())?;
        check_extent(data_start, stride, height, bytes_per_row).ok_or_else(oversized)?;

        let bitmap = Bitmap {
            source,
            width,
            height,
            bits_per_pixel,
            bytes_per_row,
            stride,
            data_start,
            palette,
        };
        debug!("pnm header {}", bitmap.describe());
        Ok(bitmap)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits_per_pixel(&self) -> u16 {
        self.bits_per_pixel
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Byte distance between consecutive visual rows; negative for bottom-up files.
    pub fn stride(&self) -> i64 {
        self.stride
    }

    /// Offset of visual row 0.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    pub fn palette(&self) -> Option<&[Quad]> {
        self.palette.as_deref()
    }

    pub fn is_bottom_up(&self) -> bool {
        self.stride < 0
    }

    /// Read visual row `y`, 0 being the top of the picture.
    ///
    /// The buffer only grows as bytes arrive, so a header promising huge rows
    /// in a short file fails with an I/O error instead of a huge allocation.
    pub fn row(&mut self, y: u32) -> Result<Vec<u8>, Error> {
        self.seek_row(y)?;
        let wanted = self.bytes_per_row;
        let mut buf = Vec::new();
        (&mut self.source)
            .take(wanted as u64)
            .read_to_end(&mut buf)?;
        if buf.len() < wanted {
            return Err(Error::Io(ErrorKind::UnexpectedEof.into()));
        }
        Ok(buf)
    }

    /// Same as [`Bitmap::row`] but into a caller supplied buffer of at least
    /// `bytes_per_row` bytes.
    pub fn read_row_into(&mut self, y: u32, buf: &mut [u8]) -> Result<(), Error> {
        let wanted = self.bytes_per_row;
        if buf.len() < wanted {
            return Err(Error::RowBuffer {
                len: buf.len(),
                required: wanted,
            });
        }
        self.seek_row(y)?;
        self.source.read_exact(&mut buf[..wanted])?;
        Ok(())
    }

    fn seek_row(&mut self, y: u32) -> Result<(), Error> {
        if y >= self.height {
            return Err(Error::RowOutOfRange {
                row: y,
                height: self.height,
            });
        }
        let offset = row_offset(self.data_start, self.stride, y).ok_or_else(|| {
            Error::MalformedHeader(format!("row {} lies outside any file offset", y))
        })?;
        self.source.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn describe(&self) -> String {
        format!(
            "{}x{} {}bpp row {} stride {} data @{}",
            self.width,
            self.height,
            self.bits_per_pixel,
            self.bytes_per_row,
            self.stride,
            self.data_start
        )
    }
}

fn bytes_per_row(bits_per_pixel: u16, width: u32) -> Option<usize> {
    usize::try_from((bits_per_pixel as u64 * width as u64 + 7) / 8).ok()
}

fn too_large(width: u32, height: u32, bits_per_pixel: u16) -> Error {
    Error::MalformedHeader(format!(
        "{}x{} at {} bpp does not fit in a file",
        width, height, bits_per_pixel
    ))
}

/// Offset of visual row `y`, `None` if it falls outside `0..=i64::MAX`.
fn row_offset(data_start: u64, stride: i64, y: u32) -> Option<u64> {
    let start = i64::try_from(data_start).ok()?;
    let offset = stride.checked_mul(y as i64)?.checked_add(start)?;
    u64::try_from(offset).ok()
}

/// Both the first and the last visual row must end at a valid offset.
fn check_extent(data_start: u64, stride: i64, height: u32, bytes_per_row: usize) -> Option<()> {
    for &y in &[0, height - 1] {
        let end = row_offset(data_start, stride, y)?.checked_add(bytes_per_row as u64)?;
        i64::try_from(end).ok()?;
    }
    Some(())
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// `read_exact` that reports a short read as a broken header.
fn read_header<S: Read>(source: &mut S, buf: &mut [u8]) -> Result<(), Error> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::MalformedHeader("unexpected end of file".to_string())
        } else {
            Error::Io(e)
        }
    })
}

/// Collect `wanted` decimal header tokens after the magic.
///
/// Returns the tokens and the offset of the first pixel byte, which is the
/// byte right after the whitespace ending the last token.
fn scan_tokens<S: Read>(source: &mut S, wanted: usize) -> Result<(Vec<u32>, u64), Error> {
    let mut tokens = Vec::with_capacity(wanted);
    let mut current: Option<u32> = None;
    let mut in_comment = false;
    let mut pos: u64 = 2;

    for byte in source.bytes() {
        let byte = byte?;
        pos += 1;

        if in_comment {
            if byte == b'\n' || byte == b'\r' {
                in_comment = false;
                if tokens.len() == wanted {
                    return Ok((tokens, pos));
                }
            }
            continue;
        }

        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u32;
                let value = current
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(|| Error::MalformedHeader("header value overflow".to_string()))?;
                current = Some(value);
            }
            b'#' => {
                if let Some(value) = current.take() {
                    tokens.push(value);
                }
                in_comment = true;
            }
            b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c' => {
                if let Some(value) = current.take() {
                    tokens.push(value);
                    if tokens.len() == wanted {
                        return Ok((tokens, pos));
                    }
                }
            }
            other => {
                return Err(Error::MalformedHeader(format!(
                    "unexpected byte {:#04x} in header",
                    other
                )))
            }
        }
    }

    Err(Error::MalformedHeader("unexpected end of file".to_string()))
}
