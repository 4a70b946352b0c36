//! Error types for bitmap decoding and printer communication.
//!
//! This module defines all possible errors that can occur while opening an
//! image, framing printer commands, or pushing bytes to a transport.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the crate.
///
/// The session orchestrator is the only place that turns these into user
/// facing strings, see [`Error::is_unusable_image`] and
/// [`Error::is_programming_error`].
#[derive(Error, Debug)]
pub enum Error {
    /// The image file does not exist.
    #[error("File not found: {0}")]
    FileMissing(PathBuf),

    /// The file suffix or magic number names a format this crate cannot read.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The header could not be parsed.
    #[error("Malformed image header: {0}")]
    MalformedHeader(String),

    /// The image decoded fine but the printer can not print it.
    ///
    /// The print head is a fixed number of dots wide and only 1-bit images
    /// are accepted.
    #[error("Image must be {required} px wide and 1 bit per pixel, got {width} px at {bits_per_pixel} bpp")]
    UnsupportedImage {
        width: u32,
        bits_per_pixel: u16,
        required: u32,
    },

    #[error("Row {row} is out of range for an image {height} rows high")]
    RowOutOfRange { row: u32, height: u32 },

    /// The buffer handed to a row read is shorter than a row.
    #[error("Row buffer holds {len} bytes, a row needs {required}")]
    RowBuffer { len: usize, required: usize },

    /// Reading pixel data failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The transport refused bytes.
    ///
    /// `accepted` is the number of bytes of the current frame the transport
    /// took before failing.
    #[error("Transport failed after {accepted} bytes: {source}")]
    TransportFailure {
        accepted: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame payload must be 1..=112 bytes, got {0}")]
    PayloadLength(usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(&'static str),

    #[error("Frame checksum mismatch: expected {expected:#04x}, found {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Invalid configuration parameter provided.
    #[error("Invalid configuration parameter: {0}")]
    InvalidConfig(String),

    /// USB communication error.
    ///
    /// Wraps underlying rusb errors for device communication issues,
    /// timeouts, or permission problems.
    #[error(transparent)]
    Usb(#[from] rusb::Error),

    /// Printer device is not connected or not responding.
    #[error("Device is offline")]
    DeviceOffline,

    #[error("Device is missing endpoint")]
    MissingEndpoint,
}

impl Error {
    /// The image can never be printed and should leave the candidate list.
    pub fn is_unusable_image(&self) -> bool {
        matches!(
            self,
            Self::FileMissing(_)
                | Self::UnsupportedFormat(_)
                | Self::MalformedHeader(_)
                | Self::UnsupportedImage { .. }
        )
    }

    /// Errors caused by the caller rather than the file or the device.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::RowOutOfRange { .. } | Self::RowBuffer { .. } | Self::PayloadLength(_)
        )
    }
}
