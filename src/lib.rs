//! Cat Thermal Printer Driver
//!
//! This crate prints 1-bit bitmaps and plain text on the small 384 dot BLE/USB
//! thermal printers (GB01, GB02, MX06 ...) that speak the `0x51 0x78` framed
//! protocol.
//!
//! * [`Bitmap`] opens BMP and binary Netpbm files and reads one row at a time.
//! * [`Printer`] frames rows and text into checksummed command packets and
//!   writes them to any [`Transport`].
//! * [`Session`] lets a user pick an image and prints it.
//!
//! # Example
//!
//! ```rust,no_run
//! use catprint::{open, Printer};
//!
//! let device = std::fs::OpenOptions::new().write(true).open("/dev/rfcomm0")?;
//! let mut printer = Printer::new(device);
//!
//! let mut image = open("cat.pbm")?;
//! for y in 0..image.height() {
//!     let row = image.row(y)?;
//!     printer.write_bitmap_row(&row, true)?;
//! }
//! printer.feed(80)?;
//! # Ok::<(), catprint::Error>(())
//! ```

mod bitmap;
mod error;
pub mod frame;
mod printer;
mod session;
pub mod tables;
mod usb;

pub use crate::{
    bitmap::{open, Bitmap, ByteSource, Format, Quad},
    error::Error,
    frame::{Command, Frame, FrameReader},
    printer::{Mode, Printer, Transport},
    session::{
        eligible, invert_row, palette_starts_black, Config, Input, InputEvent, LogDisplay,
        Session, StatusDisplay, TearOff, PRINTER_WIDTH, TEAR_OFF_ROWS,
    },
    usb::UsbTransport,
};

/// Bytes in one full-width row: 384 dots / 8 = 48.
pub const ROW_BYTES: usize = (PRINTER_WIDTH as usize + 7) / 8;
