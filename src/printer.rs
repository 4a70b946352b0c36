use log::{debug, trace};
use std::io::{self, Write};

use crate::{
    error::Error,
    frame::{
        self, Command, CMD_MODE_BITMAP, CMD_MODE_TEXT, LATTICE_END, LATTICE_START, MAX_PAYLOAD,
    },
};

/// A write-only byte sink the printer is attached to.
///
/// Every [`std::io::Write`] is a transport: a serial port, an RFCOMM device
/// node, a capture file, a `Vec<u8>` in tests, or a
/// [`UsbTransport`](crate::UsbTransport).
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

impl<W: Write> Transport for W {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut accepted = 0;
        while accepted < bytes.len() {
            match self.write(&bytes[accepted..]) {
                Ok(0) => {
                    debug!(
                        "write error: bytes wrote {} != bytes supplied {}",
                        accepted,
                        bytes.len()
                    );
                    return Err(Error::TransportFailure {
                        accepted,
                        source: io::ErrorKind::WriteZero.into(),
                    });
                }
                Ok(n) => accepted += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(Error::TransportFailure { accepted, source }),
            }
        }
        Ok(())
    }
}

/// What the printer does with the data frames it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    Bitmap,
}

impl Mode {
    fn switch_frame(self) -> &'static [u8] {
        match self {
            Self::Text => &CMD_MODE_TEXT,
            Self::Bitmap => &CMD_MODE_BITMAP,
        }
    }
}

/// Printer driver.
///
/// Tracks the mode the device was last put in and only sends a mode switch
/// when a write needs a different one. Nothing is buffered beyond the frame
/// being sent, and nothing is ever read back from the device.
pub struct Printer<T: Transport> {
    transport: T,
    mode: Option<Mode>,
}

impl<T: Transport> Printer<T> {
    /// The device mode is unknown until the first write.
    pub fn new(transport: T) -> Self {
        Printer {
            transport,
            mode: None,
        }
    }

    /// Last mode switch sent, `None` before the first write.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Print UTF-8 text, split into frames on byte boundaries.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        self.ensure_mode(Mode::Text)?;
        for chunk in text.as_bytes().chunks(MAX_PAYLOAD) {
            self.send_data(chunk, false)?;
        }
        Ok(())
    }

    /// Print text followed by a newline.
    pub fn write_line(&mut self, text: &str) -> Result<(), Error> {
        self.write_text(text)?;
        self.send_data(b"\n", false)
    }

    /// Print one raster row.
    ///
    /// Image files and the print head disagree on the bit order inside a
    /// byte, so `mirror` should stay `true` unless `row` was already
    /// bit-reversed.
    pub fn write_bitmap_row(&mut self, row: &[u8], mirror: bool) -> Result<(), Error> {
        self.ensure_mode(Mode::Bitmap)?;
        for chunk in row.chunks(MAX_PAYLOAD) {
            self.send_data(chunk, mirror)?;
        }
        Ok(())
    }

    /// Print one raster row as colour runs.
    ///
    /// `row` is in file bit order, like the rows handed to
    /// [`Printer::write_bitmap_row`] with `mirror` set. A row needing more runs
    /// than it has bytes gains nothing and is sent as a plain mirrored row.
    pub fn write_bitmap_row_compressed(&mut self, row: &[u8]) -> Result<(), Error> {
        let limit = row.len().min(MAX_PAYLOAD);
        match frame::encode_runs(row, limit) {
            Some(runs) => {
                self.ensure_mode(Mode::Bitmap)?;
                let frame = frame::command_frame(Command::PrintCompressed, &runs)?;
                trace!("compressed frame {:02X?}", frame.as_bytes());
                self.transport.send(frame.as_bytes())
            }
            None => self.write_bitmap_row(row, true),
        }
    }

    /// Lattice sequence that opens a picture.
    pub fn start_lattice(&mut self) -> Result<(), Error> {
        debug!("lattice start");
        let frame = frame::command_frame(Command::Lattice, &LATTICE_START)?;
        self.transport.send(frame.as_bytes())
    }

    /// Lattice sequence that closes a picture.
    pub fn end_lattice(&mut self) -> Result<(), Error> {
        debug!("lattice end");
        let frame = frame::command_frame(Command::Lattice, &LATTICE_END)?;
        self.transport.send(frame.as_bytes())
    }

    /// Roll `lines` dot rows of paper out. Works in either mode.
    pub fn feed(&mut self, lines: u16) -> Result<(), Error> {
        debug!("feed {} lines", lines);
        self.transport.send(&frame::feed_frame(lines))
    }

    /// Print head energy, higher is darker.
    pub fn set_energy(&mut self, energy: u16) -> Result<(), Error> {
        debug!("energy {:#06x}", energy);
        let frame = frame::command_frame(Command::Energy, &energy.to_le_bytes())?;
        self.transport.send(frame.as_bytes())
    }

    pub fn set_quality(&mut self, quality: u8) -> Result<(), Error> {
        debug!("quality {:#04x}", quality);
        let frame = frame::command_frame(Command::Quality, &[quality])?;
        self.transport.send(frame.as_bytes())
    }

    fn ensure_mode(&mut self, mode: Mode) -> Result<(), Error> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        debug!("switching to {:?} mode", mode);
        // a half written switch leaves the device mode unknown
        self.mode = None;
        self.transport.send(mode.switch_frame())?;
        self.mode = Some(mode);
        Ok(())
    }

    fn send_data(&mut self, payload: &[u8], mirror: bool) -> Result<(), Error> {
        let frame = frame::data_frame(payload, mirror)?;
        trace!("data frame {:02X?}", frame.as_bytes());
        self.transport.send(frame.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::crc8;

    /// Accepts `budget` bytes, then fails.
    struct Choke {
        budget: usize,
        written: Vec<u8>,
    }

    impl Write for Choke {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_line_hi() {
        let mut printer = Printer::new(Vec::new());
        printer.write_line("Hi").unwrap();

        let mut expected = CMD_MODE_TEXT.to_vec();
        expected.extend_from_slice(&[0x51, 0x78, 0xA2, 0x00, 0x02, 0x00, 0x48, 0x69]);
        expected.extend_from_slice(&[crc8(b"Hi"), 0xFF]);
        expected.extend_from_slice(&[0x51, 0x78, 0xA2, 0x00, 0x01, 0x00, 0x0A]);
        expected.extend_from_slice(&[crc8(b"\n"), 0xFF]);
        assert_eq!(printer.into_inner(), expected);
    }

    #[test]
    fn blank_bitmap_row() {
        let mut printer = Printer::new(Vec::new());
        printer.write_bitmap_row(&[0u8; 48], true).unwrap();
        assert_eq!(printer.mode(), Some(Mode::Bitmap));

        let out = printer.into_inner();
        assert_eq!(&out[..9], &CMD_MODE_BITMAP);
        assert_eq!(out.len(), 9 + 48 + 8);
        assert_eq!(&out[9..15], &[0x51, 0x78, 0xA2, 0x00, 48, 0x00]);
        assert!(out[15..63].iter().all(|&b| b == 0));
        assert_eq!(out[63], 0x00);
        assert_eq!(out[64], 0xFF);
    }

    #[test]
    fn blank_row_goes_out_compressed() {
        let mut printer = Printer::new(Vec::new());
        printer.write_bitmap_row_compressed(&[0u8; 48]).unwrap();
        assert_eq!(printer.mode(), Some(Mode::Bitmap));

        let out = printer.into_inner();
        assert_eq!(&out[..9], &CMD_MODE_BITMAP);
        let runs = [0x7F, 0x7F, 0x7F, 0x03];
        let mut expected = vec![0x51, 0x78, 0xBF, 0x00, 0x04, 0x00];
        expected.extend_from_slice(&runs);
        expected.extend_from_slice(&[crc8(&runs), 0xFF]);
        assert_eq!(&out[9..], &expected[..]);
    }

    #[test]
    fn busy_row_falls_back_to_plain_frame() {
        let mut printer = Printer::new(Vec::new());
        printer.write_text("x").unwrap();
        printer.write_bitmap_row_compressed(&[0xF0; 48]).unwrap();

        let out = printer.into_inner();
        let plain = 9 + 9 + 9;
        assert_eq!(&out[9 + 9..plain], &CMD_MODE_BITMAP);
        assert_eq!(&out[plain..plain + 6], &[0x51, 0x78, 0xA2, 0x00, 48, 0x00]);
        assert!(out[plain + 6..plain + 54].iter().all(|&b| b == 0x0F));
        assert_eq!(out.len(), plain + 48 + 8);
    }

    #[test]
    fn lattice_frames() {
        let mut printer = Printer::new(Vec::new());
        printer.start_lattice().unwrap();
        printer.end_lattice().unwrap();
        assert_eq!(printer.mode(), None);

        let out = printer.into_inner();
        assert_eq!(out.len(), 2 * (11 + 8));
        assert_eq!(&out[..6], &[0x51, 0x78, 0xA6, 0x00, 11, 0x00]);
        assert_eq!(&out[6..17], &LATTICE_START);
        assert_eq!(&out[25..36], &LATTICE_END);
    }

    #[test]
    fn mode_switch_only_at_transitions() {
        let mut printer = Printer::new(Vec::new());
        printer.write_bitmap_row(&[0x01; 4], true).unwrap();
        printer.write_bitmap_row(&[0x02; 4], true).unwrap();
        printer.write_text("x").unwrap();
        printer.write_text("y").unwrap();

        let out = printer.into_inner();
        let switches = out
            .windows(9)
            .filter(|w| *w == CMD_MODE_TEXT || *w == CMD_MODE_BITMAP)
            .count();
        assert_eq!(switches, 2);
        assert_eq!(&out[..9], &CMD_MODE_BITMAP);
        let text_switch = 9 + 2 * (4 + 8);
        assert_eq!(&out[text_switch..text_switch + 9], &CMD_MODE_TEXT);
    }

    #[test]
    fn long_rows_are_chunked() {
        let mut printer = Printer::new(Vec::new());
        let row: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        printer.write_bitmap_row(&row, false).unwrap();

        let out = printer.into_inner();
        let frames: Vec<_> = frame::FrameReader::new(&out[..])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1].payload.len(), 112);
        assert_eq!(frames[2].payload.len(), 112);
        assert_eq!(frames[3].payload.len(), 26);
        let joined: Vec<u8> = frames[1..].iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(joined, row);
    }

    #[test]
    fn empty_text_only_switches_mode() {
        let mut printer = Printer::new(Vec::new());
        printer.write_text("").unwrap();
        assert_eq!(printer.into_inner(), CMD_MODE_TEXT.to_vec());
    }

    #[test]
    fn feed_does_not_touch_mode() {
        let mut printer = Printer::new(Vec::new());
        printer.feed(80).unwrap();
        assert_eq!(printer.mode(), None);
        assert_eq!(printer.into_inner(), frame::feed_frame(80).to_vec());
    }

    #[test]
    fn energy_and_quality_frames() {
        let mut printer = Printer::new(Vec::new());
        printer.set_energy(0x3E80).unwrap();
        printer.set_quality(0x33).unwrap();
        let out = printer.into_inner();
        assert_eq!(
            &out[..10],
            &[0x51, 0x78, 0xAF, 0x00, 0x02, 0x00, 0x80, 0x3E, crc8(&[0x80, 0x3E]), 0xFF]
        );
        assert_eq!(
            &out[10..],
            &[0x51, 0x78, 0xA4, 0x00, 0x01, 0x00, 0x33, crc8(&[0x33]), 0xFF]
        );
    }

    #[test]
    fn transport_failure_reports_accepted_bytes() {
        let mut printer = Printer::new(Choke {
            budget: 12,
            written: Vec::new(),
        });
        let err = printer.write_bitmap_row(&[0xFF; 20], true).unwrap_err();
        match err {
            Error::TransportFailure { accepted, .. } => assert_eq!(accepted, 3),
            other => panic!("unexpected {:?}", other),
        }
        // the switch frame went through
        assert_eq!(printer.mode(), Some(Mode::Bitmap));
    }

    #[test]
    fn failed_switch_forgets_mode() {
        let mut printer = Printer::new(Choke {
            budget: 4,
            written: Vec::new(),
        });
        assert!(printer.write_text("a").is_err());
        assert_eq!(printer.mode(), None);
        assert_eq!(printer.transport().written, CMD_MODE_TEXT[..4].to_vec());
    }

    #[test]
    fn zero_length_write_is_a_failure() {
        struct Stuck;
        impl Write for Stuck {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut printer = Printer::new(Stuck);
        assert!(matches!(
            printer.feed(1),
            Err(Error::TransportFailure { accepted: 0, .. })
        ));
    }
}
