//! Pick an image, check it fits the paper, and stream it to the printer.

use log::{debug, info, warn};
use std::{
    convert::TryFrom,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    bitmap::{self, Bitmap, ByteSource, Quad},
    error::Error,
    printer::{Printer, Transport},
};

/// Dots across the print head.
pub const PRINTER_WIDTH: u32 = 384;

/// Blank rows needed to push the last printed row past the tear bar.
pub const TEAR_OFF_ROWS: u16 = 80;

pub const ENV_IMAGE_DIR: &str = "CATPRINT_IMAGE_DIR";
pub const ENV_TEAR_OFF: &str = "CATPRINT_TEAR_OFF";
pub const ENV_ENERGY: &str = "CATPRINT_ENERGY";
pub const ENV_QUALITY: &str = "CATPRINT_QUALITY";
pub const ENV_COMPRESS: &str = "CATPRINT_COMPRESS";
pub const ENV_TRIM: &str = "CATPRINT_TRIM";
pub const ENV_LATTICE: &str = "CATPRINT_LATTICE";

/// How paper is advanced after the last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TearOff {
    /// Print this many empty rows.
    BlankRows(u16),
    /// Send a single feed command.
    Feed(u16),
}

impl Default for TearOff {
    fn default() -> Self {
        TearOff::BlankRows(TEAR_OFF_ROWS)
    }
}

impl FromStr for TearOff {
    type Err = Error;

    /// `blank:<rows>` or `feed:<lines>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidConfig(format!("tear off {:?}", s));
        let mut parts = s.trim().splitn(2, ':');
        let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
        let count = parts
            .next()
            .ok_or_else(invalid)
            .and_then(|n| parse_number(n).ok_or_else(invalid))?;
        let count = u16::try_from(count).map_err(|_| invalid())?;
        match kind.as_str() {
            "blank" => Ok(TearOff::BlankRows(count)),
            "feed" => Ok(TearOff::Feed(count)),
            _ => Err(invalid()),
        }
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// `1/true/yes/on` or `0/false/no/off`, ignoring case.
fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    image_dir: PathBuf,
    required_width: u32,
    tear_off: TearOff,
    energy: Option<u16>,
    quality: Option<u8>,
    compress: bool,
    trim: bool,
    lattice: bool,
}

impl Config {
    /// Images are looked up in `image_dir`. Everything else has defaults:
    /// 384 px wide images, 80 blank rows after each print, and the printer's
    /// own energy and quality settings. Rows go out uncompressed, every row
    /// is printed and no lattice frames are sent.
    pub fn new<P: Into<PathBuf>>(image_dir: P) -> Config {
        Config {
            image_dir: image_dir.into(),
            required_width: PRINTER_WIDTH,
            tear_off: TearOff::default(),
            energy: None,
            quality: None,
            compress: false,
            trim: false,
            lattice: false,
        }
    }

    /// Read `CATPRINT_*` variables from the process environment.
    pub fn from_env() -> Result<Config, Error> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from any variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Config, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::new(lookup(ENV_IMAGE_DIR).unwrap_or_else(|| ".".to_string()));

        if let Some(tear_off) = lookup(ENV_TEAR_OFF) {
            config = config.tear_off(tear_off.parse()?);
        }
        if let Some(energy) = lookup(ENV_ENERGY) {
            let value = parse_number(&energy)
                .and_then(|v| u16::try_from(v).ok())
                .ok_or_else(|| Error::InvalidConfig(format!("{}={}", ENV_ENERGY, energy)))?;
            config = config.energy(value);
        }
        if let Some(quality) = lookup(ENV_QUALITY) {
            let value = parse_number(&quality)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| Error::InvalidConfig(format!("{}={}", ENV_QUALITY, quality)))?;
            config = config.quality(value);
        }

        let flag = |key: &str| match lookup(key) {
            Some(value) => parse_flag(&value)
                .map(Some)
                .ok_or_else(|| Error::InvalidConfig(format!("{}={}", key, value))),
            None => Ok(None),
        };
        if let Some(on) = flag(ENV_COMPRESS)? {
            config = config.compress(on);
        }
        if let Some(on) = flag(ENV_TRIM)? {
            config = config.trim(on);
        }
        if let Some(on) = flag(ENV_LATTICE)? {
            config = config.lattice(on);
        }
        debug!("{:?}", config);
        Ok(config)
    }

    pub fn required_width(self, width: u32) -> Self {
        Config {
            required_width: width,
            ..self
        }
    }

    pub fn tear_off(self, tear_off: TearOff) -> Self {
        Config { tear_off, ..self }
    }

    pub fn energy(self, energy: u16) -> Self {
        Config {
            energy: Some(energy),
            ..self
        }
    }

    pub fn quality(self, quality: u8) -> Self {
        Config {
            quality: Some(quality),
            ..self
        }
    }

    /// Send rows as colour runs where that is shorter.
    pub fn compress(self, compress: bool) -> Self {
        Config { compress, ..self }
    }

    /// Stop after the last row with ink on it.
    pub fn trim(self, trim: bool) -> Self {
        Config { trim, ..self }
    }

    /// Wrap each picture in lattice start and end frames.
    pub fn lattice(self, lattice: bool) -> Self {
        Config { lattice, ..self }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Next,
    Confirm,
}

/// Where selection events come from.
///
/// `None` means the input is closed and selection should give up. Any
/// iterator of events is an input, which keeps scripted tests short.
pub trait Input {
    fn next_event(&mut self) -> Option<InputEvent>;
}

impl<I: Iterator<Item = InputEvent>> Input for I {
    fn next_event(&mut self) -> Option<InputEvent> {
        self.next()
    }
}

/// Somewhere to put a human readable status line.
pub trait StatusDisplay {
    fn show(&mut self, status: &str);
}

/// Keeps every status line, newest last.
impl StatusDisplay for Vec<String> {
    fn show(&mut self, status: &str) {
        self.push(status.to_string());
    }
}

/// Sends status lines to the log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&mut self, status: &str) {
        info!("{}", status);
    }
}

/// Whether a file name is offered for printing.
pub fn eligible(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".pbm") || lower.ends_with(".bmp")
}

/// True when palette entry 0 is black, meaning a 0 bit is a dark pixel and
/// rows must be complemented before they reach the print head.
pub fn palette_starts_black(palette: Option<&[Quad]>) -> bool {
    match palette.and_then(|p| p.first()) {
        Some(entry) => entry[..3] == [0, 0, 0],
        None => false,
    }
}

pub fn invert_row(row: &mut [u8]) {
    for b in row.iter_mut() {
        *b = !*b;
    }
}

/// Number of rows up to and including the last one with ink, scanning from
/// the bottom. `row` is scratch space of one row.
fn inked_rows<S: ByteSource>(
    image: &mut Bitmap<S>,
    invert: bool,
    row: &mut [u8],
) -> Result<u32, Error> {
    for y in (0..image.height()).rev() {
        image.read_row_into(y, row)?;
        let blank = if invert {
            row.iter().all(|&b| b == 0xFF)
        } else {
            row.iter().all(|&b| b == 0)
        };
        if !blank {
            return Ok(y + 1);
        }
    }
    Ok(0)
}

pub struct Session<I: Input, D: StatusDisplay> {
    config: Config,
    candidates: Vec<String>,
    cursor: usize,
    input: I,
    display: D,
    last_error: Option<String>,
}

impl<I: Input, D: StatusDisplay> Session<I, D> {
    /// List printable images in the configured directory.
    pub fn scan(config: Config, input: I, display: D) -> Result<Self, Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(config.image_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => debug!("skipping non UTF-8 name {:?}", name),
            }
        }
        Ok(Self::with_candidates(config, names, input, display))
    }

    /// Use the given names instead of reading the directory. Ineligible names
    /// are dropped.
    pub fn with_candidates(config: Config, names: Vec<String>, input: I, display: D) -> Self {
        let mut candidates: Vec<String> = names.into_iter().filter(|n| eligible(n)).collect();
        candidates.sort();
        candidates.dedup();
        info!(
            "{} printable images in {}",
            candidates.len(),
            config.image_dir().display()
        );
        Session {
            config,
            candidates,
            cursor: 0,
            input,
            display,
            last_error: None,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Message of the last failed print, cleared by a successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Let the user step through the candidates until one is confirmed.
    pub fn select(&mut self) -> Option<String> {
        if self.candidates.is_empty() {
            self.display.show("No printable images");
            return None;
        }
        if self.cursor >= self.candidates.len() {
            self.cursor = 0;
        }

        loop {
            let name = &self.candidates[self.cursor];
            self.display.show(&format!(
                "{} ({}/{})",
                name,
                self.cursor + 1,
                self.candidates.len()
            ));
            match self.input.next_event() {
                Some(InputEvent::Next) => {
                    self.cursor = (self.cursor + 1) % self.candidates.len();
                }
                Some(InputEvent::Confirm) => return Some(name.clone()),
                None => return None,
            }
        }
    }

    /// Print one image.
    ///
    /// The image is validated before anything is sent, so a rejected file
    /// never wastes paper. A failure half way through leaves whatever was
    /// already printed on the paper.
    pub fn print<T: Transport>(
        &mut self,
        filename: &str,
        printer: &mut Printer<T>,
    ) -> Result<(), Error> {
        let path = self.config.image_dir.join(filename);
        let mut image = bitmap::open(&path)?;

        let required = self.config.required_width;
        if image.width() != required || image.bits_per_pixel() != 1 {
            return Err(Error::UnsupportedImage {
                width: image.width(),
                bits_per_pixel: image.bits_per_pixel(),
                required,
            });
        }

        let invert = palette_starts_black(image.palette());
        info!(
            "printing {} ({} rows{})",
            filename,
            image.height(),
            if invert { ", inverted" } else { "" }
        );

        if let Some(energy) = self.config.energy {
            printer.set_energy(energy)?;
        }
        if let Some(quality) = self.config.quality {
            printer.set_quality(quality)?;
        }
        if self.config.lattice {
            printer.start_lattice()?;
        }

        let mut row = vec![0u8; image.bytes_per_row()];
        let rows = if self.config.trim {
            inked_rows(&mut image, invert, &mut row)?
        } else {
            image.height()
        };
        if rows < image.height() {
            debug!("skipping {} blank rows", image.height() - rows);
        }
        for y in 0..rows {
            image.read_row_into(y, &mut row)?;
            if invert {
                invert_row(&mut row);
            }
            self.send_row(printer, &row)?;
        }

        self.tear_off(printer)?;
        if self.config.lattice {
            printer.end_lattice()?;
        }
        Ok(())
    }

    fn send_row<T: Transport>(&self, printer: &mut Printer<T>, row: &[u8]) -> Result<(), Error> {
        if self.config.compress {
            printer.write_bitmap_row_compressed(row)
        } else {
            printer.write_bitmap_row(row, true)
        }
    }

    fn tear_off<T: Transport>(&self, printer: &mut Printer<T>) -> Result<(), Error> {
        match self.config.tear_off {
            TearOff::BlankRows(rows) => {
                let blank = vec![0u8; (self.config.required_width as usize + 7) / 8];
                for _ in 0..rows {
                    self.send_row(printer, &blank)?;
                }
                Ok(())
            }
            TearOff::Feed(lines) => printer.feed(lines),
        }
    }

    /// Select and print until the input closes.
    ///
    /// Images that can never print are reported and dropped from the list.
    /// Read and transport failures are reported and the image stays, so the
    /// user can retry. Only caller bugs end the loop with an error.
    pub fn run<T: Transport>(&mut self, printer: &mut Printer<T>) -> Result<(), Error> {
        while let Some(name) = self.select() {
            self.display.show(&format!("Printing {}", name));
            match self.print(&name, printer) {
                Ok(()) => {
                    self.last_error = None;
                    self.display.show(&format!("Printed {}", name));
                }
                Err(err) if err.is_programming_error() => return Err(err),
                Err(err) => {
                    let message = format!("{}: {}", name, err);
                    warn!("{}", message);
                    self.display.show(&message);
                    if err.is_unusable_image() {
                        self.remove(&name);
                    }
                    self.last_error = Some(message);
                }
            }
        }
        Ok(())
    }

    fn remove(&mut self, name: &str) {
        if let Some(index) = self.candidates.iter().position(|n| n == name) {
            self.candidates.remove(index);
            if self.cursor > index {
                self.cursor -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_names() {
        assert!(eligible("cat.pbm"));
        assert!(eligible("CAT.BMP"));
        assert!(!eligible(".hidden.pbm"));
        assert!(!eligible("notes.txt"));
        assert!(!eligible("photo.png"));
        assert!(!eligible("gray.pgm"));
    }

    #[test]
    fn candidates_are_filtered_and_sorted() {
        let session = Session::with_candidates(
            Config::new("."),
            vec![
                "b.pbm".to_string(),
                "._b.pbm".to_string(),
                "a.BMP".to_string(),
                "c.jpg".to_string(),
            ],
            std::iter::empty::<InputEvent>(),
            Vec::<String>::new(),
        );
        assert_eq!(session.candidates(), &["a.BMP".to_string(), "b.pbm".to_string()]);
    }

    #[test]
    fn select_walks_and_wraps() {
        let events = vec![
            InputEvent::Next,
            InputEvent::Next,
            InputEvent::Next,
            InputEvent::Confirm,
        ];
        let mut session = Session::with_candidates(
            Config::new("."),
            vec!["a.pbm".into(), "b.pbm".into(), "c.pbm".into()],
            events.into_iter(),
            Vec::<String>::new(),
        );
        assert_eq!(session.select(), Some("a.pbm".to_string()));
        assert_eq!(session.display().last().unwrap(), "a.pbm (1/3)");
    }

    #[test]
    fn select_gives_up_when_input_closes() {
        let mut session = Session::with_candidates(
            Config::new("."),
            vec!["a.pbm".into()],
            vec![InputEvent::Next].into_iter(),
            Vec::<String>::new(),
        );
        assert_eq!(session.select(), None);

        let mut empty = Session::with_candidates(
            Config::new("."),
            Vec::new(),
            vec![InputEvent::Confirm].into_iter(),
            Vec::<String>::new(),
        );
        assert_eq!(empty.select(), None);
        assert_eq!(empty.display(), &vec!["No printable images".to_string()]);
    }

    #[test]
    fn palette_black_detection() {
        assert!(palette_starts_black(Some(&[[0, 0, 0, 0xFF], [0xFF; 4]])));
        assert!(!palette_starts_black(Some(&[[0xFF, 0xFF, 0xFF, 0], [0; 4]])));
        assert!(!palette_starts_black(None));
        assert!(!palette_starts_black(Some(&[])));
    }

    #[test]
    fn invert_complements_bytes() {
        let mut row = [0x00, 0xFF, 0xA5];
        invert_row(&mut row);
        assert_eq!(row, [0xFF, 0x00, 0x5A]);
    }

    #[test]
    fn tear_off_parsing() {
        assert_eq!("blank:80".parse::<TearOff>().unwrap(), TearOff::BlankRows(80));
        assert_eq!("FEED:0x20".parse::<TearOff>().unwrap(), TearOff::Feed(32));
        assert!("feed".parse::<TearOff>().is_err());
        assert!("roll:3".parse::<TearOff>().is_err());
        assert!("feed:70000".parse::<TearOff>().is_err());
    }

    #[test]
    fn config_from_vars() {
        let config = Config::from_vars(|key| match key {
            ENV_IMAGE_DIR => Some("/media/images".to_string()),
            ENV_TEAR_OFF => Some("feed:100".to_string()),
            ENV_ENERGY => Some("0x3E80".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.image_dir(), Path::new("/media/images"));
        assert_eq!(config.tear_off, TearOff::Feed(100));
        assert_eq!(config.energy, Some(0x3E80));
        assert_eq!(config.quality, None);
        assert_eq!(config.required_width, PRINTER_WIDTH);

        let bad = Config::from_vars(|key| match key {
            ENV_QUALITY => Some("300".to_string()),
            _ => None,
        });
        assert!(matches!(bad, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn config_flags_from_vars() {
        let config = Config::from_vars(|key| match key {
            ENV_COMPRESS => Some("yes".to_string()),
            ENV_TRIM => Some("1".to_string()),
            ENV_LATTICE => Some("Off".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(config.compress);
        assert!(config.trim);
        assert!(!config.lattice);

        let bad = Config::from_vars(|key| match key {
            ENV_TRIM => Some("maybe".to_string()),
            _ => None,
        });
        assert!(matches!(bad, Err(Error::InvalidConfig(_))));
    }
}
