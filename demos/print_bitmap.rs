use catprint::{Config, InputEvent, LogDisplay, Printer, Session, UsbTransport};
use std::{
    env,
    fs::OpenOptions,
    io::{self, BufRead, Write},
};

//
// CATPRINT_DEVICE=/dev/rfcomm0 CATPRINT_IMAGE_DIR=./images cargo run --example print_bitmap
// CATPRINT_DEVICE=usb:0483:5740 cargo run --example print_bitmap
//
// Type `n` (or just Enter) to step to the next image, `p` to print it, `q` to quit.
//

fn open_device(target: &str) -> Result<Box<dyn Write>, catprint::Error> {
    if let Some(ids) = target.strip_prefix("usb:") {
        let mut parts = ids.split(':');
        let vid = parts.next().and_then(|s| u16::from_str_radix(s, 16).ok());
        let pid = parts.next().and_then(|s| u16::from_str_radix(s, 16).ok());
        let serial = parts.next();
        match (vid, pid) {
            (Some(vid), Some(pid)) => Ok(Box::new(UsbTransport::open(vid, pid, serial)?)),
            _ => Err(catprint::Error::InvalidConfig(format!(
                "CATPRINT_DEVICE={}",
                target
            ))),
        }
    } else {
        let file = OpenOptions::new().write(true).create(true).open(target)?;
        Ok(Box::new(file))
    }
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}:{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            return;
        }
    };

    let device = env::var("CATPRINT_DEVICE").unwrap_or_else(|_| "/dev/rfcomm0".to_string());
    let mut printer = match open_device(&device) {
        Ok(sink) => Printer::new(sink),
        Err(err) => {
            eprintln!("Cannot open {}: {}", device, err);
            return;
        }
    };

    let stdin = io::stdin();
    let input = stdin
        .lock()
        .lines()
        .filter_map(|line| line.ok())
        .map(|line| line.trim().to_lowercase())
        .take_while(|line| line != "q")
        .map(|line| match line.as_str() {
            "p" | "y" => InputEvent::Confirm,
            _ => InputEvent::Next,
        });

    match Session::scan(config, input, LogDisplay) {
        Ok(mut session) => {
            if let Err(err) = session.run(&mut printer) {
                println!("ERROR {:#?}", err);
            }
        }
        Err(err) => println!("ERROR {:#?}", err),
    }
}
