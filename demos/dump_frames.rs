use catprint::{Frame, FrameReader};
use std::{env, fs::File, io::BufReader};

//
// cargo run --example dump_frames capture.bin
//
// Decodes a byte stream captured from CATPRINT_DEVICE and prints one line per frame.
//

fn describe(frame: &Frame) -> String {
    let name = match frame.command() {
        Some(command) => format!("{:?}", command),
        None => format!("{:#04x}", frame.command),
    };
    let preview: Vec<String> = frame
        .payload
        .iter()
        .take(16)
        .map(|b| format!("{:02X}", b))
        .collect();
    let more = if frame.payload.len() > 16 { " .." } else { "" };
    format!(
        "{:<12} {:>3} bytes  {}{}",
        name,
        frame.payload.len(),
        preview.join(" "),
        more
    )
}

fn main() {
    env_logger::init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            println!("usage: dump_frames <capture-file>");
            return;
        }
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Cannot open {}: {}", path, err);
            return;
        }
    };

    let mut count = 0;
    for frame in FrameReader::new(BufReader::new(file)) {
        match frame {
            Ok(frame) => {
                count += 1;
                println!("{}", describe(&frame));
            }
            Err(err) => {
                println!("Error after {} frames: {}", count, err);
                return;
            }
        }
    }
    println!("{} frames", count);
}
