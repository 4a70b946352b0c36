use catprint::{Printer, Transport};
use std::{env, fs::OpenOptions, io::Write};

//
// cargo run --example print_text -- "Hello" "second line"
//
// Prints each argument on its own line, then feeds the paper out.
//

fn print_lines<T: Transport>(
    printer: &mut Printer<T>,
    lines: &[String],
) -> Result<(), catprint::Error> {
    for line in lines {
        printer.write_line(line)?;
    }
    printer.feed(80)
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

    let lines: Vec<String> = env::args().skip(1).collect();
    if lines.is_empty() {
        println!("Usage: cargo run --example print_text -- <LINE>...");
        return;
    }

    let device = env::var("CATPRINT_DEVICE").unwrap_or_else(|_| "/dev/rfcomm0".to_string());
    let sink = match OpenOptions::new().write(true).create(true).open(&device) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Cannot open {}: {}", device, err);
            return;
        }
    };

    let mut printer = Printer::new(sink);
    match print_lines(&mut printer, &lines) {
        Ok(()) => println!("Printed {} lines", lines.len()),
        Err(err) => println!("ERROR {:#?}", err),
    }
}
