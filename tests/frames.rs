use catprint::{
    frame::{CMD_MODE_BITMAP, CMD_MODE_TEXT},
    tables::crc8,
    Printer,
};

/// Walk a captured stream frame by frame without the crate's own decoder.
fn split_frames(mut out: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    while !out.is_empty() {
        assert!(out.len() >= 8, "dangling bytes {:02X?}", out);
        let len = out[4] as usize | (out[5] as usize) << 8;
        let (frame, rest) = out.split_at(len + 8);
        frames.push(frame);
        out = rest;
    }
    frames
}

#[test]
fn every_frame_is_well_formed() {
    let mut printer = Printer::new(Vec::new());
    printer.write_line("Hello, thermal world").unwrap();
    let row: Vec<u8> = (0..300u32).map(|i| (i * 13) as u8).collect();
    printer.write_bitmap_row(&row, true).unwrap();
    printer.write_text(&"é".repeat(100)).unwrap();
    printer.feed(0x0102).unwrap();
    printer.write_bitmap_row(&[0xF0; 48], false).unwrap();

    let out = printer.into_inner();
    for frame in split_frames(&out) {
        let len = frame.len() - 8;
        assert!(len <= 112);
        assert_eq!(frame[0], 0x51);
        assert_eq!(frame[1], 0x78);
        assert!([0xA1, 0xA2, 0xBE].contains(&frame[2]), "{:02X?}", frame);
        assert_eq!(frame[3], 0x00);
        assert_eq!(frame[4] as usize | (frame[5] as usize) << 8, len);
        assert_eq!(frame[6 + len], crc8(&frame[6..6 + len]));
        assert_eq!(frame[7 + len], 0xFF);
    }
}

#[test]
fn bitmap_then_text_switches_once_each() {
    let mut printer = Printer::new(Vec::new());
    let row = [0x80u8; 48];
    printer.write_bitmap_row(&row, true).unwrap();
    printer.write_text("x").unwrap();

    let out = printer.into_inner();
    let frames = split_frames(&out);
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0], &CMD_MODE_BITMAP[..]);
    assert_eq!(&frames[1][6..54], &[0x01u8; 48][..]);
    assert_eq!(frames[2], &CMD_MODE_TEXT[..]);
    assert_eq!(frames[3], &[0x51, 0x78, 0xA2, 0x00, 0x01, 0x00, b'x', crc8(b"x"), 0xFF][..]);
}

#[test]
fn text_chunks_split_on_byte_boundaries() {
    let mut printer = Printer::new(Vec::new());
    // 2 bytes per char, 113 chars -> 226 bytes -> 112 + 112 + 2
    let text = "ü".repeat(113);
    printer.write_text(&text).unwrap();

    let out = printer.into_inner();
    let frames = split_frames(&out);
    let lengths: Vec<usize> = frames[1..].iter().map(|f| f.len() - 8).collect();
    assert_eq!(lengths, vec![112, 112, 2]);
    let joined: Vec<u8> = frames[1..]
        .iter()
        .flat_map(|f| f[6..f.len() - 2].to_vec())
        .collect();
    assert_eq!(joined, text.as_bytes());
}
