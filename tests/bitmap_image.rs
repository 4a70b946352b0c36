//! Cross-check the reader against BMP files written by the `image` crate.

use catprint::{Bitmap, Format};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;

fn encode(img: RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageOutputFormat::Bmp)
        .unwrap();
    bytes
}

#[test]
fn rgb_rows_match_encoder() {
    let (width, height) = (5u32, 3u32);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 40) as u8, (y * 80) as u8, (x + y * width) as u8])
    });
    let bytes = encode(img.clone());

    let mut bmp = Bitmap::from_source(Cursor::new(bytes), Format::Bmp).unwrap();
    assert_eq!(bmp.width(), width);
    assert_eq!(bmp.height(), height);
    assert_eq!(bmp.bits_per_pixel(), 24);
    assert_eq!(bmp.bytes_per_row(), 15);
    assert!(bmp.palette().is_none());
    // rows are padded to 16 bytes and stored bottom-up
    assert_eq!(bmp.stride(), -16);

    for y in (0..height).rev() {
        let expected: Vec<u8> = (0..width)
            .flat_map(|x| {
                let Rgb([r, g, b]) = *img.get_pixel(x, y);
                vec![b, g, r]
            })
            .collect();
        assert_eq!(bmp.row(y).unwrap(), expected, "row {}", y);
    }
}

#[test]
fn last_visual_row_is_first_in_file() {
    let img = RgbImage::from_fn(4, 2, |_, y| if y == 0 { Rgb([1, 2, 3]) } else { Rgb([7, 8, 9]) });
    let bytes = encode(img);

    let mut bmp = Bitmap::from_bmp(Cursor::new(bytes.clone())).unwrap();
    let data_offset = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
    // bottom visual row sits at the start of the pixel data
    assert_eq!(bmp.row(1).unwrap(), bytes[data_offset..data_offset + 12].to_vec());
    assert_eq!(bmp.row(0).unwrap()[..3], [3, 2, 1]);
}
