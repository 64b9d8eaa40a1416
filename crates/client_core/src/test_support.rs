use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

/// Encodes a small gradient so distinct sizes produce distinct bytes.
pub(crate) fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}
