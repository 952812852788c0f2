//! Packed 2-bit grayscale, four samples per byte, square images only.
//!
//! The encoder walks the image from the bottom-right pixel backwards; the
//! decoder lays samples out in forward order and rotates the result by 180
//! degrees to undo that.

use ::image::{imageops, DynamicImage, RgbImage};
use log::{debug, warn};

use super::{check_layout, exact_sqrt, mean_rgb, prepare, scale2to8, PixelError, TargetSize, MAX_STREAM_LEN};

const SAMPLES_PER_BYTE: usize = 4;

pub fn encode(image: &DynamicImage, target: TargetSize) -> Result<Vec<u8>, PixelError> {
    check_layout(image)?;
    let (width, height) = target.resolve(image.width(), image.height());
    if width != height {
        return Err(PixelError::NonSquareDimensions { width, height });
    }
    if width == 0 {
        return Err(PixelError::EmptyImage);
    }

    let samples = width as usize * height as usize;
    let size = samples.div_ceil(SAMPLES_PER_BYTE);
    if size > MAX_STREAM_LEN {
        return Err(PixelError::OutputTooLarge { size });
    }
    if exact_sqrt(size).is_none() {
        warn!("raw image of side {width} packs into {size} bytes, which cannot be decoded back");
    }

    let pixels = prepare(image, width, height);
    let mut out = Vec::with_capacity(size);
    let mut reg = 0u8;
    let mut shift = 0u32;

    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let [r, g, b, _] = pixels.get_pixel(x, y).0;
            reg |= (mean_rgb(r, g, b) & 0xC0) >> shift;
            if shift == 6 {
                out.push(reg);
                reg = 0;
                shift = 0;
            } else {
                shift += 2;
            }
        }
    }
    if shift != 0 {
        out.push(reg);
    }

    debug!("raw: {width}x{height} -> {} bytes", out.len());
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<RgbImage, PixelError> {
    if data.is_empty() {
        return Err(PixelError::EmptyImage);
    }
    let root = exact_sqrt(data.len())
        .ok_or(PixelError::NonSquareSampleCount { bytes: data.len() })?;
    let side = (root * 2) as u32;

    let mut pixels = Vec::with_capacity(data.len() * SAMPLES_PER_BYTE * 3);
    for &byte in data {
        let mut b = byte;
        for _ in 0..SAMPLES_PER_BYTE {
            let v = scale2to8(b >> 6);
            pixels.extend_from_slice(&[v, v, v]);
            b <<= 2;
        }
    }

    let image = RgbImage::from_raw(side, side, pixels)
        .ok_or(PixelError::NonSquareSampleCount { bytes: data.len() })?;
    Ok(imageops::rotate180(&image))
}
