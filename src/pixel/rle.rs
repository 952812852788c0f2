//! Run-length encoded 2-bit gray + 2-bit alpha images.

use ::image::{DynamicImage, Rgba, RgbaImage};
use log::debug;

use super::{check_layout, mean_rgb, prepare, scale2to8, PixelError, TargetSize, MAX_STREAM_LEN};

/// Largest width or height; both are stored in one byte.
pub const MAX_SIDE: u32 = 0xFF;
pub const SENTINEL: [u8; 2] = [0xFF, 0xFF];
const MAX_RUN: u8 = 0xFF;

/// Quantize one pixel: gray in bits 0-1, inverted alpha in bits 2-3.
#[inline]
fn quantize(Rgba([r, g, b, a]): Rgba<u8>, has_alpha: bool) -> u8 {
    let mut value = mean_rgb(r, g, b) >> 6;
    if has_alpha {
        value |= (!a & 0xC0) >> 4;
    }
    value
}

pub fn encode(image: &DynamicImage, target: TargetSize) -> Result<Vec<u8>, PixelError> {
    let has_alpha = check_layout(image)?;
    let (width, height) = target.resolve(image.width(), image.height());
    if width > MAX_SIDE || height > MAX_SIDE {
        return Err(PixelError::DimensionTooLarge { width, height });
    }
    if width == 0 || height == 0 {
        return Err(PixelError::EmptyImage);
    }

    let pixels = prepare(image, width, height);
    let mut out = vec![width as u8, height as u8];
    let mut run: Option<(u8, u8)> = None;

    for &pixel in pixels.pixels() {
        let value = quantize(pixel, has_alpha);
        run = match run {
            Some((count, last)) if last == value && count < MAX_RUN => Some((count + 1, last)),
            Some((count, last)) => {
                out.extend_from_slice(&[count, last]);
                Some((1, value))
            }
            None => Some((1, value)),
        };
    }
    if let Some((count, last)) = run {
        out.extend_from_slice(&[count, last]);
    }
    out.extend_from_slice(&SENTINEL);

    if out.len() > MAX_STREAM_LEN {
        return Err(PixelError::OutputTooLarge { size: out.len() });
    }
    debug!("rle: {width}x{height} -> {} bytes", out.len());
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<RgbaImage, PixelError> {
    let (width, height, body) = match data {
        [w, h, body @ ..] => (*w as u32, *h as u32, body),
        _ => return Err(PixelError::TruncatedPixelStream { len: data.len() }),
    };
    let expected = (width * height) as usize;

    let mut runs = body.chunks_exact(2);
    let mut pixels = Vec::with_capacity(expected * 4);
    let mut actual = 0usize;
    let mut terminated = false;
    for pair in runs.by_ref() {
        if pair == SENTINEL {
            terminated = true;
            break;
        }
        let (count, value) = (pair[0] as usize, pair[1]);
        actual += count;
        // Runs may never cover more than the declared raster.
        if actual > expected {
            return Err(PixelError::PixelCountMismatch { expected, actual });
        }
        let color = scale2to8(value);
        let alpha = scale2to8(!(value >> 2));
        for _ in 0..count {
            pixels.extend_from_slice(&[color, color, color, alpha]);
        }
    }

    if !terminated {
        if runs.remainder().is_empty() {
            return Err(PixelError::MissingSentinel);
        }
        return Err(PixelError::TruncatedPixelStream { len: data.len() });
    }
    let trailing = runs.len() * 2 + runs.remainder().len();
    if trailing != 0 {
        return Err(PixelError::TrailingData { len: trailing });
    }

    if width == 0 || height == 0 {
        return Err(PixelError::EmptyImage);
    }
    if actual != expected {
        return Err(PixelError::PixelCountMismatch { expected, actual });
    }
    RgbaImage::from_raw(width, height, pixels)
        .ok_or(PixelError::PixelCountMismatch { expected, actual })
}
