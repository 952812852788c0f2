//! Pixel codecs for the two low-bit-depth image formats stored in IMAGE
//! directories.
//!
//! # Formats
//! - **RLE**: `[width, height]`, then `(count, value)` runs, then `FF FF`.
//!   `value` packs 2-bit gray (bits 0-1) and 2-bit inverted alpha (bits 2-3).
//! - **RAW**: 2-bit gray samples, four per byte, MSB first, square images only.
//!   The side length is implied by the byte count.
//!
//! Both formats keep only the top two bits of each channel, so encoding is
//! lossy. Every encoded stream must fit the 16-bit size field of a directory
//! entry.

use ::image::imageops::{self, FilterType};
use ::image::{ColorType, DynamicImage, RgbaImage};
use std::io;
use std::str::FromStr;
use thiserror::Error;

pub mod detect;
pub mod raw;
pub mod rle;

pub use detect::{detect, read_bounded, Detection};

/// Largest encoded stream that fits a directory entry.
pub const MAX_STREAM_LEN: usize = u16::MAX as usize;

// ── ImageFormat ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Rle,
    Raw,
}

impl ImageFormat {
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Rle => "rle",
            ImageFormat::Raw => "raw",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rle" => Some(ImageFormat::Rle),
            "raw" => Some(ImageFormat::Raw),
            _     => None,
        }
    }
}

// ── TargetSize ───────────────────────────────────────────────────────────────

/// Requested output size. Missing parts default to the source dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetSize {
    pub width:  Option<u32>,
    pub height: Option<u32>,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: Some(width), height: Some(height) }
    }

    pub fn resolve(self, width: u32, height: u32) -> (u32, u32) {
        (self.width.unwrap_or(width), self.height.unwrap_or(height))
    }
}

/// Accepts `WIDTHxHEIGHT`, `WIDTH` or `xHEIGHT`.
impl FromStr for TargetSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = match s.split_once('x') {
            Some((w, h)) => (w, Some(h)),
            None         => (s, None),
        };
        let dim = |part: &str| -> Result<Option<u32>, String> {
            if part.is_empty() {
                return Ok(None);
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("invalid size '{s}', expected WIDTHxHEIGHT"));
            }
            part.parse().map(Some).map_err(|e| format!("invalid size '{s}': {e}"))
        };
        let width = dim(w)?;
        let height = match h {
            Some(h) if h.is_empty() => return Err(format!("invalid size '{s}', missing height")),
            Some(h) => dim(h)?,
            None    => None,
        };
        Ok(Self { width, height })
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum PixelError {
    #[error("Image bands have to be RGB or RGBA, got {layout}")]
    UnsupportedChannelLayout { layout: String },
    #[error("Image is too big: {width}x{height}, maximum resolution is 255x255")]
    DimensionTooLarge { width: u32, height: u32 },
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("Image must be square for raw compression, got {width}x{height}")]
    NonSquareDimensions { width: u32, height: u32 },
    #[error("Encoded image is too large: {size} bytes (max 65535)")]
    OutputTooLarge { size: usize },
    #[error("Faulty image file, missing 0xFF 0xFF at end")]
    MissingSentinel,
    #[error("Faulty image file, truncated pixel stream of {len} bytes")]
    TruncatedPixelStream { len: usize },
    #[error("Faulty image file, {len} bytes after the end marker")]
    TrailingData { len: usize },
    #[error("Faulty image file, runs cover {actual} pixels but header declares {expected}")]
    PixelCountMismatch { expected: usize, actual: usize },
    #[error("Faulty image file, {bytes} bytes is not a square raw image")]
    NonSquareSampleCount { bytes: usize },
    #[error("Format autodetection failed, unknown file format")]
    AutodetectFailed,
    #[error("Input is too big, more than {limit} bytes")]
    InputTooLarge { limit: usize },
    #[error("Raster error: {0}")]
    Raster(#[from] ::image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait PixelCodec {
    fn format(&self) -> ImageFormat;
    fn encode(&self, image: &DynamicImage, target: TargetSize) -> Result<Vec<u8>, PixelError>;
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, PixelError>;
}

pub struct RleCodec;
impl PixelCodec for RleCodec {
    fn format(&self) -> ImageFormat { ImageFormat::Rle }
    fn encode(&self, image: &DynamicImage, target: TargetSize) -> Result<Vec<u8>, PixelError> {
        rle::encode(image, target)
    }
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, PixelError> {
        rle::decode(data).map(DynamicImage::ImageRgba8)
    }
}

pub struct RawCodec;
impl PixelCodec for RawCodec {
    fn format(&self) -> ImageFormat { ImageFormat::Raw }
    fn encode(&self, image: &DynamicImage, target: TargetSize) -> Result<Vec<u8>, PixelError> {
        raw::encode(image, target)
    }
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, PixelError> {
        raw::decode(data).map(DynamicImage::ImageRgb8)
    }
}

pub fn get_codec(format: ImageFormat) -> Box<dyn PixelCodec> {
    match format {
        ImageFormat::Rle => Box::new(RleCodec),
        ImageFormat::Raw => Box::new(RawCodec),
    }
}

/// Detect the format of `data` and decode it.
pub fn decode_auto(data: &[u8]) -> Result<(DynamicImage, Detection), PixelError> {
    let detection = detect(data)?;
    let image = get_codec(detection.format).decode(data)?;
    Ok((image, detection))
}

// ── Shared helpers ───────────────────────────────────────────────────────────

/// Scale a 2-bit value to 8 bits: 0, 0x55, 0xAA, 0xFF.
#[inline]
pub fn scale2to8(c: u8) -> u8 {
    0x55 * (c & 0x3)
}

/// Integer mean of the colour channels.
#[inline]
pub(crate) fn mean_rgb(r: u8, g: u8, b: u8) -> u8 {
    ((r as u16 + g as u16 + b as u16) / 3) as u8
}

/// Whether the source carries alpha. Only 8-bit RGB and RGBA are accepted.
pub(crate) fn check_layout(image: &DynamicImage) -> Result<bool, PixelError> {
    match image.color() {
        ColorType::Rgb8  => Ok(false),
        ColorType::Rgba8 => Ok(true),
        other => Err(PixelError::UnsupportedChannelLayout { layout: format!("{other:?}") }),
    }
}

/// RGBA pixels of `image` at `width`x`height`, nearest-neighbor resampled if
/// the size changes.
pub(crate) fn prepare(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    let rgba = image.to_rgba8();
    if (width, height) == rgba.dimensions() {
        return rgba;
    }
    log::info!("Resize from {}x{} to {width}x{height}", rgba.width(), rgba.height());
    imageops::resize(&rgba, width, height, FilterType::Nearest)
}

/// `Some(root)` if `n` is a perfect square.
pub(crate) fn exact_sqrt(n: usize) -> Option<usize> {
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    (root * root == n).then_some(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{GrayImage, RgbImage};

    #[test]
    fn scale_maps_all_levels() {
        assert_eq!([0, 1, 2, 3].map(scale2to8), [0x00, 0x55, 0xAA, 0xFF]);
        assert_eq!(scale2to8(0b111), 0xFF);
    }

    #[test]
    fn target_size_forms() {
        assert_eq!("12x34".parse::<TargetSize>().unwrap(), TargetSize::new(12, 34));
        assert_eq!("12".parse::<TargetSize>().unwrap(), TargetSize { width: Some(12), height: None });
        assert_eq!("x34".parse::<TargetSize>().unwrap(), TargetSize { width: None, height: Some(34) });
        for bad in ["12x", "axb", "1x2x3", "-1x2"] {
            assert!(bad.parse::<TargetSize>().is_err(), "{bad}");
        }
    }

    #[test]
    fn resolve_defaults_to_source() {
        let t = TargetSize { width: None, height: Some(5) };
        assert_eq!(t.resolve(10, 20), (10, 5));
        assert_eq!(TargetSize::default().resolve(7, 8), (7, 8));
    }

    #[test]
    fn layout_check() {
        assert!(!check_layout(&DynamicImage::ImageRgb8(RgbImage::new(1, 1))).unwrap());
        assert!(check_layout(&DynamicImage::ImageRgba8(RgbaImage::new(1, 1))).unwrap());
        let gray = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        assert!(matches!(check_layout(&gray), Err(PixelError::UnsupportedChannelLayout { .. })));
    }

    #[test]
    fn exact_sqrt_values() {
        assert_eq!(exact_sqrt(0), Some(0));
        assert_eq!(exact_sqrt(1), Some(1));
        assert_eq!(exact_sqrt(16), Some(4));
        assert_eq!(exact_sqrt(10), None);
        assert_eq!(exact_sqrt(65025), Some(255));
    }

    #[test]
    fn format_names() {
        assert_eq!(ImageFormat::from_name("RLE"), Some(ImageFormat::Rle));
        assert_eq!(ImageFormat::from_name("raw"), Some(ImageFormat::Raw));
        assert_eq!(ImageFormat::from_name("png"), None);
        assert_eq!(get_codec(ImageFormat::Raw).format().name(), "raw");
    }
}
