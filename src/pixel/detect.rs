//! Format autodetection for encoded image streams.
//!
//! Neither format carries a magic number, so both are tested structurally on
//! a fully buffered input. Inputs are read once without seeking, which lets
//! detection work on pipes.

use log::{info, warn};
use std::io::Read;

use super::{exact_sqrt, rle::SENTINEL, ImageFormat, PixelError, MAX_STREAM_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub format:    ImageFormat,
    /// The buffer also satisfies the other format's checks.
    pub ambiguous: bool,
}

/// Read at most [`MAX_STREAM_LEN`] bytes; longer inputs are rejected.
pub fn read_bounded<R: Read>(reader: R) -> Result<Vec<u8>, PixelError> {
    let mut buf = Vec::new();
    reader.take(MAX_STREAM_LEN as u64 + 1).read_to_end(&mut buf)?;
    if buf.len() > MAX_STREAM_LEN {
        return Err(PixelError::InputTooLarge { limit: MAX_STREAM_LEN });
    }
    Ok(buf)
}

fn possible_raw(buf: &[u8]) -> bool {
    !buf.is_empty() && exact_sqrt(buf.len()).is_some()
}

fn possible_rle(buf: &[u8]) -> bool {
    let len = buf.len();
    if len < 4 || len % 2 != 0 || buf[len - 2..] != SENTINEL {
        return false;
    }
    let declared = buf[0] as u32 * buf[1] as u32;
    let covered: u32 = buf[2..len - 2].iter().step_by(2).map(|&c| c as u32).sum();
    declared == covered
}

/// Classify `buf` as RLE or RAW. RLE wins when both fit.
pub fn detect(buf: &[u8]) -> Result<Detection, PixelError> {
    let detection = match (possible_rle(buf), possible_raw(buf)) {
        (false, false) => return Err(PixelError::AutodetectFailed),
        (true, raw) => Detection { format: ImageFormat::Rle, ambiguous: raw },
        (false, true) => Detection { format: ImageFormat::Raw, ambiguous: false },
    };
    if detection.ambiguous {
        warn!("RLE format detected, but it may be RAW. Decoding as RLE.");
    } else {
        info!("{} format detected.", detection.format.name().to_uppercase());
    }
    Ok(detection)
}
