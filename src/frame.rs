//! Frame types.
//!
//! - `DecodedFrame`: RGB24 pixels straight out of a video source.
//! - `Frame`: an encoded JPEG still plus its position in the sampled sequence.
//!
//! Decoded pixels never leave the ingestion layer; the annotator only ever sees
//! the encoded `Frame`.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Default JPEG quality used when encoding sampled frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

// ----------------------------------------------------------------------------
// DecodedFrame: raw pixels from a source
// ----------------------------------------------------------------------------

/// A decoded video frame in packed RGB24.
#[derive(Debug)]
pub struct DecodedFrame {
    /// Index of the frame in the source stream (0-based).
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl DecodedFrame {
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            pixels,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }
}

/// Encode a decoded frame as JPEG.
///
/// Fails when the pixel buffer does not match the frame dimensions, which is
/// how a corrupted decode shows up at this layer.
pub fn encode_jpeg(frame: &DecodedFrame, quality: u8) -> Result<Vec<u8>> {
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!("frame {} has zero dimensions", frame.index));
    }
    if frame.pixels.len() != frame.expected_len() {
        return Err(anyhow!(
            "frame {} pixel buffer is {} bytes, expected {}",
            frame.index,
            frame.pixels.len(),
            frame.expected_len()
        ));
    }

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder
        .encode(
            &frame.pixels,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .with_context(|| format!("encode frame {} as jpeg", frame.index))?;
    Ok(jpeg)
}

// ----------------------------------------------------------------------------
// Frame: encoded still handed to the annotator
// ----------------------------------------------------------------------------

/// An encoded still image and its position in the sampled sequence.
///
/// Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    ordinal: usize,
    source_index: u64,
    jpeg: Vec<u8>,
}

impl Frame {
    pub fn new(ordinal: usize, source_index: u64, jpeg: Vec<u8>) -> Self {
        Self {
            ordinal,
            source_index,
            jpeg,
        }
    }

    /// Position in the sampled sequence (0-based).
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Index of the frame in the source video.
    pub fn source_index(&self) -> u64 {
        self.source_index
    }

    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }
}
