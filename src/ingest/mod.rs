//! Video ingestion and frame sampling.
//!
//! This module provides:
//! - `VideoSource`: the decoder seam (sequential read plus optional seek)
//! - `FileSource`: local files (FFmpeg, feature: ingest-file-ffmpeg) and
//!   synthetic `stub://` videos for tests and demos
//! - `FrameSampler`: picks a bounded, deterministic subset of frames and
//!   encodes them as JPEG
//!
//! Decode, seek and encode failures on individual frames are skipped here and
//! never abort a sampling pass. Only failing to open the video is an error.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod sampler;

pub use file::FileSource;
pub use sampler::{FrameSampler, SamplerConfig, SamplingStats, SamplingStrategy};

use anyhow::Result;

use crate::frame::DecodedFrame;

/// A decoded video stream.
///
/// Implementations release their decoder handle on drop.
pub trait VideoSource {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Total number of frames, when the container reports it.
    fn frame_count(&self) -> Option<u64>;

    /// Decode the next frame in stream order.
    ///
    /// Returns `Ok(None)` at end of stream. An `Err` means the current frame
    /// could not be decoded; the source has advanced past it and the caller
    /// may keep reading.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>>;

    /// True when `seek_frame` can jump directly to an index.
    fn supports_seek(&self) -> bool {
        false
    }

    /// Decode the frame at `index`, seeking instead of decoding everything
    /// in between.
    fn seek_frame(&mut self, index: u64) -> Result<DecodedFrame> {
        anyhow::bail!("{} does not support seeking (frame {})", self.describe(), index)
    }
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn frame_count(&self) -> Option<u64> {
        (**self).frame_count()
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        (**self).next_frame()
    }

    fn supports_seek(&self) -> bool {
        (**self).supports_seek()
    }

    fn seek_frame(&mut self, index: u64) -> Result<DecodedFrame> {
        (**self).seek_frame(index)
    }
}
