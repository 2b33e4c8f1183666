//! Bounded, deterministic frame selection.
//!
//! Two strategies:
//! - `Stride`: decode sequentially and keep every frame whose index is a
//!   multiple of the stride. Works without knowing the video length.
//! - `EvenSpread`: with a known frame count `T` and budget `k`, seek directly to
//!   `0, step, 2*step, ...` where `step = max(T / k, 1)`.
//!
//! Both stop once `max_frames` frames have been encoded.
//!
//! A stride pass over a stream of unknown length treats 32 consecutive decode
//! errors as the end of the stream. With a known length the run of errors may
//! be as long as the video itself.

use serde::{Deserialize, Serialize};

use super::VideoSource;
use crate::frame::{encode_jpeg, Frame, DEFAULT_JPEG_QUALITY};

/// Consecutive decode errors tolerated before a stream of unknown length is
/// treated as ended.
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 32;
/// Stride used when even spread is requested but the length is unknown.
const FALLBACK_STRIDE: u64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SamplingStrategy {
    Stride { stride: u64 },
    EvenSpread,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        SamplingStrategy::Stride { stride: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerConfig {
    pub strategy: SamplingStrategy,
    /// Upper bound on frames produced.
    pub max_frames: usize,
    pub jpeg_quality: u8,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            max_frames: 10,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Counters from one sampling pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplingStats {
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub seek_failures: u64,
    pub encode_failures: u64,
}

pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Select and encode frames from `source`.
    ///
    /// Never fails: frames that cannot be decoded, reached or encoded are
    /// skipped and counted in the returned stats.
    pub fn sample(&self, source: &mut dyn VideoSource) -> (Vec<Frame>, SamplingStats) {
        let mut stats = SamplingStats::default();
        if self.config.max_frames == 0 {
            return (Vec::new(), stats);
        }

        let frames = match self.config.strategy {
            SamplingStrategy::Stride { stride } => self.sample_stride(source, stride, &mut stats),
            SamplingStrategy::EvenSpread => match (source.frame_count(), source.supports_seek()) {
                (Some(total), true) => self.sample_even_spread(source, total, &mut stats),
                (total, seekable) => {
                    log::warn!(
                        "{}: even spread needs a known length and seeking (length={:?}, seekable={}); using stride {}",
                        source.describe(),
                        total,
                        seekable,
                        FALLBACK_STRIDE
                    );
                    self.sample_stride(source, FALLBACK_STRIDE, &mut stats)
                }
            },
        };

        log::info!(
            "sampled {} frames from {} (decoded={}, decode_failures={}, seek_failures={}, encode_failures={})",
            frames.len(),
            source.describe(),
            stats.frames_decoded,
            stats.decode_failures,
            stats.seek_failures,
            stats.encode_failures
        );
        (frames, stats)
    }

    fn sample_stride(
        &self,
        source: &mut dyn VideoSource,
        stride: u64,
        stats: &mut SamplingStats,
    ) -> Vec<Frame> {
        let stride = stride.max(1);
        let mut frames = Vec::new();
        let mut consecutive_errors = 0;
        let error_limit = source
            .frame_count()
            .map_or(MAX_CONSECUTIVE_DECODE_ERRORS as u64, |total| {
                total.max(MAX_CONSECUTIVE_DECODE_ERRORS as u64)
            });

        while frames.len() < self.config.max_frames {
            let decoded = match source.next_frame() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    stats.decode_failures += 1;
                    consecutive_errors += 1;
                    log::warn!("{}: skipping undecodable frame: {:#}", source.describe(), e);
                    if consecutive_errors >= error_limit {
                        log::warn!(
                            "{}: {} consecutive decode errors, treating stream as ended",
                            source.describe(),
                            consecutive_errors
                        );
                        break;
                    }
                    continue;
                }
            };
            consecutive_errors = 0;
            stats.frames_decoded += 1;

            if decoded.index % stride != 0 {
                continue;
            }
            match encode_jpeg(&decoded, self.config.jpeg_quality) {
                Ok(jpeg) => frames.push(Frame::new(frames.len(), decoded.index, jpeg)),
                Err(e) => {
                    stats.encode_failures += 1;
                    log::warn!("skipping frame {}: {:#}", decoded.index, e);
                }
            }
        }
        frames
    }

    fn sample_even_spread(
        &self,
        source: &mut dyn VideoSource,
        total: u64,
        stats: &mut SamplingStats,
    ) -> Vec<Frame> {
        let budget = self.config.max_frames as u64;
        let step = (total / budget).max(1);
        let mut frames = Vec::new();

        let targets = (0..budget).map(|i| i * step).take_while(|index| *index < total);
        for index in targets {
            let decoded = match source.seek_frame(index) {
                Ok(decoded) => decoded,
                Err(e) => {
                    stats.seek_failures += 1;
                    log::warn!("{}: skipping frame {}: {:#}", source.describe(), index, e);
                    continue;
                }
            };
            stats.frames_decoded += 1;
            match encode_jpeg(&decoded, self.config.jpeg_quality) {
                Ok(jpeg) => frames.push(Frame::new(frames.len(), index, jpeg)),
                Err(e) => {
                    stats.encode_failures += 1;
                    log::warn!("skipping frame {}: {:#}", index, e);
                }
            }
        }
        frames
    }
}
