//! Local file decoding using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to RGB24. Seeking jumps to the
//! nearest preceding keyframe and decodes forward to the requested index, so
//! even-spread sampling only decodes around its targets.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::DecodedFrame;

/// FFmpeg's internal time base (microseconds).
const AV_TIME_BASE: f64 = 1_000_000.0;
/// Upper bound on frames decoded forward from a keyframe to reach a target.
const MAX_FRAMES_AFTER_SEEK: usize = 1_000;
const FALLBACK_FPS: f64 = 30.0;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    /// Seconds per stream timestamp unit.
    time_base: f64,
    fps: f64,
    total_frames: Option<u64>,
    next_index: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;

        let (stream_index, parameters, time_base, fps, stream_frames) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow!("file '{}' has no video track", path))?;
            (
                stream.index(),
                stream.parameters(),
                rational_to_f64(stream.time_base()),
                rational_to_f64(stream.avg_frame_rate()),
                stream.frames(),
            )
        };

        let context = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let fps = if fps > 0.0 { fps } else { FALLBACK_FPS };
        let total_frames = if stream_frames > 0 {
            Some(stream_frames as u64)
        } else if input.duration() > 0 {
            Some(((input.duration() as f64 / AV_TIME_BASE) * fps).floor() as u64)
        } else {
            None
        };

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            fps,
            total_frames,
            next_index: 0,
            eof_sent: false,
        })
    }

    pub(crate) fn frame_count(&self) -> Option<u64> {
        self.total_frames
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let Some(decoded) = self.receive()? else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        self.to_rgb(&decoded, index).map(Some)
    }

    pub(crate) fn seek_frame(&mut self, index: u64) -> Result<DecodedFrame> {
        let target_secs = index as f64 / self.fps;
        let target_us = (target_secs * AV_TIME_BASE) as i64;
        self.input
            .seek(target_us, ..target_us)
            .with_context(|| format!("seek to frame {} in '{}'", index, self.path))?;
        self.decoder.flush();
        self.eof_sent = false;

        // Half a frame of tolerance for rounding in container timestamps.
        let tolerance = 0.5 / self.fps;
        for _ in 0..MAX_FRAMES_AFTER_SEEK {
            let Some(decoded) = self.receive()? else {
                break;
            };
            let Some(ts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            if ts as f64 * self.time_base + tolerance >= target_secs {
                self.next_index = index + 1;
                return self.to_rgb(&decoded, index);
            }
        }
        Err(anyhow!(
            "frame {} not reached after seeking in '{}'",
            index,
            self.path
        ))
    }

    /// Pull the next decoded frame, feeding packets as needed.
    fn receive(&mut self) -> Result<Option<ffmpeg::frame::Video>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }
            if self.eof_sent {
                return Ok(None);
            }
            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) if index == self.stream_index => {
                    self.decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                Some(_) => {}
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn to_rgb(&mut self, decoded: &ffmpeg::frame::Video, index: u64) -> Result<DecodedFrame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .with_context(|| format!("scale frame {} to RGB", index))?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        Ok(DecodedFrame::new(index, width, height, pixels))
    }
}

impl Drop for FfmpegFileSource {
    fn drop(&mut self) {
        log::debug!("ffmpeg decoder for '{}' closed", self.path);
    }
}

fn rational_to_f64(value: ffmpeg::Rational) -> f64 {
    if value.denominator() == 0 {
        return 0.0;
    }
    value.numerator() as f64 / value.denominator() as f64
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame buffer is shorter than its dimensions")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
