//! Local video file source.
//!
//! `FileSource` opens a local video file for sampling. Two backends exist:
//! - FFmpeg decode of real files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` videos with generated frames
//!
//! Synthetic paths take query parameters:
//! `stub://clip?frames=120&width=64&height=48&corrupt=3,9`.
//! Frames listed in `corrupt` decode to a truncated pixel buffer, which fails
//! JPEG encoding the same way a damaged frame from a real file would.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::VideoSource;
use crate::frame::DecodedFrame;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_STUB_FRAMES: u64 = 300;
const DEFAULT_STUB_WIDTH: u32 = 64;
const DEFAULT_STUB_HEIGHT: u32 = 48;

/// Local file video source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open a video for reading.
    ///
    /// Fails when the path is not local, the file does not exist, or no
    /// decoder backend is compiled in.
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "video ingestion only supports local paths (no URL schemes): '{}'",
                path
            ));
        }
        if let Some(locator) = path.strip_prefix(STUB_SCHEME) {
            let video = SyntheticVideo::parse(locator)
                .with_context(|| format!("invalid synthetic video path '{}'", path))?;
            log::info!(
                "FileSource: opened {} (synthetic, {} frames)",
                path,
                video.frames
            );
            return Ok(Self {
                path: path.to_string(),
                backend: FileBackend::Synthetic(video),
            });
        }

        let file = Path::new(path);
        if !file.is_file() {
            return Err(anyhow!("video file '{}' does not exist or is not a file", path));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegFileSource::open(path)?;
            log::info!("FileSource: opened {} (ffmpeg)", path);
            Ok(Self {
                path: path.to_string(),
                backend: FileBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "decoding '{}' requires the ingest-file-ffmpeg feature",
                path
            ))
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl VideoSource for FileSource {
    fn describe(&self) -> String {
        format!("file source {}", self.path)
    }

    fn frame_count(&self) -> Option<u64> {
        match &self.backend {
            FileBackend::Synthetic(video) => Some(video.frames),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_count(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        match &mut self.backend {
            FileBackend::Synthetic(video) => Ok(video.next_frame()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn seek_frame(&mut self, index: u64) -> Result<DecodedFrame> {
        match &mut self.backend {
            FileBackend::Synthetic(video) => video.seek_frame(index),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.seek_frame(index),
        }
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        log::info!("FileSource: released {}", self.path);
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticVideo {
    frames: u64,
    width: u32,
    height: u32,
    corrupt: BTreeSet<u64>,
    cursor: u64,
}

impl SyntheticVideo {
    fn parse(locator: &str) -> Result<Self> {
        let mut video = Self {
            frames: DEFAULT_STUB_FRAMES,
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            corrupt: BTreeSet::new(),
            cursor: 0,
        };
        let Some((_, query)) = locator.split_once('?') else {
            return Ok(video);
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got '{}'", pair))?;
            match key {
                "frames" => video.frames = parse_number(key, value)?,
                "width" => video.width = parse_number(key, value)?,
                "height" => video.height = parse_number(key, value)?,
                "corrupt" => {
                    for index in value.split(',').filter(|index| !index.is_empty()) {
                        video.corrupt.insert(parse_number(key, index)?);
                    }
                }
                other => return Err(anyhow!("unknown synthetic video parameter '{}'", other)),
            }
        }
        if video.width == 0 || video.height == 0 {
            return Err(anyhow!("synthetic video dimensions must be non-zero"));
        }
        Ok(video)
    }

    fn next_frame(&mut self) -> Option<DecodedFrame> {
        if self.cursor >= self.frames {
            return None;
        }
        let frame = self.render(self.cursor);
        self.cursor += 1;
        Some(frame)
    }

    fn seek_frame(&mut self, index: u64) -> Result<DecodedFrame> {
        if index >= self.frames {
            return Err(anyhow!(
                "seek to frame {} past end of {}-frame video",
                index,
                self.frames
            ));
        }
        self.cursor = index + 1;
        Ok(self.render(index))
    }

    fn render(&self, index: u64) -> DecodedFrame {
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        let scene = index / 50;
        let mut pixels: Vec<u8> = (0..pixel_count)
            .map(|i| ((i as u64 + index + scene) % 256) as u8)
            .collect();
        if self.corrupt.contains(&index) {
            pixels.truncate(pixel_count / 2);
        }
        DecodedFrame::new(index, self.width, self.height, pixels)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("synthetic video parameter '{}' must be a number, got '{}'", key, value))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}
