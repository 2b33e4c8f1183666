use anyhow::Result;
use std::time::Duration;

use crate::frame::Frame;

/// Default upper bound on frames submitted in one request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// One request to the backend.
#[derive(Clone, Copy, Debug)]
pub struct AnnotateRequest<'a> {
    /// Instruction describing the expected output schema.
    pub instruction: &'a str,
    /// Frames in submission order. A single frame asks for one JSON object,
    /// several frames ask for a JSON array with one object per frame.
    pub frames: &'a [Frame],
    /// Time the caller is still willing to wait. Backends must not block
    /// longer than this.
    pub timeout: Option<Duration>,
}

/// Annotator backend trait.
///
/// Implementations are shared across threads when batches are submitted
/// concurrently, so `annotate` takes `&self`.
pub trait Annotator: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Largest batch the backend accepts in one request.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }

    /// Submit frames and return the backend's raw reply text.
    ///
    /// An `Err` means the unit failed (network, service, timeout); the caller
    /// skips it and carries on.
    fn annotate(&self, request: &AnnotateRequest<'_>) -> Result<String>;
}
