use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::annotate::backend::{AnnotateRequest, Annotator};
use crate::frame::Frame;

type Responder = Box<dyn Fn(&[Frame]) -> Result<String> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<String, String>>>),
    Responder(Responder),
}

/// Scripted backend for tests and offline runs.
///
/// Replies either come from a queue (one per call, in call order) or from a
/// function of the submitted frames. Every call is recorded.
pub struct ScriptedAnnotator {
    script: Script,
    max_batch_size: usize,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
}

impl ScriptedAnnotator {
    /// Reply with each entry in turn. `Err` entries simulate backend failures.
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        Self::with_script(Script::Queue(Mutex::new(replies.into_iter().collect())))
    }

    /// Reply with successful texts only.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|text| Ok(text.into())))
    }

    /// Compute each reply from the submitted frames.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&[Frame]) -> Result<String> + Send + Sync + 'static,
    {
        Self::with_script(Script::Responder(Box::new(responder)))
    }

    /// Load replies from a JSON file holding an array of strings.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script file {}", path.display()))?;
        let texts: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("script file {} must be a JSON array of strings", path.display()))?;
        Ok(Self::from_texts(texts))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            max_batch_size: crate::annotate::backend::DEFAULT_MAX_BATCH_SIZE,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Number of `annotate` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Frame count of each call, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    /// Per-call time limit of each call, in call order.
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts
            .lock()
            .map(|timeouts| timeouts.clone())
            .unwrap_or_default()
    }
}

impl Annotator for ScriptedAnnotator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn annotate(&self, request: &AnnotateRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(request.frames.len());
        }
        if let Ok(mut timeouts) = self.timeouts.lock() {
            timeouts.push(request.timeout);
        }
        match &self.script {
            Script::Queue(queue) => {
                let next = queue
                    .lock()
                    .map_err(|_| anyhow!("script queue lock poisoned"))?
                    .pop_front();
                match next {
                    Some(Ok(text)) => Ok(text),
                    Some(Err(message)) => Err(anyhow!(message)),
                    None => Err(anyhow!("scripted annotator has no replies left")),
                }
            }
            Script::Responder(responder) => responder(request.frames),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request(frames: &[Frame]) -> AnnotateRequest<'_> {
        AnnotateRequest {
            instruction: "describe",
            frames,
            timeout: None,
        }
    }

    #[test]
    fn replays_queue_in_order_then_fails() {
        let annotator = ScriptedAnnotator::new([Ok("a".to_string()), Err("boom".to_string())]);
        let frames = [Frame::new(0, 0, vec![1])];
        assert_eq!(annotator.annotate(&request(&frames)).unwrap(), "a");
        assert!(annotator.annotate(&request(&frames)).unwrap_err().to_string().contains("boom"));
        assert!(annotator.annotate(&request(&frames)).is_err());
        assert_eq!(annotator.calls(), 3);
        assert_eq!(annotator.batch_sizes(), vec![1, 1, 1]);
    }

    #[test]
    fn records_request_timeouts() {
        let annotator = ScriptedAnnotator::from_texts(["a", "b"]);
        let frames = [Frame::new(0, 0, vec![1])];
        annotator.annotate(&request(&frames)).unwrap();
        let limited = AnnotateRequest {
            timeout: Some(Duration::from_millis(750)),
            ..request(&frames)
        };
        annotator.annotate(&limited).unwrap();
        assert_eq!(annotator.timeouts(), vec![None, Some(Duration::from_millis(750))]);
    }

    #[test]
    fn responder_sees_submitted_frames() {
        let annotator = ScriptedAnnotator::from_fn(|frames| Ok(format!("{} frames", frames.len())));
        let frames = [Frame::new(0, 0, vec![1]), Frame::new(1, 30, vec![2])];
        assert_eq!(annotator.annotate(&request(&frames)).unwrap(), "2 frames");
    }

    #[test]
    fn loads_replies_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp script");
        file.write_all(br#"["{\"sport\": \"Hockey\"}"]"#).expect("write script");
        let annotator = ScriptedAnnotator::from_file(file.path()).expect("load script");
        let frames = [Frame::new(0, 0, vec![1])];
        assert_eq!(annotator.annotate(&request(&frames)).unwrap(), r#"{"sport": "Hockey"}"#);
    }
}
