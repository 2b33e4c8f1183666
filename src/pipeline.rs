//! Pipeline controller.
//!
//! Drives one analysis run:
//! `Idle -> Sampling -> Annotating <-> Aggregating -> Done`.
//!
//! 1. Open the video and sample frames; the decoder is dropped as soon as
//!    sampling finishes
//! 2. Split frames into batches and submit them to the annotator
//! 3. Normalize each reply and fold its records in batch submission order
//! 4. After each folded batch, stop early once the consensus satisfies the
//!    early-stop policy
//!
//! Per-frame and per-batch failures are absorbed. The only error surfaced to
//! the caller is a video that cannot be opened at all.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::aggregate::{ConsensusAggregator, ScalarPolicy};
use crate::annotate::{build_instruction, AnnotateRequest, Annotator};
use crate::frame::Frame;
use crate::ingest::{FileSource, FrameSampler, SamplerConfig, SamplingStats, VideoSource};
use crate::normalize::{normalize, Recovery};
use crate::record::{is_meaningful, ScalarField, SummaryRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Sampling,
    Annotating,
    Aggregating,
    Done,
}

/// Pipeline-fatal failures.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("video '{path}' could not be opened: {reason}")]
    VideoUnavailable { path: String, reason: String },
}

/// When to stop submitting batches before the frames run out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EarlyStopPolicy {
    pub enabled: bool,
    /// Scalars that must hold a meaningful value.
    pub required_fields: Vec<ScalarField>,
    /// Minimum number of distinct teams.
    pub min_teams: usize,
}

impl Default for EarlyStopPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            required_fields: vec![ScalarField::Sport, ScalarField::League],
            min_teams: 2,
        }
    }
}

impl EarlyStopPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_satisfied(&self, summary: &SummaryRecord) -> bool {
        self.enabled
            && self
                .required_fields
                .iter()
                .all(|field| is_meaningful(summary.event.scalar(*field)))
            && summary.event.teams.len() >= self.min_teams
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub sampler: SamplerConfig,
    /// Frames per request; capped by the annotator's own limit.
    pub batch_size: usize,
    pub scalar_policy: ScalarPolicy,
    pub early_stop: EarlyStopPolicy,
    /// Batches in flight at once. Results are still folded in order.
    pub max_in_flight: usize,
    /// Overall budget for the annotation phase.
    pub deadline: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            batch_size: 10,
            scalar_policy: ScalarPolicy::default(),
            early_stop: EarlyStopPolicy::default(),
            max_in_flight: 1,
            deadline: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every batch was submitted.
    Completed,
    /// The early-stop policy fired with batches left.
    EarlyStopped,
    /// The cancel flag was raised with batches left.
    Cancelled,
    /// The deadline passed with batches left.
    DeadlineExceeded,
}

/// Result of one run: the summary plus how it was reached.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub summary: SummaryRecord,
    pub outcome: RunOutcome,
    pub frames_sampled: usize,
    pub batches_total: usize,
    pub batches_submitted: usize,
    pub batches_failed: usize,
    pub fallback_records: usize,
    #[serde(skip)]
    pub sampling: SamplingStats,
}

pub struct PipelineController {
    annotator: Arc<dyn Annotator>,
    options: PipelineOptions,
    cancel: CancelFlag,
    state: PipelineState,
    transitions: Vec<PipelineState>,
}

impl PipelineController {
    pub fn new(annotator: Arc<dyn Annotator>, options: PipelineOptions) -> Self {
        Self {
            annotator,
            options,
            cancel: CancelFlag::new(),
            state: PipelineState::Idle,
            transitions: vec![PipelineState::Idle],
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, consecutive repeats collapsed.
    pub fn transitions(&self) -> &[PipelineState] {
        &self.transitions
    }

    /// Analyze a video file by path.
    pub fn analyze_path(&mut self, path: &str) -> Result<AnalysisReport, AnalysisError> {
        let source = FileSource::open(path).map_err(|e| {
            self.enter(PipelineState::Done);
            AnalysisError::VideoUnavailable {
                path: path.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        Ok(self.analyze_source(source))
    }

    /// Analyze an already opened source. The source is dropped, releasing
    /// its decoder, before any backend call is made.
    pub fn analyze_source<S: VideoSource>(&mut self, source: S) -> AnalysisReport {
        self.enter(PipelineState::Sampling);
        let (frames, sampling) = {
            let mut source = source;
            FrameSampler::new(self.options.sampler.clone()).sample(&mut source)
        };
        let mut report = self.analyze_frames(frames);
        report.sampling = sampling;
        report
    }

    /// Annotate and aggregate frames that were sampled elsewhere.
    pub fn analyze_frames(&mut self, frames: Vec<Frame>) -> AnalysisReport {
        let started = Instant::now();
        let deadline = self.options.deadline.map(|budget| started + budget);
        let batch_size = self
            .options
            .batch_size
            .min(self.annotator.max_batch_size())
            .max(1);
        let batches: Vec<&[Frame]> = frames.chunks(batch_size).collect();
        let window = self.options.max_in_flight.max(1);

        let mut aggregator = ConsensusAggregator::new(self.options.scalar_policy);
        let mut outcome = RunOutcome::Completed;
        let mut batches_submitted = 0;
        let mut batches_failed = 0;
        let mut fallback_records = 0;
        let mut next = 0;

        'batches: while next < batches.len() {
            if self.cancel.is_cancelled() {
                log::warn!("analysis cancelled with {} batches left", batches.len() - next);
                outcome = RunOutcome::Cancelled;
                break;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        log::warn!("analysis deadline passed with {} batches left", batches.len() - next);
                        outcome = RunOutcome::DeadlineExceeded;
                        break;
                    }
                    Some(remaining)
                }
                None => None,
            };

            self.enter(PipelineState::Annotating);
            let end = (next + window).min(batches.len());
            let replies = self.submit(&batches[next..end], remaining);
            batches_submitted += end - next;

            for (offset, reply) in replies.into_iter().enumerate() {
                let batch_index = next + offset;
                self.enter(PipelineState::Aggregating);
                let text = match reply {
                    Ok(text) => text,
                    Err(e) => {
                        batches_failed += 1;
                        log::warn!("batch {} skipped: annotator failed: {:#}", batch_index, e);
                        continue;
                    }
                };
                let normalized = normalize(&text);
                if normalized.recovery == Recovery::Fallback {
                    fallback_records += 1;
                    log::warn!(
                        "batch {}: reply was not JSON, folding fallback record: {}",
                        batch_index,
                        preview(&text)
                    );
                }
                if normalized.batch && normalized.records.len() < batches[batch_index].len() {
                    log::debug!(
                        "batch {}: {} records for {} frames",
                        batch_index,
                        normalized.records.len(),
                        batches[batch_index].len()
                    );
                }
                for record in &normalized.records {
                    aggregator.fold(record);
                }

                let has_more = batch_index + 1 < batches.len();
                if has_more && self.options.early_stop.is_satisfied(&aggregator.summary()) {
                    log::info!(
                        "early stop after batch {} ({} records folded, {} batches skipped)",
                        batch_index,
                        aggregator.frames_analyzed(),
                        batches.len() - batch_index - 1
                    );
                    outcome = RunOutcome::EarlyStopped;
                    break 'batches;
                }
            }
            next = end;
        }

        self.enter(PipelineState::Done);
        let summary = aggregator.summary();
        log::info!(
            "analysis {:?}: {} frames sampled, {}/{} batches submitted, {} failed, {} records folded",
            outcome,
            frames.len(),
            batches_submitted,
            batches.len(),
            batches_failed,
            summary.frames_analyzed
        );
        AnalysisReport {
            summary,
            outcome,
            frames_sampled: frames.len(),
            batches_total: batches.len(),
            batches_submitted,
            batches_failed,
            fallback_records,
            sampling: SamplingStats::default(),
        }
    }

    /// Submit a window of batches; replies come back in submission order.
    fn submit(&self, batches: &[&[Frame]], timeout: Option<Duration>) -> Vec<anyhow::Result<String>> {
        let annotator = self.annotator.as_ref();
        let call = |frames: &[Frame]| {
            let instruction = build_instruction(frames.len());
            annotator.annotate(&AnnotateRequest {
                instruction: &instruction,
                frames,
                timeout,
            })
        };

        if batches.len() == 1 {
            return vec![call(batches[0])];
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .iter()
                .copied()
                .map(|frames| scope.spawn(move || call(frames)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("annotator thread panicked")))
                })
                .collect()
        })
    }

    fn enter(&mut self, state: PipelineState) {
        if self.state != state {
            log::debug!("pipeline {:?} -> {:?}", self.state, state);
            self.state = state;
            self.transitions.push(state);
        }
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 120;
    let mut preview: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().nth(MAX_CHARS).is_some() {
        preview.push('…');
    }
    preview
}
