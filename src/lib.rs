//! Broadcast Lens
//!
//! Describes a recorded sporting event from its video: samples a bounded
//! number of frames, asks a vision annotator to describe each one, and folds
//! the (often messy) replies into a single consensus summary.
//!
//! # Pipeline
//!
//! 1. **Sample**: decode the video and keep at most `max_frames` frames,
//!    either every `stride`-th frame or evenly spread over a known length.
//!    The decoder is released before any annotator call.
//! 2. **Annotate**: submit frames in batches to an [`Annotator`]. Backend
//!    failures skip the batch; they never abort the run.
//! 3. **Normalize**: recover structured records from free text (fenced
//!    JSON block, then embedded JSON, then a fallback record).
//! 4. **Aggregate**: majority (or first-meaningful) scalars, sorted union
//!    of collections, player tuples deduplicated on their full key.
//! 5. **Early stop**: once sport, league and two teams are known, remaining
//!    batches are not submitted.
//!
//! # Module Structure
//!
//! - `record`: AnnotationRecord, SummaryRecord, sentinel handling
//! - `frame`: Decoded frames and JPEG encoding
//! - `ingest`: Video sources and the frame sampler
//! - `annotate`: Annotator trait, instruction text, backends
//! - `normalize`: Free text to records
//! - `aggregate`: Consensus folding
//! - `pipeline`: PipelineController, run report, cancellation
//! - `config`: File and environment configuration

pub mod aggregate;
pub mod annotate;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod record;

pub use aggregate::{finalize, ConsensusAggregator, ScalarPolicy};
pub use annotate::{
    build_instruction, AnnotateRequest, Annotator, AnnotatorRegistry, ScriptedAnnotator,
};
#[cfg(feature = "annotator-gemini")]
pub use annotate::{backends::gemini::GeminiConfig, GeminiAnnotator};
pub use config::AnalyzerConfig;
pub use frame::{encode_jpeg, DecodedFrame, Frame};
pub use ingest::{
    FileSource, FrameSampler, SamplerConfig, SamplingStats, SamplingStrategy, VideoSource,
};
pub use normalize::{normalize, Normalized, Recovery};
pub use pipeline::{
    AnalysisError, AnalysisReport, CancelFlag, EarlyStopPolicy, PipelineController,
    PipelineOptions, PipelineState, RunOutcome,
};
pub use record::{
    is_meaningful, AnnotationRecord, CollectionField, EventDescription, PlayerEntry, ScalarField,
    SummaryRecord, UNKNOWN,
};
