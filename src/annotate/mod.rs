//! Annotator seam.
//!
//! The classification backend is an opaque collaborator with one capability:
//! take an instruction plus one or more encoded frames and answer with free
//! text that is expected, but not guaranteed, to contain JSON. Everything
//! downstream (normalizer, aggregator) depends only on that text.

mod backend;
pub mod backends;
pub mod prompt;
mod registry;

pub use backend::{AnnotateRequest, Annotator, DEFAULT_MAX_BATCH_SIZE};
#[cfg(feature = "annotator-gemini")]
pub use backends::GeminiAnnotator;
pub use backends::ScriptedAnnotator;
pub use prompt::build_instruction;
pub use registry::AnnotatorRegistry;
