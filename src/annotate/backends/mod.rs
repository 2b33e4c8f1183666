#[cfg(feature = "annotator-gemini")]
pub mod gemini;
pub mod scripted;

#[cfg(feature = "annotator-gemini")]
pub use gemini::GeminiAnnotator;
pub use scripted::ScriptedAnnotator;
