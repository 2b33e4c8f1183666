//! Google Gemini `generateContent` backend.
//!
//! Frames are sent inline as base64 JPEG parts after the instruction text.
//! The API key is read from an environment variable at construction time.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::annotate::backend::{AnnotateRequest, Annotator};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_batch_size: usize,
}

pub struct GeminiAnnotator {
    agent: ureq::Agent,
    config: GeminiConfig,
}

impl GeminiAnnotator {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!("gemini api key is empty"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout.min(Duration::from_secs(10)))
            .build();
        Ok(Self { agent, config })
    }

    /// Build from settings, reading the key from `api_key_env`.
    pub fn from_env(
        endpoint: &str,
        model: &str,
        api_key_env: &str,
        timeout: Duration,
        max_batch_size: usize,
    ) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| anyhow!("{} must be set to use the gemini annotator", api_key_env))?;
        Self::new(GeminiConfig {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
            timeout,
            max_batch_size,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl Annotator for GeminiAnnotator {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size.max(1)
    }

    fn annotate(&self, request: &AnnotateRequest<'_>) -> Result<String> {
        let mut parts = vec![json!({ "text": request.instruction })];
        for frame in request.frames {
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/jpeg",
                    "data": STANDARD.encode(frame.jpeg_bytes()),
                }
            }));
        }
        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });

        let timeout = request_timeout(request.timeout, self.config.timeout);
        if timeout.is_zero() {
            return Err(anyhow!("no time left for gemini request"));
        }

        let response = self
            .agent
            .post(&self.url())
            .set("x-goog-api-key", &self.config.api_key)
            .timeout(timeout)
            .send_json(body)
            .with_context(|| {
                format!(
                    "gemini request ({} frames, model {})",
                    request.frames.len(),
                    self.config.model
                )
            })?;
        let reply: GenerateContentResponse = response
            .into_json()
            .context("decode gemini generateContent response")?;
        reply
            .text()
            .ok_or_else(|| anyhow!("gemini response contained no text"))
    }
}

/// HTTP timeout for one call: the configured limit, cut short by the time
/// left before the run deadline.
fn request_timeout(remaining: Option<Duration>, configured: Duration) -> Duration {
    remaining.map_or(configured, |remaining| remaining.min(configured))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, concatenated.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}
