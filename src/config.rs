use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::aggregate::ScalarPolicy;
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::ingest::{SamplerConfig, SamplingStrategy};
use crate::pipeline::{EarlyStopPolicy, PipelineOptions};
use crate::record::ScalarField;

pub const CONFIG_PATH_ENV: &str = "BROADCAST_LENS_CONFIG";

const DEFAULT_STRATEGY: &str = "stride";
const DEFAULT_STRIDE: u64 = 30;
const DEFAULT_MAX_FRAMES: usize = 10;
const DEFAULT_BACKEND: &str = "gemini";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_SCALAR_POLICY: &str = "majority";
const DEFAULT_MIN_TEAMS: usize = 2;
const DEFAULT_REQUIRED_FIELDS: [&str; 2] = ["sport", "league"];
const DEFAULT_MAX_IN_FLIGHT: usize = 1;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnalyzerConfigFile {
    sampling: Option<SamplingConfigFile>,
    annotator: Option<AnnotatorConfigFile>,
    aggregation: Option<AggregationConfigFile>,
    early_stop: Option<EarlyStopConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    strategy: Option<String>,
    stride: Option<u64>,
    max_frames: Option<usize>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotatorConfigFile {
    backend: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    api_key_env: Option<String>,
    timeout_secs: Option<u64>,
    batch_size: Option<usize>,
    script_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AggregationConfigFile {
    scalar_policy: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EarlyStopConfigFile {
    enabled: Option<bool>,
    min_teams: Option<usize>,
    required_fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    max_in_flight: Option<usize>,
    deadline_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub sampling: SamplingSettings,
    pub annotator: AnnotatorSettings,
    pub scalar_policy: String,
    pub early_stop: EarlyStopSettings,
    pub max_in_flight: usize,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SamplingSettings {
    /// `stride` or `even_spread`.
    pub strategy: String,
    pub stride: u64,
    pub max_frames: usize,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct AnnotatorSettings {
    pub backend: String,
    pub model: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout: Duration,
    pub batch_size: usize,
    /// Replies file for the scripted backend.
    pub script_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EarlyStopSettings {
    pub enabled: bool,
    pub min_teams: usize,
    pub required_fields: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::from_file(AnalyzerConfigFile::default())
    }
}

impl AnalyzerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalyzerConfigFile) -> Self {
        let sampling = file.sampling.unwrap_or_default();
        let annotator = file.annotator.unwrap_or_default();
        let early_stop = file.early_stop.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        Self {
            sampling: SamplingSettings {
                strategy: sampling
                    .strategy
                    .unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
                stride: sampling.stride.unwrap_or(DEFAULT_STRIDE),
                max_frames: sampling.max_frames.unwrap_or(DEFAULT_MAX_FRAMES),
                jpeg_quality: sampling.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            annotator: AnnotatorSettings {
                backend: annotator
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model: annotator.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                endpoint: annotator
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                api_key_env: annotator
                    .api_key_env
                    .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
                timeout: Duration::from_secs(
                    annotator.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                ),
                batch_size: annotator.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                script_path: annotator.script_path,
            },
            scalar_policy: file
                .aggregation
                .and_then(|aggregation| aggregation.scalar_policy)
                .unwrap_or_else(|| DEFAULT_SCALAR_POLICY.to_string()),
            early_stop: EarlyStopSettings {
                enabled: early_stop.enabled.unwrap_or(true),
                min_teams: early_stop.min_teams.unwrap_or(DEFAULT_MIN_TEAMS),
                required_fields: early_stop.required_fields.unwrap_or_else(|| {
                    DEFAULT_REQUIRED_FIELDS
                        .iter()
                        .map(|field| field.to_string())
                        .collect()
                }),
            },
            max_in_flight: pipeline.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            deadline: pipeline.deadline_secs.map(Duration::from_secs),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(strategy) = env_string("BROADCAST_LENS_STRATEGY") {
            self.sampling.strategy = strategy;
        }
        if let Some(stride) = env_parse("BROADCAST_LENS_STRIDE", "an integer frame count")? {
            self.sampling.stride = stride;
        }
        if let Some(max_frames) = env_parse("BROADCAST_LENS_MAX_FRAMES", "an integer frame count")? {
            self.sampling.max_frames = max_frames;
        }
        if let Some(backend) = env_string("BROADCAST_LENS_BACKEND") {
            self.annotator.backend = backend;
        }
        if let Some(model) = env_string("BROADCAST_LENS_MODEL") {
            self.annotator.model = model;
        }
        if let Some(endpoint) = env_string("BROADCAST_LENS_ENDPOINT") {
            self.annotator.endpoint = endpoint;
        }
        if let Some(seconds) =
            env_parse::<u64>("BROADCAST_LENS_TIMEOUT_SECS", "an integer number of seconds")?
        {
            self.annotator.timeout = Duration::from_secs(seconds);
        }
        if let Some(batch_size) = env_parse("BROADCAST_LENS_BATCH_SIZE", "an integer frame count")? {
            self.annotator.batch_size = batch_size;
        }
        if let Some(path) = env_string("BROADCAST_LENS_SCRIPT") {
            self.annotator.script_path = Some(path);
        }
        if let Some(policy) = env_string("BROADCAST_LENS_SCALAR_POLICY") {
            self.scalar_policy = policy;
        }
        if let Some(enabled) = env_parse("BROADCAST_LENS_EARLY_STOP", "true or false")? {
            self.early_stop.enabled = enabled;
        }
        if let Some(fields) = env_string("BROADCAST_LENS_REQUIRED_FIELDS") {
            let parsed = split_csv(&fields);
            if !parsed.is_empty() {
                self.early_stop.required_fields = parsed;
            }
        }
        if let Some(max_in_flight) =
            env_parse("BROADCAST_LENS_MAX_IN_FLIGHT", "an integer batch count")?
        {
            self.max_in_flight = max_in_flight;
        }
        if let Some(seconds) =
            env_parse::<u64>("BROADCAST_LENS_DEADLINE_SECS", "an integer number of seconds")?
        {
            self.deadline = Some(Duration::from_secs(seconds));
        }
        Ok(())
    }

    /// Reject nonsensical values and canonicalise names.
    pub fn validate(&mut self) -> Result<()> {
        self.sampling.strategy = self.sampling.strategy.trim().to_ascii_lowercase();
        self.sampling_strategy()?;
        if self.sampling.stride == 0 {
            return Err(anyhow!("sampling stride must be greater than zero"));
        }
        if self.sampling.max_frames == 0 {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        if !(1..=100).contains(&self.sampling.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.annotator.batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than zero"));
        }
        if self.annotator.timeout.is_zero() {
            return Err(anyhow!("annotator timeout must be greater than zero"));
        }
        self.annotator.backend = self.annotator.backend.trim().to_ascii_lowercase();
        if self.annotator.backend.is_empty() {
            return Err(anyhow!("annotator backend must not be empty"));
        }
        ScalarPolicy::parse(&self.scalar_policy)
            .ok_or_else(|| anyhow!("unknown scalar policy '{}'", self.scalar_policy))?;
        self.required_fields()?;
        if self.max_in_flight == 0 {
            return Err(anyhow!("max_in_flight must be greater than zero"));
        }
        if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
            return Err(anyhow!("deadline must be greater than zero"));
        }
        Ok(())
    }

    pub fn sampling_strategy(&self) -> Result<SamplingStrategy> {
        match self.sampling.strategy.trim().to_ascii_lowercase().as_str() {
            "stride" => Ok(SamplingStrategy::Stride {
                stride: self.sampling.stride,
            }),
            "even_spread" | "even-spread" => Ok(SamplingStrategy::EvenSpread),
            other => Err(anyhow!(
                "unknown sampling strategy '{}' (expected stride or even_spread)",
                other
            )),
        }
    }

    fn required_fields(&self) -> Result<Vec<ScalarField>> {
        self.early_stop
            .required_fields
            .iter()
            .map(|name| {
                ScalarField::from_key(name.trim())
                    .ok_or_else(|| anyhow!("unknown early-stop field '{}'", name))
            })
            .collect()
    }

    /// Resolve the settings into controller options.
    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        let scalar_policy = ScalarPolicy::parse(&self.scalar_policy)
            .ok_or_else(|| anyhow!("unknown scalar policy '{}'", self.scalar_policy))?;
        Ok(PipelineOptions {
            sampler: SamplerConfig {
                strategy: self.sampling_strategy()?,
                max_frames: self.sampling.max_frames,
                jpeg_quality: self.sampling.jpeg_quality,
            },
            batch_size: self.annotator.batch_size,
            scalar_policy,
            early_stop: EarlyStopPolicy {
                enabled: self.early_stop.enabled,
                required_fields: self.required_fields()?,
                min_teams: self.early_stop.min_teams,
            },
            max_in_flight: self.max_in_flight,
            deadline: self.deadline,
        })
    }
}

fn read_config_file(path: &Path) -> Result<AnalyzerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, expected)),
        None => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
