//! analyze_video - describe the sporting event in one video file
//!
//! Samples frames, submits them to the configured annotator, and prints the
//! consensus SummaryRecord as JSON. Settings come from `BROADCAST_LENS_CONFIG`
//! and `BROADCAST_LENS_*`, with the flags below taking precedence.

use anyhow::{anyhow, Context, Result};
use broadcast_lens::{
    AnalyzerConfig, AnnotatorRegistry, CancelFlag, PipelineController, RunOutcome,
    ScriptedAnnotator,
};
use clap::Parser;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file to analyze (or a stub:// synthetic video).
    path: String,
    /// Sampling strategy (stride|even_spread).
    #[arg(long)]
    strategy: Option<String>,
    /// Keep every Nth frame when sampling by stride.
    #[arg(long)]
    stride: Option<u64>,
    /// Maximum frames sampled from the video.
    #[arg(long)]
    max_frames: Option<usize>,
    /// Frames submitted per annotator request.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Annotator backend (gemini|scripted).
    #[arg(long)]
    backend: Option<String>,
    /// JSON array of canned replies for the scripted backend.
    #[arg(long, env = "BROADCAST_LENS_SCRIPT")]
    script: Option<String>,
    /// Scalar consensus policy (majority|first_meaningful).
    #[arg(long)]
    scalar_policy: Option<String>,
    /// Analyze every sampled frame even once the event is identified.
    #[arg(long)]
    no_early_stop: bool,
    /// Batches submitted concurrently.
    #[arg(long)]
    max_in_flight: Option<usize>,
    /// Stop submitting batches after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,
    /// Write the summary to this file instead of stdout.
    #[arg(long)]
    output: Option<String>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
    /// Emit the full run report instead of the summary alone.
    #[arg(long)]
    report: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty && args.output.is_none());

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = AnalyzerConfig::load()?;
        apply_args(&mut cfg, &args);
        cfg.validate()?;
        cfg
    };
    let options = cfg.pipeline_options()?;

    let annotator = {
        let mut stage = ui.stage("Select annotator");
        let registry = build_registry(&cfg)?;
        let annotator = registry.select(Some(&cfg.annotator.backend))?;
        stage.set_detail(annotator.name());
        annotator
    };

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, finishing the current batch");
            cancel.cancel();
        })
        .map_err(|e| anyhow!("failed to install interrupt handler: {}", e))?;
    }

    let mut controller = PipelineController::new(annotator, options).with_cancel_flag(cancel);
    let report = {
        let mut stage = ui.stage("Analyze video");
        let report = controller.analyze_path(&args.path)?;
        stage.set_detail(format!(
            "{} frames, {}/{} batches, {:?}",
            report.frames_sampled, report.batches_submitted, report.batches_total, report.outcome
        ));
        report
    };
    if report.outcome == RunOutcome::Cancelled {
        log::warn!("analysis was cancelled; the summary covers the batches completed so far");
    }

    let json = match (args.report, args.pretty) {
        (true, true) => serde_json::to_string_pretty(&report)?,
        (true, false) => serde_json::to_string(&report)?,
        (false, true) => report.summary.to_json_pretty()?,
        (false, false) => serde_json::to_string(&report.summary)?,
    };
    match &args.output {
        Some(output) => {
            let _stage = ui.stage("Write summary");
            std::fs::write(output, json)
                .with_context(|| format!("failed to write summary to {}", output))?;
            println!("summary written to {}", output);
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn apply_args(cfg: &mut AnalyzerConfig, args: &Args) {
    if let Some(strategy) = &args.strategy {
        cfg.sampling.strategy = strategy.clone();
    }
    if let Some(stride) = args.stride {
        cfg.sampling.stride = stride;
    }
    if let Some(max_frames) = args.max_frames {
        cfg.sampling.max_frames = max_frames;
    }
    if let Some(batch_size) = args.batch_size {
        cfg.annotator.batch_size = batch_size;
    }
    if let Some(backend) = &args.backend {
        cfg.annotator.backend = backend.clone();
    }
    if let Some(script) = &args.script {
        cfg.annotator.script_path = Some(script.clone());
    }
    if let Some(policy) = &args.scalar_policy {
        cfg.scalar_policy = policy.clone();
    }
    if args.no_early_stop {
        cfg.early_stop.enabled = false;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        cfg.max_in_flight = max_in_flight;
    }
    if let Some(seconds) = args.deadline_secs {
        cfg.deadline = Some(Duration::from_secs(seconds));
    }
}

/// Register every backend that can be built from the configuration.
fn build_registry(cfg: &AnalyzerConfig) -> Result<AnnotatorRegistry> {
    let mut registry = AnnotatorRegistry::new();
    let settings = &cfg.annotator;

    #[cfg(feature = "annotator-gemini")]
    {
        let gemini = broadcast_lens::GeminiAnnotator::from_env(
            &settings.endpoint,
            &settings.model,
            &settings.api_key_env,
            settings.timeout,
            settings.batch_size,
        );
        match gemini {
            Ok(gemini) => registry.register(gemini),
            Err(e) if settings.backend == "gemini" => return Err(e),
            Err(e) => log::debug!("gemini annotator unavailable: {:#}", e),
        }
    }

    if let Some(script) = &settings.script_path {
        let scripted = ScriptedAnnotator::from_file(Path::new(script))?
            .with_max_batch_size(settings.batch_size);
        registry.register(scripted);
    } else if settings.backend == "scripted" {
        return Err(anyhow!(
            "the scripted annotator needs a replies file (--script or BROADCAST_LENS_SCRIPT)"
        ));
    }

    Ok(registry)
}
