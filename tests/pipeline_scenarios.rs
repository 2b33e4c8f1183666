use std::sync::{Arc, Mutex};
use std::time::Duration;

use broadcast_lens::{
    AnalysisError, CancelFlag, EarlyStopPolicy, Frame, PipelineController, PipelineOptions,
    PipelineState, RunOutcome, SamplerConfig, SamplingStrategy, ScalarPolicy, ScriptedAnnotator,
    UNKNOWN,
};

fn options(batch_size: usize, early_stop: EarlyStopPolicy) -> PipelineOptions {
    PipelineOptions {
        batch_size,
        early_stop,
        ..PipelineOptions::default()
    }
}

fn frame_json(sport: &str, league: &str, teams: &[&str]) -> String {
    serde_json::json!({
        "sport": sport,
        "league": league,
        "teams": teams,
        "players": [],
        "notable_players_with_numbers": [],
    })
    .to_string()
}

fn batch_json(count: usize, sport: &str, league: &str, teams: &[&str]) -> String {
    let frames: Vec<String> = (0..count).map(|_| frame_json(sport, league, teams)).collect();
    format!("[{}]", frames.join(","))
}

#[test]
fn three_frame_basketball_game() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts([
        frame_json("Basketball", "unknown", &["Lakers"]),
        frame_json("unknown", "unknown", &["Heat"]),
        frame_json("Basketball", "unknown", &["Lakers", "Heat"]),
    ]));
    let mut controller =
        PipelineController::new(annotator.clone(), options(1, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://game?frames=90")
        .expect("analyze synthetic video");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.frames_sampled, 3);
    assert_eq!(report.summary.event.sport, "Basketball");
    assert_eq!(report.summary.event.league, UNKNOWN);
    assert_eq!(report.summary.event.teams, vec!["Heat", "Lakers"]);
    assert_eq!(report.summary.frames_analyzed, 3);
    assert_eq!(annotator.batch_sizes(), vec![1, 1, 1]);
    assert_eq!(controller.state(), PipelineState::Done);
    assert_eq!(
        controller.transitions().first().copied(),
        Some(PipelineState::Idle)
    );
    assert!(controller.transitions().contains(&PipelineState::Sampling));
    assert!(controller.transitions().contains(&PipelineState::Aggregating));
}

#[test]
fn fenced_reply_is_recovered() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts([
        "Sure! ```json\n{\"sport\":\"Hockey\"}\n```",
    ]));
    let mut controller =
        PipelineController::new(annotator, options(10, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://rink?frames=1")
        .expect("analyze synthetic video");

    assert_eq!(report.summary.event.sport, "Hockey");
    assert_eq!(report.summary.frames_analyzed, 1);
    assert_eq!(report.fallback_records, 0);
}

#[test]
fn zero_length_video_yields_blank_summary() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts(Vec::<String>::new()));
    let mut controller =
        PipelineController::new(annotator.clone(), options(10, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://empty?frames=0")
        .expect("empty video is not an error");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.frames_sampled, 0);
    assert_eq!(report.batches_total, 0);
    assert_eq!(report.summary.frames_analyzed, 0);
    assert!(report.summary.event.is_blank());
    assert_eq!(annotator.calls(), 0);

    let json: serde_json::Value =
        serde_json::from_str(&report.summary.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["sport"], "unknown");
    assert_eq!(json["teams"], serde_json::json!([]));
    assert_eq!(json["frames_analyzed"], 0);
}

#[test]
fn early_stop_skips_remaining_batches() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts([
        batch_json(5, "Basketball", "NBA", &["Lakers", "Heat"]),
        batch_json(5, "Basketball", "NBA", &["Celtics"]),
    ]));
    let mut controller =
        PipelineController::new(annotator.clone(), options(5, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://finals")
        .expect("analyze synthetic video");

    assert_eq!(report.frames_sampled, 10);
    assert_eq!(report.outcome, RunOutcome::EarlyStopped);
    assert_eq!(annotator.calls(), 1);
    assert_eq!(report.batches_submitted, 1);
    assert_eq!(report.batches_total, 2);
    assert_eq!(report.summary.frames_analyzed, 5);
    assert_eq!(report.summary.event.teams, vec!["Heat", "Lakers"]);
}

#[test]
fn early_stop_does_not_fire_on_the_last_batch() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts([batch_json(
        3,
        "Soccer",
        "EPL",
        &["Arsenal", "Chelsea"],
    )]));
    let mut controller =
        PipelineController::new(annotator, options(10, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://derby?frames=90")
        .expect("analyze synthetic video");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.summary.frames_analyzed, 3);
}

#[test]
fn failed_batch_is_skipped() {
    let annotator = Arc::new(ScriptedAnnotator::new([
        Err("503 service unavailable".to_string()),
        Ok(frame_json("Hockey", "NHL", &["Bruins"])),
    ]));
    let mut controller =
        PipelineController::new(annotator.clone(), options(5, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://rink")
        .expect("backend failures are not fatal");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(annotator.calls(), 2);
    assert_eq!(report.batches_failed, 1);
    assert_eq!(report.summary.frames_analyzed, 1);
    assert_eq!(report.summary.event.league, "NHL");
}

#[test]
fn fallback_records_are_counted() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts([
        "I'm sorry, I can't tell what is happening in these images.".to_string(),
        frame_json("Hockey", "unknown", &[]),
    ]));
    let mut controller =
        PipelineController::new(annotator, options(5, EarlyStopPolicy::disabled()));

    let report = controller
        .analyze_path("stub://rink")
        .expect("analyze synthetic video");

    assert_eq!(report.fallback_records, 1);
    assert_eq!(report.summary.frames_analyzed, 2);
    assert_eq!(report.summary.event.sport, "Hockey");
}

#[test]
fn batches_are_capped_by_the_annotator_limit() {
    let annotator = Arc::new(
        ScriptedAnnotator::from_fn(|frames| Ok(batch_json(frames.len(), "Tennis", "ATP", &[])))
            .with_max_batch_size(3),
    );
    let mut controller =
        PipelineController::new(annotator.clone(), options(10, EarlyStopPolicy::default()));

    let report = controller
        .analyze_path("stub://court")
        .expect("analyze synthetic video");

    assert_eq!(annotator.batch_sizes(), vec![3, 3, 3, 1]);
    assert_eq!(report.summary.frames_analyzed, 10);
}

#[test]
fn submitted_frames_are_jpeg_encoded_in_sampling_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let annotator = Arc::new(ScriptedAnnotator::from_fn(move |frames| {
        for frame in frames {
            assert!(frame.jpeg_bytes().starts_with(&[0xFF, 0xD8]));
            recorder.lock().unwrap().push(frame.source_index());
        }
        Ok(frame_json("Golf", "PGA", &[]))
    }));
    let mut controller = PipelineController::new(
        annotator,
        PipelineOptions {
            sampler: SamplerConfig {
                strategy: SamplingStrategy::EvenSpread,
                max_frames: 4,
                ..SamplerConfig::default()
            },
            batch_size: 2,
            early_stop: EarlyStopPolicy::disabled(),
            ..PipelineOptions::default()
        },
    );

    controller
        .analyze_path("stub://course?frames=100")
        .expect("analyze synthetic video");

    assert_eq!(*seen.lock().unwrap(), vec![0, 25, 50, 75]);
}

#[test]
fn corrupt_frames_are_skipped() {
    let annotator = Arc::new(ScriptedAnnotator::from_fn(|frames| {
        Ok(batch_json(frames.len(), "Baseball", "MLB", &[]))
    }));
    let mut controller =
        PipelineController::new(annotator, options(10, EarlyStopPolicy::disabled()));

    let report = controller
        .analyze_path("stub://innings?frames=90&corrupt=30")
        .expect("analyze synthetic video");

    assert_eq!(report.frames_sampled, 2);
    assert_eq!(report.sampling.encode_failures, 1);
    assert_eq!(report.summary.frames_analyzed, 2);
}

/// Soccer and Hockey tie two-all; the tie goes to whichever is folded first.
fn mixed_sports(frames: &[Frame]) -> anyhow::Result<String> {
    const SPORTS: [&str; 5] = ["Soccer", "Hockey", "Hockey", "Soccer", "Rugby"];
    let sport = SPORTS[frames[0].ordinal() % SPORTS.len()];
    Ok(frame_json(sport, "unknown", &[sport]))
}

#[test]
fn concurrent_submission_folds_in_submission_order() {
    let run = |max_in_flight: usize| {
        let annotator = Arc::new(ScriptedAnnotator::from_fn(mixed_sports));
        let mut controller = PipelineController::new(
            annotator,
            PipelineOptions {
                batch_size: 1,
                max_in_flight,
                early_stop: EarlyStopPolicy::disabled(),
                scalar_policy: ScalarPolicy::Majority,
                ..PipelineOptions::default()
            },
        );
        controller
            .analyze_path("stub://mixed?frames=150")
            .expect("analyze synthetic video")
    };

    let sequential = run(1);
    let concurrent = run(4);
    assert_eq!(sequential.summary, concurrent.summary);
    assert_eq!(sequential.summary.event.sport, "Soccer");
    assert_eq!(concurrent.batches_submitted, 5);
}

#[test]
fn concurrent_window_discards_results_after_early_stop() {
    let annotator = Arc::new(ScriptedAnnotator::from_fn(|frames| {
        Ok(batch_json(frames.len(), "Basketball", "NBA", &["Lakers", "Heat"]))
    }));
    let mut controller = PipelineController::new(
        annotator.clone(),
        PipelineOptions {
            batch_size: 2,
            max_in_flight: 3,
            ..PipelineOptions::default()
        },
    );

    let report = controller
        .analyze_path("stub://finals")
        .expect("analyze synthetic video");

    assert_eq!(report.outcome, RunOutcome::EarlyStopped);
    assert_eq!(annotator.calls(), 3);
    assert_eq!(report.batches_submitted, 3);
    assert_eq!(report.summary.frames_analyzed, 2);
}

#[test]
fn cancellation_stops_before_the_next_batch() {
    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let annotator = Arc::new(ScriptedAnnotator::from_fn(move |frames| {
        trigger.cancel();
        Ok(batch_json(frames.len(), "Cricket", "IPL", &[]))
    }));
    let mut controller =
        PipelineController::new(annotator.clone(), options(2, EarlyStopPolicy::disabled()))
            .with_cancel_flag(cancel);

    let report = controller
        .analyze_path("stub://match")
        .expect("analyze synthetic video");

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(annotator.calls(), 1);
    assert_eq!(report.summary.frames_analyzed, 2);
    assert_eq!(report.summary.event.sport, "Cricket");
}

#[test]
fn elapsed_deadline_submits_nothing() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts(["{}"]));
    let mut controller = PipelineController::new(
        annotator.clone(),
        PipelineOptions {
            deadline: Some(Duration::ZERO),
            ..PipelineOptions::default()
        },
    );

    let report = controller
        .analyze_path("stub://late")
        .expect("analyze synthetic video");

    assert_eq!(report.outcome, RunOutcome::DeadlineExceeded);
    assert_eq!(annotator.calls(), 0);
    assert_eq!(report.frames_sampled, 10);
    assert_eq!(report.summary.frames_analyzed, 0);
}

#[test]
fn deadline_bounds_every_backend_call() {
    let deadline = Duration::from_secs(5);
    let annotator = Arc::new(ScriptedAnnotator::from_fn(|frames| {
        Ok(batch_json(frames.len(), "Rugby", "unknown", &[]))
    }));
    let mut controller = PipelineController::new(
        annotator.clone(),
        PipelineOptions {
            batch_size: 2,
            max_in_flight: 2,
            early_stop: EarlyStopPolicy::disabled(),
            deadline: Some(deadline),
            ..PipelineOptions::default()
        },
    );

    let report = controller
        .analyze_path("stub://sevens")
        .expect("analyze synthetic video");

    assert_eq!(report.outcome, RunOutcome::Completed);
    let timeouts = annotator.timeouts();
    assert_eq!(timeouts.len(), 5);
    for timeout in timeouts {
        let timeout = timeout.expect("deadline run passes a per-call limit");
        assert!(timeout > Duration::ZERO);
        assert!(timeout <= deadline);
    }
}

#[test]
fn no_deadline_leaves_calls_unbounded() {
    let annotator = Arc::new(ScriptedAnnotator::from_fn(|frames| {
        Ok(batch_json(frames.len(), "Rugby", "unknown", &[]))
    }));
    let mut controller =
        PipelineController::new(annotator.clone(), options(5, EarlyStopPolicy::disabled()));

    controller
        .analyze_path("stub://sevens")
        .expect("analyze synthetic video");

    assert_eq!(annotator.timeouts(), vec![None, None]);
}

#[test]
fn missing_video_is_reported() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts(["{}"]));
    let mut controller =
        PipelineController::new(annotator.clone(), options(10, EarlyStopPolicy::default()));

    let err = controller
        .analyze_path("/nonexistent/broadcast_lens/game.mp4")
        .unwrap_err();

    match err {
        AnalysisError::VideoUnavailable { path, reason } => {
            assert_eq!(path, "/nonexistent/broadcast_lens/game.mp4");
            assert!(reason.contains("does not exist"));
        }
    }
    assert_eq!(annotator.calls(), 0);
    assert_eq!(controller.state(), PipelineState::Done);
}

#[test]
fn remote_urls_are_rejected() {
    let annotator = Arc::new(ScriptedAnnotator::from_texts(["{}"]));
    let mut controller =
        PipelineController::new(annotator, options(10, EarlyStopPolicy::default()));

    let err = controller
        .analyze_path("https://example.com/game.mp4")
        .unwrap_err();
    assert!(err.to_string().contains("https://example.com/game.mp4"));
}
