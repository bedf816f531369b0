use std::time::{Duration, Instant};

use talkytalk_core::{AudioConfig, FrameSource, Pipeline, PipelineConfig, SyntheticSource};

fn speech_like(audio: AudioConfig) -> SyntheticSource {
    let mut source = SyntheticSource::new(audio);
    for i in 0..5 {
        let base = 120.0 + 20.0 * i as f32;
        source = source
            .syllabic(base * 2.0, base, 1_200, 0.6, 5.5)
            .noise(300, 0.002)
            .glide(base, base * 1.8, 600, 0.3)
            .silence(400);
    }
    source
}

#[test]
fn frames_process_within_real_time_budget() {
    let config = PipelineConfig::default();
    let budget = Duration::from_millis(config.audio.frame_duration_ms as u64);
    let mut pipeline = Pipeline::standard(config.clone()).expect("valid config");

    let mut timings = Vec::new();
    for frame in speech_like(config.audio).frames() {
        let start = Instant::now();
        pipeline.process(frame).expect("well-formed frame");
        timings.push(start.elapsed());
    }
    assert_eq!(timings.len(), 625);

    timings.sort();
    let p95 = timings[timings.len() * 95 / 100];
    let total: Duration = timings.iter().sum();
    let mean = total / timings.len() as u32;
    assert!(
        p95 < budget,
        "p95 frame time too high: {:?} (budget {:?})",
        p95,
        budget
    );
    assert!(mean < budget / 2, "mean frame time {:?}", mean);

    let diag = pipeline.diagnostics();
    assert_eq!(diag.frames_accepted, 625);
    assert!(diag.over_budget_frames * 20 < diag.frames_accepted);
}

#[test]
fn reset_pipeline_matches_a_fresh_one() {
    let config = PipelineConfig {
        emit_interval_ms: 60,
        ..PipelineConfig::default()
    };
    let mut reused = Pipeline::standard(config.clone()).expect("valid config");
    reused.run_sync(speech_like(config.audio));
    reused.reset();

    let mut fresh = Pipeline::standard(config.clone()).expect("valid config");
    let source = || {
        SyntheticSource::new(config.audio)
            .syllabic(300.0, 140.0, 800, 0.7, 6.0)
            .silence(500)
    };
    assert_eq!(reused.run_sync(source()), fresh.run_sync(source()));
}
