//! Synchronous frame-to-packet pipeline.
//!
//! ## Per-frame stages
//!
//! ```text
//! 1. FrameBuffer::push      → reject malformed / out-of-order frames
//! 2. AnalyzerStage::run     → VAD, prosody, emotion (+ language)
//! 3. PredictorChain::run    → intent → timing → early intent → turn taking
//! 4. Emission policy        → IntentPacket if the interval has elapsed
//! 5. Callbacks              → invoked inline, in registration order
//! ```
//!
//! Frames are processed strictly one at a time. State updates on every
//! frame; only packet emission is throttled.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics};
use crate::analysis::{
    Analyzer, AnalyzerStage, EmotionAnalyzer, LanguageAnalyzer, ProsodyAnalyzer, VadAnalyzer,
};
use crate::audio::AudioFrame;
use crate::buffering::FrameBuffer;
use crate::config::PipelineConfig;
use crate::error::{FrameError, Result, TalkytalkError};
use crate::packet::IntentPacket;
use crate::predict::{
    EarlyIntentPredictor, IntentPredictor, PredictionContext, Predictor, PredictorChain,
    PredictorState, TimingPredictor, TurnTakingPredictor,
};
use crate::source::FrameSource;

/// Synchronous packet callback. Runs inside frame processing and must not block.
pub type PacketCallback = Box<dyn FnMut(&IntentPacket) + Send>;

/// Accumulates analyzers, predictors and callbacks, then validates them
/// into a [`Pipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    analyzers: Vec<Box<dyn Analyzer>>,
    predictors: Vec<Box<dyn Predictor>>,
    callbacks: Vec<PacketCallback>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            analyzers: Vec::new(),
            predictors: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    /// Register the built-in analyzers and all four predictors from the config.
    pub fn standard(mut self) -> Self {
        let c = &self.config;
        let mut analyzers: Vec<Box<dyn Analyzer>> = vec![
            Box::new(VadAnalyzer::new(c.vad.clone())),
            Box::new(ProsodyAnalyzer::new(c.prosody.clone())),
            Box::new(EmotionAnalyzer::new(c.emotion.clone())),
        ];
        if c.language.enabled {
            analyzers.push(Box::new(LanguageAnalyzer::new(&c.language)));
        }
        let predictors: Vec<Box<dyn Predictor>> = vec![
            Box::new(IntentPredictor::new(c.intent.clone())),
            Box::new(TimingPredictor::new(c.timing.clone())),
            Box::new(EarlyIntentPredictor::new(c.early_intent.clone())),
            Box::new(TurnTakingPredictor::new(c.turn_taking.clone())),
        ];
        self.analyzers.extend(analyzers);
        self.predictors.extend(predictors);
        self
    }

    /// Analyzers run in the order they are added.
    pub fn analyzer(mut self, analyzer: impl Analyzer) -> Self {
        self.analyzers.push(Box::new(analyzer));
        self
    }

    /// Predictors run in stage order whatever the order they are added in.
    pub fn predictor(mut self, predictor: impl Predictor) -> Self {
        self.predictors.push(Box::new(predictor));
        self
    }

    pub fn on_packet<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&IntentPacket) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// # Errors
    /// `TalkytalkError::Configuration` for invalid values or duplicate
    /// analyzer / predictor names.
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        ensure_unique("analyzer", self.analyzers.iter().map(|a| a.name()))?;
        ensure_unique("predictor", self.predictors.iter().map(|p| p.name()))?;

        let buffer = FrameBuffer::new(self.config.audio, self.config.buffer_duration_ms);
        let state = PredictorState::new(self.config.language.default_language.clone());
        Ok(Pipeline {
            buffer,
            analyzers: AnalyzerStage::new(self.analyzers),
            predictors: PredictorChain::new(self.predictors),
            state,
            callbacks: self.callbacks,
            last_emit_ms: None,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            config: self.config,
        })
    }
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(TalkytalkError::config(format!(
                "duplicate {kind} name `{name}`"
            )));
        }
    }
    Ok(())
}

/// One conversation's worth of analysis and prediction.
pub struct Pipeline {
    config: PipelineConfig,
    buffer: FrameBuffer,
    analyzers: AnalyzerStage,
    predictors: PredictorChain,
    state: PredictorState,
    callbacks: Vec<PacketCallback>,
    last_emit_ms: Option<u64>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// A pipeline with the standard analyzers and predictors.
    pub fn standard(config: PipelineConfig) -> Result<Self> {
        PipelineBuilder::new(config).standard().build()
    }

    /// Process one frame, returning a packet if the emission policy fires.
    ///
    /// # Errors
    /// A rejected frame leaves buffer and predictor state untouched; the
    /// caller may carry on with the next frame.
    pub fn process(
        &mut self,
        frame: AudioFrame,
    ) -> std::result::Result<Option<IntentPacket>, FrameError> {
        let started = Instant::now();
        let frame_id = frame.frame_id();
        let timestamp_ms = frame.timestamp_ms();

        if let Err(e) = self.buffer.push(frame) {
            self.diagnostics
                .frames_rejected
                .fetch_add(1, Ordering::Relaxed);
            warn!(frame_id, error = %e, "frame rejected");
            return Err(e);
        }
        self.diagnostics
            .frames_accepted
            .fetch_add(1, Ordering::Relaxed);

        let window = self.buffer.window();
        let Some(latest) = window.latest() else {
            return Ok(None);
        };
        let analysis = self.analyzers.run(latest, &window, &self.diagnostics);

        let frame_duration_ms = self.config.audio.frame_duration_ms as u64;
        let ctx = PredictionContext::new(frame_id, timestamp_ms, frame_duration_ms, &analysis);
        self.predictors.run(&ctx, &mut self.state);

        let packet = self.maybe_emit(frame_id, timestamp_ms);

        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(frame_duration_ms) {
            self.diagnostics
                .over_budget_frames
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                frame_id,
                elapsed_us = elapsed.as_micros() as u64,
                budget_ms = frame_duration_ms,
                "frame over real-time budget"
            );
        }
        Ok(packet)
    }

    fn maybe_emit(&mut self, frame_id: u64, timestamp_ms: u64) -> Option<IntentPacket> {
        let anchor = *self.last_emit_ms.get_or_insert(timestamp_ms);
        if timestamp_ms.saturating_sub(anchor) < self.config.emit_interval_ms {
            return None;
        }
        if self.state.intent.confidence < self.config.min_confidence_to_emit {
            return None;
        }
        self.last_emit_ms = Some(timestamp_ms);

        let packet = IntentPacket::assemble(
            &self.state,
            frame_id,
            timestamp_ms,
            self.config.language.target_language.as_deref(),
        );
        for callback in &mut self.callbacks {
            callback(&packet);
        }
        self.diagnostics
            .packets_emitted
            .fetch_add(1, Ordering::Relaxed);
        Some(packet)
    }

    /// Lazily process `frames`, yielding emitted packets and rejected frames.
    pub fn packets<I>(&mut self, frames: I) -> Packets<'_, I::IntoIter>
    where
        I: IntoIterator<Item = AudioFrame>,
    {
        Packets {
            pipeline: self,
            frames: frames.into_iter(),
        }
    }

    /// Drain `source` to completion. Rejected frames are logged and skipped.
    pub fn run_sync<S: FrameSource>(&mut self, source: S) -> Vec<IntentPacket> {
        self.packets(source.frames())
            .filter_map(|r| r.ok())
            .collect()
    }

    /// Back to a fresh conversation. Configuration, callbacks and
    /// diagnostics counters are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.analyzers.reset();
        self.state = PredictorState::new(self.config.language.default_language.clone());
        self.last_emit_ms = None;
    }

    pub fn state(&self) -> &PredictorState {
        &self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyzer_names(&self) -> Vec<String> {
        self.analyzers.names().map(str::to_string).collect()
    }

    pub fn predictor_names(&self) -> Vec<String> {
        self.predictors.names().map(str::to_string).collect()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub(crate) fn diagnostics_handle(&self) -> Arc<PipelineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }
}

/// Iterator returned by [`Pipeline::packets`].
pub struct Packets<'a, I> {
    pipeline: &'a mut Pipeline,
    frames: I,
}

impl<I> Iterator for Packets<'_, I>
where
    I: Iterator<Item = AudioFrame>,
{
    type Item = std::result::Result<IntentPacket, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.frames.next()?;
            match self.pipeline.process(frame) {
                Ok(Some(packet)) => return Some(Ok(packet)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResult, AnalysisSet};
    use crate::audio::AudioConfig;
    use crate::buffering::FrameWindow;
    use crate::predict::PredictorStage;
    use parking_lot::Mutex;

    fn silence(id: u64) -> AudioFrame {
        AudioFrame::silence(&AudioConfig::default(), id, id * 20)
    }

    fn config(emit_interval_ms: u64) -> PipelineConfig {
        PipelineConfig {
            emit_interval_ms,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn standard_pipeline_registration_order() {
        let pipeline = Pipeline::standard(PipelineConfig::default()).expect("valid");
        assert_eq!(pipeline.analyzer_names(), vec!["vad", "prosody", "emotion"]);
        assert_eq!(
            pipeline.predictor_names(),
            vec!["intent", "timing", "early_intent", "turn_taking"]
        );

        let mut config = PipelineConfig::default();
        config.language.enabled = true;
        let pipeline = Pipeline::standard(config).expect("valid");
        assert_eq!(pipeline.analyzer_names().last().map(String::as_str), Some("language"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = Pipeline::builder(PipelineConfig::default())
            .standard()
            .analyzer(VadAnalyzer::default())
            .build();
        assert!(matches!(result, Err(TalkytalkError::Configuration(_))));
    }

    #[test]
    fn invalid_config_is_rejected_before_any_frame() {
        let mut config = PipelineConfig::default();
        config.turn_taking.min_turn_gap_ms = 5_000;
        assert!(Pipeline::standard(config).is_err());
    }

    #[test]
    fn emission_is_anchored_at_first_frame() {
        let mut pipeline = Pipeline::standard(config(100)).expect("valid");
        let emitted: Vec<u64> = (0..30)
            .filter_map(|id| pipeline.process(silence(id)).expect("valid frame"))
            .map(|p| p.timestamp_ms)
            .collect();
        assert_eq!(emitted, vec![100, 200, 300, 400, 500]);
        assert_eq!(pipeline.diagnostics().packets_emitted, 5);
        assert_eq!(pipeline.state().frames_observed, 30);
    }

    #[test]
    fn zero_interval_emits_every_frame() {
        let mut pipeline = Pipeline::standard(config(0)).expect("valid");
        let count = pipeline.packets((0..10).map(silence)).count();
        assert_eq!(count, 10);
    }

    #[test]
    fn confidence_gate_holds_packets_back() {
        let mut cfg = config(20);
        cfg.min_confidence_to_emit = 0.5;
        let mut pipeline = Pipeline::standard(cfg).expect("valid");
        assert_eq!(pipeline.packets((0..20).map(silence)).count(), 0);
        assert_eq!(pipeline.state().frames_observed, 20);
    }

    #[test]
    fn rejected_frame_leaves_state_untouched() {
        let mut pipeline = Pipeline::standard(config(20)).expect("valid");
        pipeline.process(silence(5)).expect("first frame");
        let before = pipeline.state().clone();

        let err = pipeline.process(silence(5)).unwrap_err();
        assert_eq!(err, FrameError::NonMonotonicId { previous: 5, got: 5 });
        let short = AudioFrame::new(vec![0.0; 10], 16_000, 6, 120);
        assert!(pipeline.process(short).is_err());

        assert_eq!(pipeline.state(), &before);
        let diag = pipeline.diagnostics();
        assert_eq!((diag.frames_accepted, diag.frames_rejected), (1, 2));
        pipeline.process(silence(6)).expect("stream continues");
    }

    #[test]
    fn packets_iterator_surfaces_errors_lazily() {
        let mut pipeline = Pipeline::standard(config(0)).expect("valid");
        let frames = vec![silence(0), silence(0), silence(1)];
        let results: Vec<_> = pipeline.packets(frames).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn callbacks_see_every_emitted_packet() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut pipeline = Pipeline::builder(config(40))
            .standard()
            .on_packet(move |p| sink.lock().push(p.frame_id))
            .build()
            .expect("valid");
        let returned: Vec<u64> = pipeline
            .packets((0..10).map(silence))
            .map(|r| r.expect("valid").frame_id)
            .collect();
        assert_eq!(*seen.lock(), returned);
        assert_eq!(returned, vec![2, 4, 6, 8]);
    }

    struct Exploding;

    impl Analyzer for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn analyze(
            &mut self,
            _frame: &AudioFrame,
            _window: &FrameWindow<'_>,
            _prior: &AnalysisSet,
        ) -> Result<AnalysisResult> {
            Err(TalkytalkError::Analyzer {
                analyzer: "exploding".into(),
                reason: "always".into(),
            })
        }
    }

    #[test]
    fn analyzer_failure_does_not_stop_the_stream() {
        let mut pipeline = Pipeline::builder(config(20))
            .standard()
            .analyzer(Exploding)
            .build()
            .expect("valid");
        let count = pipeline.packets((0..5).map(silence)).filter(|r| r.is_ok()).count();
        assert_eq!(count, 4);
        assert_eq!(pipeline.diagnostics().analyzer_failures, 5);
    }

    struct Marker;

    impl Predictor for Marker {
        fn name(&self) -> &str {
            "marker"
        }

        fn stage(&self) -> PredictorStage {
            PredictorStage::Intent
        }

        fn predict(&self, _ctx: &PredictionContext<'_>, state: &mut PredictorState) {
            state.language = "marked".into();
        }
    }

    #[test]
    fn reset_restores_a_fresh_conversation() {
        let mut pipeline = Pipeline::builder(config(20))
            .predictor(Marker)
            .build()
            .expect("valid");
        pipeline.process(silence(10)).expect("valid");
        assert_eq!(pipeline.state().language, "marked");

        pipeline.reset();
        assert_eq!(pipeline.state(), &PredictorState::new("unknown"));
        // Ids may restart after a reset.
        pipeline.process(silence(0)).expect("valid after reset");
    }
}
