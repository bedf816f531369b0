//! Feature extraction.
//!
//! Analyzers turn the current frame plus the buffered window into an
//! [`AnalysisResult`]. They produce signals, never decisions. The
//! [`AnalyzerStage`] runs them once per frame in registration order; a later
//! analyzer may read what earlier ones reported for the same frame (prosody
//! reads the VAD decision, emotion reads both).
//!
//! Swap in a neural VAD or a real language identifier by implementing
//! [`Analyzer`] and registering it under the same name.

pub mod emotion;
pub mod language;
pub mod prosody;
pub mod vad;

pub use emotion::{EmotionAnalyzer, EmotionConfig};
pub use language::{LanguageAnalyzer, LanguageConfig};
pub use prosody::{Intonation, ProsodyAnalyzer, ProsodyConfig};
pub use vad::{VadAnalyzer, VadConfig, VadDecision};

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::warn;

use crate::audio::AudioFrame;
use crate::buffering::FrameWindow;
use crate::engine::diagnostics::PipelineDiagnostics;
use crate::error::Result;

/// Feature names shared between analyzers and predictors.
pub mod features {
    pub const IS_SPEECH: &str = "is_speech";
    pub const SPEECH_PROBABILITY: &str = "speech_probability";
    pub const RAW_SPEECH_PROBABILITY: &str = "raw_speech_probability";
    pub const ENERGY_DB: &str = "energy_db";
    pub const ZERO_CROSSING_RATE: &str = "zero_crossing_rate";
    pub const THRESHOLD_DB: &str = "threshold_db";
    pub const NOISE_FLOOR_DB: &str = "noise_floor_db";

    pub const PITCH_HZ: &str = "pitch_hz";
    pub const PITCH_VARIANCE: &str = "pitch_variance";
    pub const TEMPO: &str = "tempo";
    pub const INTONATION: &str = "intonation";
    pub const IS_RISING_INTONATION: &str = "is_rising_intonation";
    pub const IS_FALLING_INTONATION: &str = "is_falling_intonation";
    pub const PAUSE_DURATION_MS: &str = "pause_duration_ms";
    pub const IS_PAUSING: &str = "is_pausing";

    pub const AROUSAL: &str = "arousal";
    pub const VALENCE: &str = "valence";
    pub const QUADRANT: &str = "quadrant";
    pub const RAW_AROUSAL: &str = "raw_arousal";
    pub const RAW_VALENCE: &str = "raw_valence";
    pub const VALENCE_CONFIDENCE: &str = "valence_confidence";

    pub const LANGUAGE: &str = "language";
}

/// A single extracted feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Flag(bool),
    Scalar(f32),
    Label(String),
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Flag(v)
    }
}

impl From<f32> for FeatureValue {
    fn from(v: f32) -> Self {
        FeatureValue::Scalar(v)
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Scalar(v as f32)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Label(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Label(v)
    }
}

/// Output of one analyzer for one frame. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub analyzer_name: String,
    pub frame_id: u64,
    pub timestamp_ms: u64,
    /// Ordered so results serialize identically across runs.
    pub data: BTreeMap<String, FeatureValue>,
    pub confidence: Option<f32>,
}

impl AnalysisResult {
    pub fn new(analyzer_name: impl Into<String>, frame: &AudioFrame) -> Self {
        Self {
            analyzer_name: analyzer_name.into(),
            frame_id: frame.frame_id(),
            timestamp_ms: frame.timestamp_ms(),
            data: BTreeMap::new(),
            confidence: None,
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<FeatureValue>) -> Self {
        self.data.insert(name.to_string(), value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.data.get(name) {
            Some(FeatureValue::Flag(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn scalar(&self, name: &str) -> Option<f32> {
        match self.data.get(name) {
            Some(FeatureValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        match self.data.get(name) {
            Some(FeatureValue::Label(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// The results gathered for one frame, in analyzer order.
///
/// Discarded once the predictor stage has consumed it.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSet {
    results: Vec<AnalysisResult>,
    failed: Vec<String>,
}

impl AnalysisSet {
    pub fn get(&self, analyzer_name: &str) -> Option<&AnalysisResult> {
        self.results
            .iter()
            .find(|r| r.analyzer_name == analyzer_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Names of analyzers that failed on this frame.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn insert(&mut self, result: AnalysisResult) {
        self.results.push(result);
    }
}

/// Contract for feature extractors.
///
/// Implementors may keep private smoothing state (noise floors, pitch
/// history, EMAs) but must not depend on which pipeline they belong to.
pub trait Analyzer: Send + 'static {
    /// Unique name; predictors look results up by it.
    fn name(&self) -> &str;

    /// Analyse the newest frame.
    ///
    /// `window` already contains `frame` as its latest entry. `prior` holds
    /// results from analyzers registered earlier, for this frame only.
    ///
    /// # Errors
    /// A failure drops this analyzer's result for this frame only.
    fn analyze(
        &mut self,
        frame: &AudioFrame,
        window: &FrameWindow<'_>,
        prior: &AnalysisSet,
    ) -> Result<AnalysisResult>;

    /// Reset any internal state.
    fn reset(&mut self) {}
}

/// Runs every registered analyzer once per frame, isolating failures.
pub struct AnalyzerStage {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl AnalyzerStage {
    pub fn new(analyzers: Vec<Box<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.analyzers.iter().map(|a| a.name())
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    pub fn run(
        &mut self,
        frame: &AudioFrame,
        window: &FrameWindow<'_>,
        diagnostics: &PipelineDiagnostics,
    ) -> AnalysisSet {
        let mut set = AnalysisSet::default();
        for analyzer in &mut self.analyzers {
            match analyzer.analyze(frame, window, &set) {
                Ok(result) => set.insert(result),
                Err(e) => {
                    diagnostics
                        .analyzer_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        analyzer = analyzer.name(),
                        frame_id = frame.frame_id(),
                        error = %e,
                        "analyzer failed, treating as no new evidence"
                    );
                    set.failed.push(analyzer.name().to_string());
                }
            }
        }
        set
    }

    pub fn reset(&mut self) {
        for analyzer in &mut self.analyzers {
            analyzer.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioConfig;
    use crate::buffering::FrameBuffer;
    use crate::error::TalkytalkError;

    struct Constant(&'static str);

    impl Analyzer for Constant {
        fn name(&self) -> &str {
            self.0
        }

        fn analyze(
            &mut self,
            frame: &AudioFrame,
            _window: &FrameWindow<'_>,
            prior: &AnalysisSet,
        ) -> Result<AnalysisResult> {
            Ok(AnalysisResult::new(self.0, frame).with("seen_before", prior.len() as u64))
        }
    }

    struct Broken;

    impl Analyzer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn analyze(
            &mut self,
            _frame: &AudioFrame,
            _window: &FrameWindow<'_>,
            _prior: &AnalysisSet,
        ) -> Result<AnalysisResult> {
            Err(TalkytalkError::Other(anyhow::anyhow!("intentional test failure")))
        }
    }

    #[test]
    fn failing_analyzer_is_isolated() {
        let audio = AudioConfig::default();
        let mut buffer = FrameBuffer::new(audio, 1_000);
        let frame = AudioFrame::silence(&audio, 0, 0);
        buffer.push(frame.clone()).expect("valid frame");

        let mut stage = AnalyzerStage::new(vec![
            Box::new(Constant("first")),
            Box::new(Broken),
            Box::new(Constant("second")),
        ]);
        let diagnostics = PipelineDiagnostics::default();
        let set = stage.run(&frame, &buffer.window(), &diagnostics);

        assert_eq!(set.len(), 2);
        assert!(set.get("broken").is_none());
        assert_eq!(set.failed(), &["broken".to_string()]);
        assert_eq!(set.get("first").and_then(|r| r.scalar("seen_before")), Some(0.0));
        assert_eq!(set.get("second").and_then(|r| r.scalar("seen_before")), Some(1.0));
        assert_eq!(diagnostics.snapshot().analyzer_failures, 1);
    }

    #[test]
    fn typed_accessors_ignore_mismatched_kinds() {
        let frame = AudioFrame::silence(&AudioConfig::default(), 1, 20);
        let result = AnalysisResult::new("x", &frame)
            .with("flag", true)
            .with("num", 0.5f32)
            .with("text", "en")
            .with_confidence(2.0);
        assert_eq!(result.flag("flag"), Some(true));
        assert_eq!(result.scalar("flag"), None);
        assert_eq!(result.scalar("num"), Some(0.5));
        assert_eq!(result.label("text"), Some("en"));
        assert_eq!(result.confidence, Some(1.0));
        assert_eq!(result.frame_id, 1);
    }
}
