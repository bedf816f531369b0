//! Probabilistic prediction over analyzer outputs.
//!
//! Predictors are plain configuration holders; everything they remember
//! between frames lives in [`PredictorState`], which the pipeline owns and
//! hands to each predictor in turn. Running order is fixed by
//! [`PredictorStage`]: Intent, then Timing, then EarlyIntent, then
//! TurnTaking. Later stages read what earlier ones wrote this frame.

pub mod early_intent;
pub mod intent;
pub mod timing;
pub mod turn_taking;

pub use early_intent::{EarlyIntentConfig, EarlyIntentPredictor, EarlyIntentState, Hypothesis};
pub use intent::{IntentConfig, IntentPredictor, IntentState, RuleGuess};
pub use timing::{InterruptReason, TimingConfig, TimingPredictor, TimingState};
pub use turn_taking::{TurnState, TurnTakingConfig, TurnTakingPredictor, TurnTakingState};

use serde::Serialize;

use crate::analysis::{emotion, features, language, prosody, vad, AnalysisSet, Intonation};
use crate::packet::Emotion;

/// Where a predictor runs relative to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorStage {
    Intent,
    Timing,
    EarlyIntent,
    TurnTaking,
}

/// The analyzer outputs predictors care about, pulled out of one frame's
/// [`AnalysisSet`]. `None` means the analyzer was missing or failed, which
/// is "no new evidence", not negative evidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub is_speech: Option<bool>,
    pub speech_probability: Option<f32>,
    pub pitch_hz: Option<f32>,
    pub intonation: Option<Intonation>,
    pub tempo: Option<f32>,
    pub arousal: Option<f32>,
    pub valence: Option<f32>,
    pub language: Option<String>,
}

impl Evidence {
    pub fn from_analysis(set: &AnalysisSet) -> Self {
        let vad = set.get(vad::NAME);
        let prosody = set.get(prosody::NAME);
        let emotion = set.get(emotion::NAME);
        Self {
            is_speech: vad.and_then(|r| r.flag(features::IS_SPEECH)),
            speech_probability: vad.and_then(|r| r.scalar(features::SPEECH_PROBABILITY)),
            pitch_hz: prosody.and_then(|r| r.scalar(features::PITCH_HZ)),
            intonation: prosody
                .and_then(|r| r.label(features::INTONATION))
                .and_then(Intonation::parse),
            tempo: prosody.and_then(|r| r.scalar(features::TEMPO)),
            arousal: emotion.and_then(|r| r.scalar(features::AROUSAL)),
            valence: emotion.and_then(|r| r.scalar(features::VALENCE)),
            language: set
                .get(language::NAME)
                .and_then(|r| r.label(features::LANGUAGE))
                .map(str::to_string),
        }
    }
}

/// Everything a predictor may read about the current frame.
#[derive(Debug, Clone)]
pub struct PredictionContext<'a> {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    pub frame_duration_ms: u64,
    pub analysis: &'a AnalysisSet,
    pub evidence: Evidence,
}

impl<'a> PredictionContext<'a> {
    pub fn new(
        frame_id: u64,
        timestamp_ms: u64,
        frame_duration_ms: u64,
        analysis: &'a AnalysisSet,
    ) -> Self {
        Self {
            frame_id,
            timestamp_ms,
            frame_duration_ms,
            analysis,
            evidence: Evidence::from_analysis(analysis),
        }
    }
}

/// The pipeline's running belief about one conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorState {
    pub intent: IntentState,
    pub timing: TimingState,
    pub early_intent: EarlyIntentState,
    pub turn: TurnTakingState,
    /// Smoothed emotion, carried forward when the emotion analyzer is silent.
    pub emotion: Emotion,
    pub language: String,
    /// Last VAD decision (hangover included).
    pub speech_active: bool,
    /// Last known terminal intonation.
    pub intonation: Intonation,
    pub frames_observed: u64,
    pub last_frame_id: Option<u64>,
    pub last_timestamp_ms: Option<u64>,
}

impl Default for PredictorState {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl PredictorState {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            intent: IntentState::default(),
            timing: TimingState::default(),
            early_intent: EarlyIntentState::default(),
            turn: TurnTakingState::default(),
            emotion: Emotion::default(),
            language: language.into(),
            speech_active: false,
            intonation: Intonation::Flat,
            frames_observed: 0,
            last_frame_id: None,
            last_timestamp_ms: None,
        }
    }

    /// Fold the frame's shared signals into the state before any predictor runs.
    pub fn observe(&mut self, ctx: &PredictionContext<'_>) {
        if let Some(is_speech) = ctx.evidence.is_speech {
            self.speech_active = is_speech;
        }
        if let Some(intonation) = ctx.evidence.intonation {
            self.intonation = intonation;
        }
        self.frames_observed += 1;
        self.last_frame_id = Some(ctx.frame_id);
        self.last_timestamp_ms = Some(ctx.timestamp_ms);
    }

    pub fn is_rising(&self) -> bool {
        self.intonation == Intonation::Rising
    }

    pub fn is_falling(&self) -> bool {
        self.intonation == Intonation::Falling
    }
}

/// Contract for predictors.
pub trait Predictor: Send + 'static {
    /// Unique name.
    fn name(&self) -> &str;

    fn stage(&self) -> PredictorStage;

    /// Update `state` from this frame's context. Never fails: missing
    /// evidence leaves the relevant part of the state to decay or hold.
    fn predict(&self, ctx: &PredictionContext<'_>, state: &mut PredictorState);
}

/// Predictors sorted by stage; registration order breaks ties.
pub struct PredictorChain {
    predictors: Vec<Box<dyn Predictor>>,
}

impl PredictorChain {
    pub fn new(mut predictors: Vec<Box<dyn Predictor>>) -> Self {
        predictors.sort_by_key(|p| p.stage());
        Self { predictors }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.predictors.iter().map(|p| p.name())
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    pub fn run(&self, ctx: &PredictionContext<'_>, state: &mut PredictorState) {
        state.observe(ctx);
        for predictor in &self.predictors {
            predictor.predict(ctx, state);
        }
    }
}
