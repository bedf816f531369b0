//! `IntentPacket`: the pipeline's only output.
//!
//! A packet is an early, probabilistic, retractable signal. It is built fresh
//! from the predictor state at each emission and never changes afterwards;
//! a later packet may contradict an earlier one, and that is the contract.

pub mod adapter;

pub use adapter::{Adapter, CallbackAdapter, JsonAdapter};

use serde::{Deserialize, Serialize};

use crate::analysis::emotion::Quadrant;
use crate::predict::{InterruptReason, PredictorState, TurnState};

/// Intent categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Query,
    Command,
    Conversation,
    #[default]
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::Command => "command",
            Intent::Conversation => "conversation",
            Intent::Unknown => "unknown",
        }
    }
}

/// Circumplex emotion: arousal (calm → activated) and valence
/// (negative → positive), both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emotion {
    pub arousal: f32,
    pub valence: f32,
}

impl Emotion {
    /// Values are clamped into [0, 1].
    pub fn new(arousal: f32, valence: f32) -> Self {
        Self {
            arousal: arousal.clamp(0.0, 1.0),
            valence: valence.clamp(0.0, 1.0),
        }
    }

    pub fn quadrant(&self) -> Quadrant {
        Quadrant::of(self.arousal, self.valence)
    }
}

impl Default for Emotion {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// A meaningful pause, not a breath.
    pub user_paused: bool,
    pub interrupt_safe: bool,
    /// The clause that decided `interrupt_safe`.
    pub interrupt_reason: InterruptReason,
    pub speech_likelihood: f32,
    pub silence_duration_ms: u64,
}

/// The dominant early-intent hypothesis, as consumers see it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarlyIntentSignal {
    pub leading_intent: Intent,
    /// Softer, earlier cue than `timing.interrupt_safe`.
    pub interruptibility: f32,
    pub hypothesis_stable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSignal {
    /// `None` before the user has spoken.
    pub state: Option<TurnState>,
    pub overlap_probability: f32,
    pub suggested_wait_ms: u64,
    pub should_wait: bool,
    /// Time since the current user turn started; 0 before the first one.
    pub turn_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentPacket {
    pub intent: Intent,
    pub confidence: f32,
    pub language: String,
    pub target_language: Option<String>,
    pub emotion: Emotion,
    pub timing: Timing,
    pub early_intent: EarlyIntentSignal,
    pub turn: TurnSignal,
    pub frame_id: u64,
    pub timestamp_ms: u64,
}

impl IntentPacket {
    /// Snapshot the predictor state for the frame just processed.
    pub fn assemble(
        state: &PredictorState,
        frame_id: u64,
        timestamp_ms: u64,
        target_language: Option<&str>,
    ) -> Self {
        Self {
            intent: state.intent.intent,
            confidence: state.intent.confidence.clamp(0.0, 1.0),
            language: state.language.clone(),
            target_language: target_language.map(str::to_string),
            emotion: Emotion::new(state.emotion.arousal, state.emotion.valence),
            timing: Timing {
                user_paused: state.timing.user_paused,
                interrupt_safe: state.timing.interrupt_safe,
                interrupt_reason: state.timing.interrupt_reason,
                speech_likelihood: state.timing.speech_likelihood.clamp(0.0, 1.0),
                silence_duration_ms: state.timing.silence_ms,
            },
            early_intent: EarlyIntentSignal {
                leading_intent: state.early_intent.leading_intent(),
                interruptibility: state.early_intent.interruptibility.clamp(0.0, 1.0),
                hypothesis_stable: state.early_intent.hypothesis_stable,
            },
            turn: TurnSignal {
                state: state.turn.state,
                overlap_probability: state.turn.overlap_probability.clamp(0.0, 1.0),
                suggested_wait_ms: state.turn.suggested_wait_ms,
                should_wait: state.turn.should_wait,
                turn_duration_ms: state.turn.turn_duration_ms,
            },
            frame_id,
            timestamp_ms,
        }
    }

    /// Confident enough to act on: confidence above 0.6 and a known intent.
    pub fn is_actionable(&self) -> bool {
        self.confidence > 0.6 && self.intent != Intent::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_defaults_and_clamps() {
        assert_eq!(Emotion::default(), Emotion::new(0.5, 0.5));
        let e = Emotion::new(1.5, -0.5);
        assert_eq!(e.arousal, 1.0);
        assert_eq!(e.valence, 0.0);
        assert_eq!(e.quadrant(), Quadrant::Tense);
        assert_eq!(Emotion::new(0.3, 0.7).quadrant(), Quadrant::Calm);
    }

    #[test]
    fn assemble_from_fresh_state() {
        let state = PredictorState::new("en");
        let packet = IntentPacket::assemble(&state, 7, 140, Some("tr"));
        assert_eq!(packet.intent, Intent::Unknown);
        assert_eq!(packet.confidence, 0.0);
        assert_eq!(packet.language, "en");
        assert_eq!(packet.target_language.as_deref(), Some("tr"));
        assert_eq!(packet.turn.state, None);
        assert_eq!(packet.early_intent.leading_intent, Intent::Unknown);
        assert_eq!((packet.frame_id, packet.timestamp_ms), (7, 140));
    }

    #[test]
    fn actionable_needs_confidence_and_known_intent() {
        let mut packet = IntentPacket::assemble(&PredictorState::default(), 0, 0, None);
        packet.intent = Intent::Query;
        packet.confidence = 0.7;
        assert!(packet.is_actionable());
        packet.confidence = 0.4;
        assert!(!packet.is_actionable());
        packet.intent = Intent::Unknown;
        packet.confidence = 0.8;
        assert!(!packet.is_actionable());
    }

    #[test]
    fn serializes_camel_case() {
        let packet = IntentPacket::assemble(&PredictorState::default(), 1, 20, None);
        let value = serde_json::to_value(&packet).expect("serializable");
        assert_eq!(value["intent"], "unknown");
        assert_eq!(value["timing"]["interruptSafe"], false);
        assert_eq!(value["timing"]["interruptReason"], "pause_too_short");
        assert_eq!(value["turn"]["shouldWait"], false);
        assert_eq!(value["turn"]["turnDurationMs"], 0);
        assert_eq!(value["earlyIntent"]["hypothesisStable"], false);
        assert!(value["turn"]["state"].is_null());
        assert!(value["targetLanguage"].is_null());

        let back: IntentPacket = serde_json::from_value(value).expect("round trip");
        assert_eq!(back, packet);
    }
}
