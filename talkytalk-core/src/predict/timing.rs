//! Pause and interrupt-safety timing.
//!
//! ```text
//! interrupt_safe =
//!      NOT rising
//!  AND speech_likelihood < max_speech_likelihood
//!  AND ( silence_ms >= turn_end_threshold_ms
//!     OR (falling AND silence_ms >= pause_threshold_ms)
//!     OR (intent_confidence >= interrupt_confidence AND user_paused) )
//! ```
//!
//! The only memory is the running silence counter, reset whenever the VAD
//! reports speech (hangover included).
//!
//! Each decision carries an [`InterruptReason`] naming the clause that
//! settled it. The reason is read off the decision; it never feeds back
//! into it.

use serde::{Deserialize, Serialize};

use super::{PredictionContext, Predictor, PredictorStage, PredictorState};
use crate::error::{Result, TalkytalkError};

pub const NAME: &str = "timing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TimingConfig {
    /// Silence that counts as a meaningful pause. Default: 300.
    pub pause_threshold_ms: u64,
    /// Silence that ends a turn outright. Default: 700.
    pub turn_end_threshold_ms: u64,
    /// Intent confidence that makes any pause interruptible. Default: 0.6.
    pub interrupt_confidence: f32,
    /// Speech likelihood at or above which interrupting is never safe. Default: 0.7.
    pub max_speech_likelihood: f32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pause_threshold_ms: 300,
            turn_end_threshold_ms: 700,
            interrupt_confidence: 0.6,
            max_speech_likelihood: 0.7,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pause_threshold_ms > self.turn_end_threshold_ms {
            return Err(TalkytalkError::config(
                "timing.pause_threshold_ms must not exceed turn_end_threshold_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.interrupt_confidence)
            || !(0.0..=1.0).contains(&self.max_speech_likelihood)
        {
            return Err(TalkytalkError::config(
                "timing confidence thresholds must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Why interrupting is or is not safe right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    /// VAD still reports speech, or speech is likely.
    UserStillSpeaking,
    /// Rising terminal pitch: a question is still forming.
    QuestionForming,
    /// Silent, but no clause for safety holds yet.
    #[default]
    PauseTooShort,
    /// Falling contour followed by a meaningful pause.
    FallingIntonationComplete,
    /// Silence reached the turn-end threshold.
    ExtendedSilence,
    /// Confident intent and a meaningful pause.
    HighIntentConfidence,
}

impl InterruptReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InterruptReason::UserStillSpeaking => "user_still_speaking",
            InterruptReason::QuestionForming => "question_forming",
            InterruptReason::PauseTooShort => "pause_too_short",
            InterruptReason::FallingIntonationComplete => "falling_intonation_complete",
            InterruptReason::ExtendedSilence => "extended_silence",
            InterruptReason::HighIntentConfidence => "high_intent_confidence",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingState {
    pub silence_ms: u64,
    pub user_paused: bool,
    pub interrupt_safe: bool,
    pub interrupt_reason: InterruptReason,
    pub speech_likelihood: f32,
    pub last_speech_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct TimingPredictor {
    config: TimingConfig,
}

impl TimingPredictor {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    fn interrupt_safe(&self, state: &PredictorState) -> bool {
        let c = &self.config;
        let t = &state.timing;
        !state.is_rising()
            && t.speech_likelihood < c.max_speech_likelihood
            && (t.silence_ms >= c.turn_end_threshold_ms
                || (state.is_falling() && t.silence_ms >= c.pause_threshold_ms)
                || (state.intent.confidence >= c.interrupt_confidence && t.user_paused))
    }

    /// Name the clause behind `safe`, which must come from [`Self::interrupt_safe`].
    fn interrupt_reason(&self, state: &PredictorState, safe: bool) -> InterruptReason {
        let c = &self.config;
        let t = &state.timing;
        if safe {
            if state.is_falling() && t.silence_ms >= c.pause_threshold_ms {
                InterruptReason::FallingIntonationComplete
            } else if t.silence_ms >= c.turn_end_threshold_ms {
                InterruptReason::ExtendedSilence
            } else {
                InterruptReason::HighIntentConfidence
            }
        } else if state.speech_active {
            InterruptReason::UserStillSpeaking
        } else if state.is_rising() {
            InterruptReason::QuestionForming
        } else if t.speech_likelihood >= c.max_speech_likelihood {
            InterruptReason::UserStillSpeaking
        } else {
            InterruptReason::PauseTooShort
        }
    }
}

impl Predictor for TimingPredictor {
    fn name(&self) -> &str {
        NAME
    }

    fn stage(&self) -> PredictorStage {
        PredictorStage::Timing
    }

    fn predict(&self, ctx: &PredictionContext<'_>, state: &mut PredictorState) {
        if state.speech_active {
            state.timing.silence_ms = 0;
            state.timing.last_speech_ms = Some(ctx.timestamp_ms);
        } else {
            state.timing.silence_ms += ctx.frame_duration_ms;
        }
        if let Some(p) = ctx.evidence.speech_probability {
            state.timing.speech_likelihood = p.clamp(0.0, 1.0);
        }
        state.timing.user_paused = state.timing.silence_ms >= self.config.pause_threshold_ms;
        let safe = self.interrupt_safe(state);
        state.timing.interrupt_safe = safe;
        state.timing.interrupt_reason = self.interrupt_reason(state, safe);
    }
}
