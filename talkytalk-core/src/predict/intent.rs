//! Early intent from behavioral cues.
//!
//! Each candidate intent keeps a score in [0, 1]. When a rule fires on a
//! speech frame its candidate is pulled toward the rule's implied level and
//! every other score decays; with no evidence all scores decay. The top
//! score is the reported confidence, and below `confidence_threshold` the
//! intent reads as unknown whatever rule fired last.
//!
//! Rules:
//! - command: arousal > 0.7, falling intonation, tempo > 4 syllables/s
//! - query: rising intonation
//! - conversation: 0.3 < arousal < 0.7 with flat intonation

use serde::{Deserialize, Serialize};

use super::{PredictionContext, Predictor, PredictorStage, PredictorState};
use crate::error::{Result, TalkytalkError};
use crate::packet::{Emotion, Intent};

pub const NAME: &str = "intent";

/// Candidates in tie-break order.
const CANDIDATES: [Intent; 3] = [Intent::Command, Intent::Query, Intent::Conversation];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct IntentConfig {
    /// Below this the intent is reported as unknown. Default: 0.3.
    pub confidence_threshold: f32,
    /// Per-frame multiplier for scores without evidence. Default: 0.95.
    pub decay_rate: f32,
    /// Fraction of the gap to the implied level closed per firing. Default: 0.2.
    pub evidence_gain: f32,
    pub command_min_arousal: f32,
    pub command_min_tempo: f32,
    pub conversation_min_arousal: f32,
    pub conversation_max_arousal: f32,
    pub command_level: f32,
    pub query_level: f32,
    pub conversation_level: f32,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            decay_rate: 0.95,
            evidence_gain: 0.2,
            command_min_arousal: 0.7,
            command_min_tempo: 4.0,
            conversation_min_arousal: 0.3,
            conversation_max_arousal: 0.7,
            command_level: 0.9,
            query_level: 0.8,
            conversation_level: 0.6,
        }
    }
}

impl IntentConfig {
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("confidence_threshold", self.confidence_threshold),
            ("decay_rate", self.decay_rate),
            ("evidence_gain", self.evidence_gain),
            ("command_level", self.command_level),
            ("query_level", self.query_level),
            ("conversation_level", self.conversation_level),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(TalkytalkError::config(format!(
                    "intent.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.command_min_tempo < 0.0 {
            return Err(TalkytalkError::config(
                "intent.command_min_tempo must not be negative",
            ));
        }
        if self.conversation_min_arousal > self.conversation_max_arousal {
            return Err(TalkytalkError::config(
                "intent conversation arousal band is inverted",
            ));
        }
        Ok(())
    }
}

/// What the rules suggested on the latest frame, before any accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGuess {
    pub intent: Intent,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentState {
    /// Scores for command, query, conversation.
    pub scores: [f32; 3],
    pub intent: Intent,
    pub confidence: f32,
    pub guess: Option<RuleGuess>,
    /// When a rule last fired.
    pub last_evidence_ms: Option<u64>,
}

impl Default for IntentState {
    fn default() -> Self {
        Self {
            scores: [0.0; 3],
            intent: Intent::Unknown,
            confidence: 0.0,
            guess: None,
            last_evidence_ms: None,
        }
    }
}

impl IntentState {
    pub fn score(&self, intent: Intent) -> f32 {
        CANDIDATES
            .iter()
            .position(|c| *c == intent)
            .map(|i| self.scores[i])
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntentPredictor {
    config: IntentConfig,
}

impl IntentPredictor {
    pub fn new(config: IntentConfig) -> Self {
        Self { config }
    }

    /// Evaluate the rules against the fused state. Only speech frames vote.
    pub fn rule_guess(&self, state: &PredictorState, tempo: f32) -> Option<RuleGuess> {
        if !state.speech_active {
            return None;
        }
        let c = &self.config;
        let arousal = state.emotion.arousal;

        let intent = if arousal > c.command_min_arousal
            && state.is_falling()
            && tempo > c.command_min_tempo
        {
            Intent::Command
        } else if state.is_rising() {
            Intent::Query
        } else if arousal > c.conversation_min_arousal
            && arousal < c.conversation_max_arousal
            && !state.is_falling()
        {
            Intent::Conversation
        } else {
            return None;
        };
        Some(RuleGuess {
            intent,
            confidence: self.implied_level(intent),
        })
    }

    fn implied_level(&self, intent: Intent) -> f32 {
        match intent {
            Intent::Command => self.config.command_level,
            Intent::Query => self.config.query_level,
            Intent::Conversation => self.config.conversation_level,
            Intent::Unknown => 0.0,
        }
    }
}

impl Predictor for IntentPredictor {
    fn name(&self) -> &str {
        NAME
    }

    fn stage(&self) -> PredictorStage {
        PredictorStage::Intent
    }

    fn predict(&self, ctx: &PredictionContext<'_>, state: &mut PredictorState) {
        let ev = &ctx.evidence;
        if ev.arousal.is_some() || ev.valence.is_some() {
            state.emotion = Emotion::new(
                ev.arousal.unwrap_or(state.emotion.arousal),
                ev.valence.unwrap_or(state.emotion.valence),
            );
        }
        if let Some(language) = &ev.language {
            state.language.clone_from(language);
        }

        let guess = self.rule_guess(state, ev.tempo.unwrap_or(0.0));
        let intent_state = &mut state.intent;
        for (candidate, score) in CANDIDATES.iter().zip(intent_state.scores.iter_mut()) {
            *score = match guess {
                Some(g) if g.intent == *candidate => {
                    *score + self.config.evidence_gain * (g.confidence - *score)
                }
                _ => *score * self.config.decay_rate,
            }
            .clamp(0.0, 1.0);
        }
        if guess.is_some() {
            intent_state.last_evidence_ms = Some(ctx.timestamp_ms);
        }
        intent_state.guess = guess;

        let (best, confidence) = CANDIDATES
            .iter()
            .zip(intent_state.scores.iter())
            .fold((Intent::Unknown, 0.0f32), |(bi, bs), (i, s)| {
                if *s > bs {
                    (*i, *s)
                } else {
                    (bi, bs)
                }
            });
        intent_state.confidence = confidence;
        intent_state.intent = if confidence >= self.config.confidence_threshold {
            best
        } else {
            Intent::Unknown
        };
    }
}
