//! Hypothesis tracking for early intent.
//!
//! Each frame's rule guess is compared with the dominant hypothesis:
//!
//! - a match reinforces it (`stability_count += 1`, momentum-blended
//!   confidence, refreshed timestamp)
//! - a mismatch reinforces or creates a challenger and pulls the dominant
//!   confidence toward zero; a challenger that out-scores the dominant for
//!   `stability_threshold` consecutive frames replaces it (a retraction)
//!
//! Hypotheses untouched for `hypothesis_timeout_ms` are evicted. If the
//! dominant one goes, the strongest challenger (earliest seen on ties)
//! takes its place and starts counting stability from 1.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PredictionContext, Predictor, PredictorStage, PredictorState, RuleGuess};
use crate::error::{Result, TalkytalkError};
use crate::packet::Intent;

pub const NAME: &str = "early_intent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EarlyIntentConfig {
    /// Consecutive frames needed for stability or replacement. Default: 5.
    pub stability_threshold: u32,
    /// Weight of the previous confidence in the blend. Default: 0.8.
    pub confidence_momentum: f32,
    /// Unreinforced hypotheses are dropped after this long. Default: 2000.
    pub hypothesis_timeout_ms: u64,
}

impl Default for EarlyIntentConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 5,
            confidence_momentum: 0.8,
            hypothesis_timeout_ms: 2_000,
        }
    }
}

impl EarlyIntentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stability_threshold == 0 {
            return Err(TalkytalkError::config(
                "early_intent.stability_threshold must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_momentum) {
            return Err(TalkytalkError::config(
                "early_intent.confidence_momentum must be within [0, 1]",
            ));
        }
        if self.hypothesis_timeout_ms == 0 {
            return Err(TalkytalkError::config(
                "early_intent.hypothesis_timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    pub candidate_intent: Intent,
    pub confidence: f32,
    pub first_seen_frame_id: u64,
    pub stability_count: u32,
    pub last_reinforced_ms: u64,
    /// Consecutive frames this challenger has out-scored the dominant one.
    pub overtake_streak: u32,
}

impl Hypothesis {
    fn new(guess: RuleGuess, frame_id: u64, now_ms: u64) -> Self {
        Self {
            candidate_intent: guess.intent,
            confidence: guess.confidence.clamp(0.0, 1.0),
            first_seen_frame_id: frame_id,
            stability_count: 1,
            last_reinforced_ms: now_ms,
            overtake_streak: 0,
        }
    }

    fn reinforce(&mut self, instantaneous: f32, momentum: f32, now_ms: u64) {
        self.stability_count = self.stability_count.saturating_add(1);
        self.last_reinforced_ms = now_ms;
        self.confidence =
            (momentum * self.confidence + (1.0 - momentum) * instantaneous).clamp(0.0, 1.0);
    }

    fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_reinforced_ms) > timeout_ms
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarlyIntentState {
    pub dominant: Option<Hypothesis>,
    pub challengers: Vec<Hypothesis>,
    pub interruptibility: f32,
    pub hypothesis_stable: bool,
    /// How many times a challenger has displaced the dominant hypothesis.
    pub retractions: u64,
}

impl EarlyIntentState {
    pub fn leading_intent(&self) -> Intent {
        self.dominant
            .as_ref()
            .map(|h| h.candidate_intent)
            .unwrap_or(Intent::Unknown)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EarlyIntentPredictor {
    config: EarlyIntentConfig,
}

impl EarlyIntentPredictor {
    pub fn new(config: EarlyIntentConfig) -> Self {
        Self { config }
    }

    fn expire(&self, state: &mut EarlyIntentState, now_ms: u64) {
        let timeout = self.config.hypothesis_timeout_ms;
        state.challengers.retain(|h| !h.is_stale(now_ms, timeout));

        let dominant_stale = state
            .dominant
            .as_ref()
            .is_some_and(|h| h.is_stale(now_ms, timeout));
        if !dominant_stale {
            return;
        }
        let expired = state.dominant.take();
        let best = state
            .challengers
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then(b.first_seen_frame_id.cmp(&a.first_seen_frame_id))
            })
            .map(|(i, _)| i);
        if let Some(i) = best {
            let mut promoted = state.challengers.remove(i);
            promoted.stability_count = 1;
            promoted.overtake_streak = 0;
            state.dominant = Some(promoted);
        }
        debug!(
            expired = ?expired.map(|h| h.candidate_intent),
            leading = ?state.leading_intent(),
            "dominant hypothesis expired"
        );
    }

    fn observe(&self, state: &mut EarlyIntentState, guess: RuleGuess, frame_id: u64, now_ms: u64) {
        let momentum = self.config.confidence_momentum;

        let Some(dominant) = state.dominant.as_mut() else {
            state
                .challengers
                .retain(|h| h.candidate_intent != guess.intent);
            state.dominant = Some(Hypothesis::new(guess, frame_id, now_ms));
            return;
        };

        if dominant.candidate_intent == guess.intent {
            dominant.reinforce(guess.confidence, momentum, now_ms);
            for challenger in &mut state.challengers {
                challenger.overtake_streak = 0;
            }
            return;
        }

        // Contradicting evidence weakens the incumbent.
        dominant.confidence *= momentum;
        let dominant_confidence = dominant.confidence;

        let idx = match state
            .challengers
            .iter()
            .position(|h| h.candidate_intent == guess.intent)
        {
            Some(i) => {
                state.challengers[i].reinforce(guess.confidence, momentum, now_ms);
                i
            }
            None => {
                state
                    .challengers
                    .push(Hypothesis::new(guess, frame_id, now_ms));
                state.challengers.len() - 1
            }
        };
        for (i, challenger) in state.challengers.iter_mut().enumerate() {
            if i == idx && challenger.confidence > dominant_confidence {
                challenger.overtake_streak += 1;
            } else {
                challenger.overtake_streak = 0;
            }
        }

        if state.challengers[idx].overtake_streak >= self.config.stability_threshold {
            let mut winner = state.challengers.remove(idx);
            winner.stability_count = 1;
            winner.overtake_streak = 0;
            let retracted = state.dominant.replace(winner);
            state.retractions += 1;
            debug!(
                retracted = ?retracted.map(|h| h.candidate_intent),
                leading = ?guess.intent,
                frame_id,
                "hypothesis replaced"
            );
        }
    }
}

impl Predictor for EarlyIntentPredictor {
    fn name(&self) -> &str {
        NAME
    }

    fn stage(&self) -> PredictorStage {
        PredictorStage::EarlyIntent
    }

    fn predict(&self, ctx: &PredictionContext<'_>, state: &mut PredictorState) {
        let guess = state.intent.guess;
        let early = &mut state.early_intent;

        self.expire(early, ctx.timestamp_ms);
        if let Some(guess) = guess {
            self.observe(early, guess, ctx.frame_id, ctx.timestamp_ms);
        }

        let threshold = self.config.stability_threshold;
        match &early.dominant {
            Some(h) => {
                let stability = (h.stability_count as f32 / threshold as f32).min(1.0);
                early.interruptibility = (0.5 * stability + 0.5 * h.confidence).clamp(0.0, 1.0);
                early.hypothesis_stable = h.stability_count >= threshold;
            }
            None => {
                early.interruptibility = 0.0;
                early.hypothesis_stable = false;
            }
        }
    }
}
