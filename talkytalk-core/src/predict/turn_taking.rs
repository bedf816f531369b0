//! Who holds the conversational floor.
//!
//! ```text
//!            speech (from any state, including before the first turn)
//!   ┌─────────────────────────────────────────────────────────────┐
//!   ▼                                                             │
//! UserSpeaking ──silence ≥ min_turn_gap──► UserPausing            │
//!                                           │                     │
//!               silence ≥ safe_gap, not rising                    │
//!                                           ▼                     │
//!                                        TurnYielded              │
//!                                           │                     │
//!                silence ≥ max_wait or interrupt_safe             │
//!                                           ▼                     │
//!                                        SystemCanSpeak ──────────┘
//! ```
//!
//! Transitions are applied until nothing changes, so a yield and the
//! follow-on "system may speak" can land on the same frame. Any other
//! trigger is a no-op.
//!
//! A user turn starts when speech takes the floor from nobody, from a
//! yielded turn or from the system. Speech after a mere pause continues
//! the same turn.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PredictionContext, Predictor, PredictorStage, PredictorState};
use crate::error::{Result, TalkytalkError};

pub const NAME: &str = "turn_taking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    UserSpeaking,
    UserPausing,
    TurnYielded,
    SystemCanSpeak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TurnTakingConfig {
    /// Silence that turns speaking into pausing. Default: 200.
    pub min_turn_gap_ms: u64,
    /// Silence after which a non-rising pause yields the turn. Default: 500.
    pub safe_interrupt_gap_ms: u64,
    /// Silence after which a yielded turn is the system's. Default: 2000.
    pub max_wait_ms: u64,
    /// Speech likelihood above which responding should wait. Default: 0.6.
    pub wait_speech_likelihood: f32,
}

impl Default for TurnTakingConfig {
    fn default() -> Self {
        Self {
            min_turn_gap_ms: 200,
            safe_interrupt_gap_ms: 500,
            max_wait_ms: 2_000,
            wait_speech_likelihood: 0.6,
        }
    }
}

impl TurnTakingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_turn_gap_ms <= self.safe_interrupt_gap_ms
            && self.safe_interrupt_gap_ms <= self.max_wait_ms)
        {
            return Err(TalkytalkError::config(
                "turn_taking requires min_turn_gap_ms ≤ safe_interrupt_gap_ms ≤ max_wait_ms",
            ));
        }
        if self.safe_interrupt_gap_ms == 0 {
            return Err(TalkytalkError::config(
                "turn_taking.safe_interrupt_gap_ms must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.wait_speech_likelihood) {
            return Err(TalkytalkError::config(
                "turn_taking.wait_speech_likelihood must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTakingState {
    /// `None` until the first speech frame.
    pub state: Option<TurnState>,
    pub entered_ms: Option<u64>,
    /// Start of the current user turn.
    pub turn_started_ms: Option<u64>,
    pub turn_duration_ms: u64,
    pub overlap_probability: f32,
    pub suggested_wait_ms: u64,
    /// Advice to hold back even where interrupting would be technically safe.
    pub should_wait: bool,
    pub transitions: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TurnTakingPredictor {
    config: TurnTakingConfig,
}

impl TurnTakingPredictor {
    pub fn new(config: TurnTakingConfig) -> Self {
        Self { config }
    }

    fn next(&self, current: Option<TurnState>, state: &PredictorState) -> Option<TurnState> {
        if state.speech_active {
            return Some(TurnState::UserSpeaking);
        }
        let silence = state.timing.silence_ms;
        let c = &self.config;
        match current? {
            TurnState::UserSpeaking if silence >= c.min_turn_gap_ms => Some(TurnState::UserPausing),
            TurnState::UserPausing if silence >= c.safe_interrupt_gap_ms && !state.is_rising() => {
                Some(TurnState::TurnYielded)
            }
            TurnState::TurnYielded
                if silence >= c.max_wait_ms || state.timing.interrupt_safe =>
            {
                Some(TurnState::SystemCanSpeak)
            }
            other => Some(other),
        }
    }

    fn should_wait(&self, state: &PredictorState) -> bool {
        state.turn.state.is_some()
            && (state.is_rising()
                || state.timing.speech_likelihood > self.config.wait_speech_likelihood
                || state.timing.silence_ms < self.config.safe_interrupt_gap_ms)
    }

    fn overlap_probability(&self, state: &PredictorState) -> f32 {
        match state.turn.state {
            None => 0.0,
            Some(TurnState::UserSpeaking) => 1.0,
            Some(_) => {
                let elapsed = state.timing.silence_ms as f32
                    / self.config.safe_interrupt_gap_ms as f32;
                let resume_risk = 1.0 - elapsed.min(1.0);
                (resume_risk * (1.0 - state.early_intent.interruptibility / 2.0)).clamp(0.0, 1.0)
            }
        }
    }
}

impl Predictor for TurnTakingPredictor {
    fn name(&self) -> &str {
        NAME
    }

    fn stage(&self) -> PredictorStage {
        PredictorStage::TurnTaking
    }

    fn predict(&self, ctx: &PredictionContext<'_>, state: &mut PredictorState) {
        // Four states, so at most four hops per frame.
        for _ in 0..4 {
            let current = state.turn.state;
            let next = self.next(current, state);
            if next == current {
                break;
            }
            debug!(
                from = ?current,
                to = ?next,
                frame_id = ctx.frame_id,
                silence_ms = state.timing.silence_ms,
                "turn transition"
            );
            if next == Some(TurnState::UserSpeaking) && current != Some(TurnState::UserPausing) {
                state.turn.turn_started_ms = Some(ctx.timestamp_ms);
            }
            state.turn.state = next;
            state.turn.entered_ms = Some(ctx.timestamp_ms);
            state.turn.transitions += 1;
        }

        state.turn.turn_duration_ms = state
            .turn
            .turn_started_ms
            .map(|start| ctx.timestamp_ms.saturating_sub(start))
            .unwrap_or(0);
        state.turn.should_wait = self.should_wait(state);

        state.turn.overlap_probability = self.overlap_probability(state);
        state.turn.suggested_wait_ms = match state.turn.state {
            Some(TurnState::UserPausing) => self
                .config
                .safe_interrupt_gap_ms
                .saturating_sub(state.timing.silence_ms),
            _ => 0,
        };
    }
}
