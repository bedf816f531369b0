//! Output adapters: pure transforms from a packet to whatever a downstream
//! system consumes. They hold no pipeline state.

use serde_json::{json, Value};

use super::IntentPacket;

pub trait Adapter {
    type Output;

    fn name(&self) -> &str;

    fn transform(&self, packet: &IntentPacket) -> Self::Output;

    fn batch_transform(&self, packets: &[IntentPacket]) -> Vec<Self::Output> {
        packets.iter().map(|p| self.transform(p)).collect()
    }
}

/// Flat JSON view with the derived fields (`quadrant`, `isActionable`) filled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

impl Adapter for JsonAdapter {
    type Output = Value;

    fn name(&self) -> &str {
        "json"
    }

    fn transform(&self, packet: &IntentPacket) -> Value {
        json!({
            "intent": packet.intent.as_str(),
            "confidence": packet.confidence,
            "language": packet.language,
            "targetLanguage": packet.target_language,
            "emotion": {
                "arousal": packet.emotion.arousal,
                "valence": packet.emotion.valence,
                "quadrant": packet.emotion.quadrant().as_str(),
            },
            "timing": {
                "userPaused": packet.timing.user_paused,
                "interruptSafe": packet.timing.interrupt_safe,
                "speechLikelihood": packet.timing.speech_likelihood,
                "silenceDurationMs": packet.timing.silence_duration_ms,
            },
            "earlyIntent": {
                "leadingIntent": packet.early_intent.leading_intent.as_str(),
                "interruptibility": packet.early_intent.interruptibility,
                "hypothesisStable": packet.early_intent.hypothesis_stable,
            },
            "turn": {
                "state": packet.turn.state,
                "overlapProbability": packet.turn.overlap_probability,
                "suggestedWaitMs": packet.turn.suggested_wait_ms,
            },
            "frameId": packet.frame_id,
            "timestampMs": packet.timestamp_ms,
            "isActionable": packet.is_actionable(),
        })
    }
}

/// Invokes a callback per packet. The callback runs on the caller's thread
/// and must not block.
pub struct CallbackAdapter<F> {
    callback: F,
}

impl<F> CallbackAdapter<F>
where
    F: Fn(&IntentPacket),
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Adapter for CallbackAdapter<F>
where
    F: Fn(&IntentPacket),
{
    type Output = ();

    fn name(&self) -> &str {
        "callback"
    }

    fn transform(&self, packet: &IntentPacket) {
        (self.callback)(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Intent;
    use crate::predict::{PredictorState, TurnState};
    use std::cell::Cell;

    fn packet() -> IntentPacket {
        let mut state = PredictorState::default();
        state.intent.intent = Intent::Command;
        state.intent.confidence = 0.8;
        state.turn.state = Some(TurnState::UserPausing);
        IntentPacket::assemble(&state, 3, 60, None)
    }

    #[test]
    fn json_adapter_adds_derived_fields() {
        let value = JsonAdapter.transform(&packet());
        assert_eq!(value["intent"], "command");
        assert_eq!(value["isActionable"], true);
        assert_eq!(value["emotion"]["quadrant"], "excited");
        assert_eq!(value["turn"]["state"], "user_pausing");
        assert_eq!(value["frameId"], 3);
    }

    #[test]
    fn callback_adapter_sees_every_packet() {
        let seen = Cell::new(0u64);
        let adapter = CallbackAdapter::new(|p: &IntentPacket| seen.set(seen.get() + p.frame_id));
        let out = adapter.batch_transform(&[packet(), packet()]);
        assert_eq!(out.len(), 2);
        assert_eq!(seen.get(), 6);
        assert_eq!(adapter.name(), "callback");
    }
}
