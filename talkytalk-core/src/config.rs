//! Aggregate pipeline configuration.
//!
//! Every section falls back to its defaults when absent, so a JSON file only
//! needs the knobs it changes:
//!
//! ```json
//! { "emitIntervalMs": 50, "vad": { "hangoverFrames": 8 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::{EmotionConfig, LanguageConfig, ProsodyConfig, VadConfig};
use crate::audio::AudioConfig;
use crate::error::{Result, TalkytalkError};
use crate::predict::{EarlyIntentConfig, IntentConfig, TimingConfig, TurnTakingConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PipelineConfig {
    pub audio: AudioConfig,
    /// Sliding window handed to analyzers. Default: 1000.
    pub buffer_duration_ms: u64,
    /// Minimum spacing between packets. Default: 100.
    pub emit_interval_ms: u64,
    /// Packets below this confidence are held back. Default: 0.
    pub min_confidence_to_emit: f32,
    /// Engine input queue; the oldest frame is dropped when full. Default: 64.
    pub frame_queue_capacity: usize,
    /// Engine packet broadcast capacity. Default: 256.
    pub packet_channel_capacity: usize,

    pub vad: VadConfig,
    pub prosody: ProsodyConfig,
    pub emotion: EmotionConfig,
    pub language: LanguageConfig,

    pub intent: IntentConfig,
    pub timing: TimingConfig,
    pub early_intent: EarlyIntentConfig,
    pub turn_taking: TurnTakingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            buffer_duration_ms: 1_000,
            emit_interval_ms: 100,
            min_confidence_to_emit: 0.0,
            frame_queue_capacity: 64,
            packet_channel_capacity: 256,
            vad: VadConfig::default(),
            prosody: ProsodyConfig::default(),
            emotion: EmotionConfig::default(),
            language: LanguageConfig::default(),
            intent: IntentConfig::default(),
            timing: TimingConfig::default(),
            early_intent: EarlyIntentConfig::default(),
            turn_taking: TurnTakingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON config file. Does not validate; the builder does.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        if self.buffer_duration_ms < self.audio.frame_duration_ms as u64 {
            return Err(TalkytalkError::config(format!(
                "buffer_duration_ms ({}) must hold at least one {} ms frame",
                self.buffer_duration_ms, self.audio.frame_duration_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence_to_emit) {
            return Err(TalkytalkError::config(
                "min_confidence_to_emit must be within [0, 1]",
            ));
        }
        if self.frame_queue_capacity == 0 || self.packet_channel_capacity == 0 {
            return Err(TalkytalkError::config(
                "engine queue capacities must be positive",
            ));
        }
        self.vad.validate()?;
        self.prosody.validate()?;
        self.emotion.validate()?;
        self.language.validate()?;
        self.intent.validate()?;
        self.timing.validate()?;
        self.early_intent.validate()?;
        self.turn_taking.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "emitIntervalMs": 50, "vad": { "hangoverFrames": 8 }, "turnTaking": { "maxWaitMs": 3000 } }"#,
        )
        .expect("parses");
        assert_eq!(config.emit_interval_ms, 50);
        assert_eq!(config.vad.hangover_frames, 8);
        assert_eq!(config.vad.energy_threshold_db, -40.0);
        assert_eq!(config.turn_taking.max_wait_ms, 3_000);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            PipelineConfig::from_json_str("{ not json"),
            Err(TalkytalkError::ConfigParse(_))
        ));
    }

    #[test]
    fn rejects_bad_frame_duration() {
        let mut config = PipelineConfig::default();
        config.audio.frame_duration_ms = 10;
        assert!(matches!(
            config.validate(),
            Err(TalkytalkError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_inverted_pitch_range_and_zero_stability() {
        let mut config = PipelineConfig::default();
        config.prosody.min_pitch_hz = 600.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.early_intent.stability_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            PipelineConfig::load("/nonexistent/talkytalk.json"),
            Err(TalkytalkError::Io(_))
        ));
    }
}
