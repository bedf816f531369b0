//! Energy-based VAD with an adaptive noise floor and hangover.
//!
//! ## Algorithm
//!
//! 1. Compute RMS energy (dB) and zero-crossing rate of the newest frame.
//! 2. Threshold = `max(energy_threshold_db, noise_floor_db + 10)` when
//!    adaptive, else `energy_threshold_db`.
//! 3. Raw speech = energy above threshold and ZCR below 0.5 (broadband
//!    noise crosses zero far more often than voiced speech).
//! 4. Raw speech reloads the hangover counter; otherwise the counter drains
//!    one frame at a time and only then does the decision flip to silence.
//!    Word-internal gaps therefore never read as pauses.
//! 5. The noise floor tracks energy exponentially, on non-speech frames only.
//! 6. `speech_probability` is an EMA of a ramp over the energy margin.

use serde::{Deserialize, Serialize};

use super::{features, AnalysisResult, AnalysisSet, Analyzer};
use crate::audio::{dsp, AudioFrame};
use crate::buffering::FrameWindow;
use crate::error::{Result, TalkytalkError};

pub const NAME: &str = "vad";

const INITIAL_NOISE_FLOOR_DB: f32 = -60.0;
const NOISE_FLOOR_MARGIN_DB: f32 = 10.0;
const MAX_SPEECH_ZCR: f32 = 0.5;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Energy above threshold, or within the hangover period after it.
    Speech,
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VadConfig {
    /// Minimum energy for speech in dBFS. Default: -40.
    pub energy_threshold_db: f32,
    /// Frames to keep reporting speech after energy drops. Default: 5
    /// (100 ms at a 20 ms stride).
    pub hangover_frames: u32,
    /// Raise the threshold above an adaptive noise floor. Default: true.
    pub adaptive: bool,
    /// EMA factor for `speech_probability` in (0, 1]. Default: 0.5.
    pub probability_smoothing: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold_db: -40.0,
            hangover_frames: 5,
            adaptive: true,
            probability_smoothing: 0.5,
        }
    }
}

impl VadConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.energy_threshold_db.is_finite() || self.energy_threshold_db > 0.0 {
            return Err(TalkytalkError::config(
                "vad.energy_threshold_db must be a finite dBFS value ≤ 0",
            ));
        }
        if !(self.probability_smoothing > 0.0 && self.probability_smoothing <= 1.0) {
            return Err(TalkytalkError::config(
                "vad.probability_smoothing must be within (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Voice activity detector.
#[derive(Debug, Clone)]
pub struct VadAnalyzer {
    config: VadConfig,
    noise_floor_db: f32,
    hangover_counter: u32,
    speech_active: bool,
    speech_probability: f32,
}

impl VadAnalyzer {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            noise_floor_db: INITIAL_NOISE_FLOOR_DB,
            hangover_counter: 0,
            speech_active: false,
            speech_probability: 0.0,
        }
    }

    /// Classify one frame, updating hangover and noise floor.
    pub fn classify(&mut self, samples: &[f32]) -> VadDecision {
        self.step(samples).decision
    }

    pub fn noise_floor_db(&self) -> f32 {
        self.noise_floor_db
    }

    fn threshold_db(&self) -> f32 {
        if self.config.adaptive {
            self.config
                .energy_threshold_db
                .max(self.noise_floor_db + NOISE_FLOOR_MARGIN_DB)
        } else {
            self.config.energy_threshold_db
        }
    }

    fn step(&mut self, samples: &[f32]) -> Step {
        let energy_db = dsp::energy_db(dsp::rms(samples));
        let zcr = dsp::zero_crossing_rate(samples);
        let threshold_db = self.threshold_db();

        let raw_speech = energy_db > threshold_db && zcr < MAX_SPEECH_ZCR;
        if raw_speech {
            // Active speech reloads the hangover
            self.hangover_counter = self.config.hangover_frames;
            self.speech_active = true;
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
        } else {
            self.speech_active = false;
        }

        if self.config.adaptive && !raw_speech {
            let alpha = if energy_db < self.noise_floor_db + 5.0 {
                0.01
            } else {
                0.001
            };
            self.noise_floor_db = (1.0 - alpha) * self.noise_floor_db + alpha * energy_db;
        }

        let raw_probability = speech_probability(energy_db, zcr, threshold_db);
        let a = self.config.probability_smoothing;
        self.speech_probability = ((1.0 - a) * self.speech_probability + a * raw_probability)
            .clamp(0.0, 1.0);

        Step {
            decision: if self.speech_active {
                VadDecision::Speech
            } else {
                VadDecision::Silence
            },
            energy_db,
            zcr,
            threshold_db,
            raw_probability,
        }
    }
}

impl Default for VadAnalyzer {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}

struct Step {
    decision: VadDecision,
    energy_db: f32,
    zcr: f32,
    threshold_db: f32,
    raw_probability: f32,
}

/// Continuous speech estimate: energy ramps in from 20 dB below threshold to
/// 10 dB above it; low ZCR adds a little confidence.
fn speech_probability(energy_db: f32, zcr: f32, threshold_db: f32) -> f32 {
    if energy_db < threshold_db - 20.0 {
        return 0.0;
    }
    let energy_term = ((energy_db - (threshold_db - 20.0)) / 30.0).clamp(0.0, 1.0);
    let zcr_term = (1.0 - zcr * 2.0).max(0.0);
    (energy_term * 0.7 + zcr_term * 0.3).min(1.0)
}

impl Analyzer for VadAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn analyze(
        &mut self,
        frame: &AudioFrame,
        _window: &FrameWindow<'_>,
        _prior: &AnalysisSet,
    ) -> Result<AnalysisResult> {
        let step = self.step(frame.samples());
        Ok(AnalysisResult::new(NAME, frame)
            .with(features::IS_SPEECH, step.decision.is_speech())
            .with(features::SPEECH_PROBABILITY, self.speech_probability)
            .with(features::RAW_SPEECH_PROBABILITY, step.raw_probability)
            .with(features::ENERGY_DB, step.energy_db)
            .with(features::ZERO_CROSSING_RATE, step.zcr)
            .with(features::THRESHOLD_DB, step.threshold_db)
            .with(features::NOISE_FLOOR_DB, self.noise_floor_db))
    }

    fn reset(&mut self) {
        self.noise_floor_db = INITIAL_NOISE_FLOOR_DB;
        self.hangover_counter = 0;
        self.speech_active = false;
        self.speech_probability = 0.0;
    }
}
