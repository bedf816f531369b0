//! Dimensional emotion: arousal and valence from acoustic features.
//!
//! Arousal (activation) is a weighted mix of loudness, pitch variability and
//! tempo, renormalised over whichever inputs were available this frame.
//! Valence is a deliberately weak guess from pitch height and a rising
//! contour; it is reported with a low fixed confidence.
//!
//! Reads the VAD and prosody results for the same frame, so it must be
//! registered after both.

use serde::{Deserialize, Serialize};

use super::{features, prosody, vad, AnalysisResult, AnalysisSet, Analyzer};
use crate::audio::AudioFrame;
use crate::buffering::FrameWindow;
use crate::error::{Result, TalkytalkError};

pub const NAME: &str = "emotion";

const NEUTRAL: f32 = 0.5;

/// Arousal/valence quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    /// High arousal, positive valence.
    Excited,
    /// High arousal, negative valence.
    Tense,
    /// Low arousal, positive valence.
    Calm,
    /// Low arousal, negative valence.
    Subdued,
}

impl Quadrant {
    pub fn of(arousal: f32, valence: f32) -> Self {
        match (arousal >= NEUTRAL, valence >= NEUTRAL) {
            (true, true) => Quadrant::Excited,
            (true, false) => Quadrant::Tense,
            (false, true) => Quadrant::Calm,
            (false, false) => Quadrant::Subdued,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quadrant::Excited => "excited",
            Quadrant::Tense => "tense",
            Quadrant::Calm => "calm",
            Quadrant::Subdued => "subdued",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EmotionConfig {
    pub energy_weight: f32,
    pub variance_weight: f32,
    pub tempo_weight: f32,
    /// EMA factor in (0, 1]; 1 disables smoothing. Default: 0.3.
    pub smoothing_alpha: f32,
    /// Confidence attached to valence. Default: 0.3.
    pub valence_confidence: f32,
    /// dBFS that maps to zero energy. Default: -70.
    pub energy_floor_db: f32,
    /// dB span from floor to full energy. Default: 60.
    pub energy_range_db: f32,
    /// Pitch variance (Hz²) treated as fully animated. Default: 1000.
    pub variance_norm: f32,
    /// Tempo (syllables/s) treated as fully animated. Default: 8.
    pub tempo_norm: f32,
    /// Pitch that maps to neutral valence. Default: 150.
    pub neutral_pitch_hz: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            energy_weight: 0.5,
            variance_weight: 0.3,
            tempo_weight: 0.2,
            smoothing_alpha: 0.3,
            valence_confidence: 0.3,
            energy_floor_db: -70.0,
            energy_range_db: 60.0,
            variance_norm: 1_000.0,
            tempo_norm: 8.0,
            neutral_pitch_hz: 150.0,
        }
    }
}

impl EmotionConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [self.energy_weight, self.variance_weight, self.tempo_weight];
        if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f32>() <= 0.0 {
            return Err(TalkytalkError::config(
                "emotion weights must be non-negative with a positive sum",
            ));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(TalkytalkError::config(
                "emotion.smoothing_alpha must be within (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.valence_confidence) {
            return Err(TalkytalkError::config(
                "emotion.valence_confidence must be within [0, 1]",
            ));
        }
        if self.energy_range_db <= 0.0 || self.variance_norm <= 0.0 || self.tempo_norm <= 0.0 {
            return Err(TalkytalkError::config(
                "emotion normalisation ranges must be positive",
            ));
        }
        Ok(())
    }
}

/// Smoothed arousal/valence estimator.
#[derive(Debug, Clone)]
pub struct EmotionAnalyzer {
    config: EmotionConfig,
    arousal: f32,
    valence: f32,
}

impl EmotionAnalyzer {
    pub fn new(config: EmotionConfig) -> Self {
        Self {
            config,
            arousal: NEUTRAL,
            valence: NEUTRAL,
        }
    }

    pub fn arousal(&self) -> f32 {
        self.arousal
    }

    pub fn valence(&self) -> f32 {
        self.valence
    }

    fn raw_arousal(&self, vad: Option<&AnalysisResult>, prosody: Option<&AnalysisResult>) -> f32 {
        let c = &self.config;
        let components = [
            (
                vad.and_then(|r| r.scalar(features::ENERGY_DB))
                    .map(|db| (db - c.energy_floor_db) / c.energy_range_db),
                c.energy_weight,
            ),
            (
                prosody
                    .and_then(|r| r.scalar(features::PITCH_VARIANCE))
                    .map(|v| v / c.variance_norm),
                c.variance_weight,
            ),
            (
                prosody
                    .and_then(|r| r.scalar(features::TEMPO))
                    .map(|t| t / c.tempo_norm),
                c.tempo_weight,
            ),
        ];

        let (sum, weight) = components
            .iter()
            .filter_map(|(value, weight)| value.map(|v| (v.clamp(0.0, 1.0) * weight, *weight)))
            .fold((0.0f32, 0.0f32), |(s, w), (v, wt)| (s + v, w + wt));
        if weight <= f32::EPSILON {
            NEUTRAL
        } else {
            (sum / weight).clamp(0.0, 1.0)
        }
    }

    fn raw_valence(&self, prosody: Option<&AnalysisResult>) -> f32 {
        let Some(prosody) = prosody else {
            return NEUTRAL;
        };
        let pitch = prosody.scalar(features::PITCH_HZ).unwrap_or(0.0);
        if pitch <= 0.0 {
            return NEUTRAL;
        }
        let shift = ((pitch - self.config.neutral_pitch_hz) / 200.0).clamp(-0.3, 0.3);
        let lift = if prosody.flag(features::IS_RISING_INTONATION) == Some(true) {
            0.1
        } else {
            0.0
        };
        (NEUTRAL + shift + lift).clamp(0.0, 1.0)
    }
}

impl Default for EmotionAnalyzer {
    fn default() -> Self {
        Self::new(EmotionConfig::default())
    }
}

impl Analyzer for EmotionAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn analyze(
        &mut self,
        frame: &AudioFrame,
        _window: &FrameWindow<'_>,
        prior: &AnalysisSet,
    ) -> Result<AnalysisResult> {
        let vad = prior.get(vad::NAME);
        let prosody = prior.get(prosody::NAME);

        let mut result = AnalysisResult::new(NAME, frame);
        // Nothing to go on: hold the previous estimate.
        if vad.is_some() || prosody.is_some() {
            let raw_arousal = self.raw_arousal(vad, prosody);
            let raw_valence = self.raw_valence(prosody);
            let a = self.config.smoothing_alpha;
            self.arousal = (1.0 - a) * self.arousal + a * raw_arousal;
            self.valence = (1.0 - a) * self.valence + a * raw_valence;
            result = result
                .with(features::RAW_AROUSAL, raw_arousal)
                .with(features::RAW_VALENCE, raw_valence);
        }

        Ok(result
            .with(features::AROUSAL, self.arousal)
            .with(features::VALENCE, self.valence)
            .with(
                features::QUADRANT,
                Quadrant::of(self.arousal, self.valence).as_str(),
            )
            .with(features::VALENCE_CONFIDENCE, self.config.valence_confidence)
            .with_confidence(self.config.valence_confidence))
    }

    fn reset(&mut self) {
        self.arousal = NEUTRAL;
        self.valence = NEUTRAL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioConfig;
    use crate::buffering::FrameBuffer;
    use approx::assert_relative_eq;

    fn frame() -> AudioFrame {
        AudioFrame::silence(&AudioConfig::default(), 0, 0)
    }

    fn prior(energy_db: f32, pitch_hz: f32, variance: f32, tempo: f32, rising: bool) -> AnalysisSet {
        let f = frame();
        let mut set = AnalysisSet::default();
        set.insert(AnalysisResult::new(vad::NAME, &f).with(features::ENERGY_DB, energy_db));
        set.insert(
            AnalysisResult::new(prosody::NAME, &f)
                .with(features::PITCH_HZ, pitch_hz)
                .with(features::PITCH_VARIANCE, variance)
                .with(features::TEMPO, tempo)
                .with(features::IS_RISING_INTONATION, rising),
        );
        set
    }

    fn analyze(analyzer: &mut EmotionAnalyzer, set: &AnalysisSet) -> AnalysisResult {
        let audio = AudioConfig::default();
        let mut buffer = FrameBuffer::new(audio, 1_000);
        let f = frame();
        buffer.push(f.clone()).expect("valid frame");
        analyzer
            .analyze(&f, &buffer.window(), set)
            .expect("emotion never fails")
    }

    #[test]
    fn loud_animated_speech_raises_arousal() {
        let mut analyzer = EmotionAnalyzer::default();
        let set = prior(-10.0, 200.0, 1_000.0, 8.0, false);
        let mut last = analyze(&mut analyzer, &set);
        for _ in 0..30 {
            last = analyze(&mut analyzer, &set);
        }
        assert_relative_eq!(last.scalar(features::RAW_AROUSAL).unwrap(), 1.0, epsilon = 1e-5);
        assert!(analyzer.arousal() > 0.95);
        assert_eq!(last.label(features::QUADRANT), Some("excited"));
    }

    #[test]
    fn first_update_is_smoothed_from_neutral() {
        let mut analyzer = EmotionAnalyzer::default();
        let result = analyze(&mut analyzer, &prior(-70.0, 0.0, 0.0, 0.0, false));
        assert_relative_eq!(result.scalar(features::RAW_AROUSAL).unwrap(), 0.0);
        // 0.7 × 0.5 + 0.3 × 0
        assert_relative_eq!(result.scalar(features::AROUSAL).unwrap(), 0.35, epsilon = 1e-5);
        assert_relative_eq!(result.scalar(features::VALENCE).unwrap(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn weights_renormalise_over_available_inputs() {
        let analyzer = EmotionAnalyzer::default();
        let f = frame();
        let vad_only = AnalysisResult::new(vad::NAME, &f).with(features::ENERGY_DB, -40.0f32);
        // Only energy is known: (−40 + 70) / 60 = 0.5, at full weight.
        assert_relative_eq!(analyzer.raw_arousal(Some(&vad_only), None), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn valence_follows_pitch_height_and_rise() {
        let analyzer = EmotionAnalyzer::default();
        let f = frame();
        let high_rising = AnalysisResult::new(prosody::NAME, &f)
            .with(features::PITCH_HZ, 400.0f32)
            .with(features::IS_RISING_INTONATION, true);
        assert_relative_eq!(analyzer.raw_valence(Some(&high_rising)), 0.9, epsilon = 1e-5);

        let low = AnalysisResult::new(prosody::NAME, &f).with(features::PITCH_HZ, 100.0f32);
        assert_relative_eq!(analyzer.raw_valence(Some(&low)), 0.25, epsilon = 1e-5);

        let unvoiced = AnalysisResult::new(prosody::NAME, &f).with(features::PITCH_HZ, 0.0f32);
        assert_relative_eq!(analyzer.raw_valence(Some(&unvoiced)), 0.5);
    }

    #[test]
    fn missing_inputs_hold_previous_estimate() {
        let mut analyzer = EmotionAnalyzer::default();
        analyze(&mut analyzer, &prior(-10.0, 200.0, 1_000.0, 8.0, false));
        let held = analyzer.arousal();
        let result = analyze(&mut analyzer, &AnalysisSet::default());
        assert_eq!(result.scalar(features::AROUSAL), Some(held));
        assert!(result.scalar(features::RAW_AROUSAL).is_none());
        assert_eq!(result.scalar(features::VALENCE_CONFIDENCE), Some(0.3));
    }

    #[test]
    fn quadrants() {
        assert_eq!(Quadrant::of(0.8, 0.7), Quadrant::Excited);
        assert_eq!(Quadrant::of(0.8, 0.2), Quadrant::Tense);
        assert_eq!(Quadrant::of(0.2, 0.7), Quadrant::Calm);
        assert_eq!(Quadrant::of(0.2, 0.2), Quadrant::Subdued);
    }
}
