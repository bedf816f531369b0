//! Prosody: pitch, intonation, tempo and pauses.
//!
//! These are the behavioral cues that precede semantic content: rising
//! terminal pitch marks a question forming, falling pitch plus a fast tempo
//! marks a command, pauses mark possible turn ends.
//!
//! The terminal intonation is the slope of the last voiced stretch and is
//! held through the following silence (for `intonation_hold_ms`), so timing
//! decisions made during a pause still see how the utterance ended.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{features, vad, AnalysisResult, AnalysisSet, Analyzer};
use crate::audio::{dsp, AudioFrame};
use crate::buffering::FrameWindow;
use crate::error::{Result, TalkytalkError};

pub const NAME: &str = "prosody";

/// Direction of the terminal pitch slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intonation {
    Rising,
    Falling,
    Flat,
}

impl Intonation {
    pub fn as_str(self) -> &'static str {
        match self {
            Intonation::Rising => "rising",
            Intonation::Falling => "falling",
            Intonation::Flat => "flat",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "rising" => Some(Intonation::Rising),
            "falling" => Some(Intonation::Falling),
            "flat" => Some(Intonation::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ProsodyConfig {
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    /// Silence after which `is_pausing` is reported. Default: 200.
    pub pause_threshold_ms: u64,
    /// Audio span fed to the pitch tracker. Default: 40.
    pub pitch_window_ms: u64,
    /// Minimum normalised autocorrelation peak for a voiced frame. Default: 0.3.
    pub voicing_threshold: f32,
    /// Frames quieter than this RMS are never pitch-tracked. Default: 0.01.
    pub voicing_rms: f32,
    /// Voiced estimates kept for variance. Default: 25.
    pub pitch_history_len: usize,
    /// Span before the last voiced frame used for the terminal slope. Default: 200.
    pub slope_window_ms: u64,
    /// |slope| above this (Hz per second) is rising or falling. Default: 80.
    pub slope_threshold_hz_per_s: f32,
    /// Fewest voiced points needed to call a slope. Default: 3.
    pub min_slope_points: usize,
    /// How long the terminal intonation survives silence. Default: 1000.
    pub intonation_hold_ms: u64,
    /// Tempo is only estimated once this much audio is buffered. Default: 500.
    pub tempo_min_window_ms: u64,
    /// Envelope floor so background hiss does not count as syllables. Default: 0.005.
    pub tempo_floor_rms: f32,
}

impl Default for ProsodyConfig {
    fn default() -> Self {
        Self {
            min_pitch_hz: 50.0,
            max_pitch_hz: 500.0,
            pause_threshold_ms: 200,
            pitch_window_ms: 40,
            voicing_threshold: 0.3,
            voicing_rms: 0.01,
            pitch_history_len: 25,
            slope_window_ms: 200,
            slope_threshold_hz_per_s: 80.0,
            min_slope_points: 3,
            intonation_hold_ms: 1_000,
            tempo_min_window_ms: 500,
            tempo_floor_rms: 0.005,
        }
    }
}

impl ProsodyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_pitch_hz > 0.0 && self.min_pitch_hz < self.max_pitch_hz) {
            return Err(TalkytalkError::config(
                "prosody.min_pitch_hz must be positive and below max_pitch_hz",
            ));
        }
        if !(0.0..=1.0).contains(&self.voicing_threshold) {
            return Err(TalkytalkError::config(
                "prosody.voicing_threshold must be within [0, 1]",
            ));
        }
        if self.voicing_rms < 0.0 || self.tempo_floor_rms < 0.0 {
            return Err(TalkytalkError::config(
                "prosody RMS floors must not be negative",
            ));
        }
        if self.slope_threshold_hz_per_s < 0.0 {
            return Err(TalkytalkError::config(
                "prosody.slope_threshold_hz_per_s must not be negative",
            ));
        }
        if self.pitch_history_len < 3 || self.min_slope_points < 2 {
            return Err(TalkytalkError::config(
                "prosody needs pitch_history_len ≥ 3 and min_slope_points ≥ 2",
            ));
        }
        if self.pitch_window_ms == 0 || self.slope_window_ms == 0 {
            return Err(TalkytalkError::config(
                "prosody windows must be non-empty",
            ));
        }
        Ok(())
    }
}

/// Prosodic feature extractor.
#[derive(Debug, Clone)]
pub struct ProsodyAnalyzer {
    config: ProsodyConfig,
    /// (timestamp_ms, pitch_hz) of recent voiced frames.
    pitch_history: VecDeque<(u64, f32)>,
    last_voiced_ms: Option<u64>,
    pause_ms: u64,
}

impl ProsodyAnalyzer {
    pub fn new(config: ProsodyConfig) -> Self {
        Self {
            pitch_history: VecDeque::with_capacity(config.pitch_history_len + 1),
            config,
            last_voiced_ms: None,
            pause_ms: 0,
        }
    }

    fn terminal_intonation(&self) -> Intonation {
        let Some(last_voiced) = self.last_voiced_ms else {
            return Intonation::Flat;
        };
        let start = last_voiced.saturating_sub(self.config.slope_window_ms);
        let points: Vec<(f32, f32)> = self
            .pitch_history
            .iter()
            .filter(|(ts, _)| *ts >= start)
            .map(|&(ts, hz)| ((ts - start) as f32 / 1000.0, hz))
            .collect();
        if points.len() < self.config.min_slope_points {
            return Intonation::Flat;
        }
        let slope = dsp::linear_slope(&points);
        if slope > self.config.slope_threshold_hz_per_s {
            Intonation::Rising
        } else if slope < -self.config.slope_threshold_hz_per_s {
            Intonation::Falling
        } else {
            Intonation::Flat
        }
    }

    fn pitch_variance(&self) -> f32 {
        if self.pitch_history.len() <= 2 {
            return 0.0;
        }
        let values: Vec<f32> = self.pitch_history.iter().map(|&(_, hz)| hz).collect();
        dsp::variance(&values)
    }

    /// Syllable-rate proxy: rising crossings of the smoothed energy envelope
    /// per second of buffered audio.
    fn estimate_tempo(&self, window: &FrameWindow<'_>) -> f32 {
        let duration_ms = window.duration_ms();
        if duration_ms < self.config.tempo_min_window_ms {
            return 0.0;
        }
        let samples = window.concat();
        let win = (window.audio().sample_rate / 100).max(2) as usize;
        let hop = win / 2;
        let envelope: Vec<f32> = (0..)
            .map(|i| i * hop)
            .take_while(|start| start + win <= samples.len())
            .map(|start| dsp::rms(&samples[start..start + win]))
            .collect();
        if envelope.len() < 10 {
            return 0.0;
        }
        let smoothed: Vec<f32> = envelope
            .windows(3)
            .map(|w| (w[0] + w[1] + w[2]) / 3.0)
            .collect();
        let mean = smoothed.iter().sum::<f32>() / smoothed.len() as f32;
        let threshold = (mean * 0.5).max(self.config.tempo_floor_rms);
        let peaks = smoothed
            .windows(2)
            .filter(|w| w[0] <= threshold && w[1] > threshold)
            .count();
        peaks as f32 / (duration_ms as f32 / 1000.0)
    }
}

impl Default for ProsodyAnalyzer {
    fn default() -> Self {
        Self::new(ProsodyConfig::default())
    }
}

impl Analyzer for ProsodyAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn analyze(
        &mut self,
        frame: &AudioFrame,
        window: &FrameWindow<'_>,
        prior: &AnalysisSet,
    ) -> Result<AnalysisResult> {
        let ts = frame.timestamp_ms();
        let frame_rms = frame.rms();
        let is_speech = prior
            .get(vad::NAME)
            .and_then(|r| r.flag(features::IS_SPEECH))
            .unwrap_or(frame_rms > self.config.voicing_rms);

        if is_speech {
            self.pause_ms = 0;
        } else {
            self.pause_ms += window.audio().frame_duration_ms as u64;
        }

        let pitch_hz = if is_speech && frame_rms > self.config.voicing_rms {
            dsp::estimate_pitch(
                &window.tail(self.config.pitch_window_ms),
                frame.sample_rate(),
                self.config.min_pitch_hz,
                self.config.max_pitch_hz,
                self.config.voicing_threshold,
            )
        } else {
            None
        };

        if let Some(hz) = pitch_hz {
            self.pitch_history.push_back((ts, hz));
            while self.pitch_history.len() > self.config.pitch_history_len {
                self.pitch_history.pop_front();
            }
            self.last_voiced_ms = Some(ts);
        }

        if let Some(last_voiced) = self.last_voiced_ms {
            if ts.saturating_sub(last_voiced) > self.config.intonation_hold_ms {
                self.pitch_history.clear();
                self.last_voiced_ms = None;
            }
        }

        let intonation = self.terminal_intonation();
        let tempo = self.estimate_tempo(window);

        Ok(AnalysisResult::new(NAME, frame)
            .with(features::PITCH_HZ, pitch_hz.unwrap_or(0.0))
            .with(features::PITCH_VARIANCE, self.pitch_variance())
            .with(features::TEMPO, tempo)
            .with(features::INTONATION, intonation.as_str())
            .with(
                features::IS_RISING_INTONATION,
                intonation == Intonation::Rising,
            )
            .with(
                features::IS_FALLING_INTONATION,
                intonation == Intonation::Falling,
            )
            .with(features::PAUSE_DURATION_MS, self.pause_ms)
            .with(features::IS_PAUSING, self.pause_ms >= self.config.pause_threshold_ms))
    }

    fn reset(&mut self) {
        self.pitch_history.clear();
        self.last_voiced_ms = None;
        self.pause_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioConfig;
    use crate::buffering::FrameBuffer;
    use std::f32::consts::TAU;

    /// Phase-continuous glide from `start_hz` to `end_hz` across `frames` frames.
    fn glide(start_hz: f32, end_hz: f32, frames: usize, amplitude: f32) -> Vec<Vec<f32>> {
        let per_frame = 320;
        let total = frames * per_frame;
        let mut phase = 0.0f32;
        let mut out = Vec::with_capacity(total);
        for i in 0..total {
            let hz = start_hz + (end_hz - start_hz) * i as f32 / total as f32;
            phase = (phase + TAU * hz / 16_000.0) % TAU;
            out.push(amplitude * phase.sin());
        }
        out.chunks(per_frame).map(|c| c.to_vec()).collect()
    }

    fn run(analyzer: &mut ProsodyAnalyzer, frames: Vec<Vec<f32>>) -> Vec<AnalysisResult> {
        let audio = AudioConfig::default();
        let mut buffer = FrameBuffer::new(audio, 1_000);
        frames
            .into_iter()
            .enumerate()
            .map(|(i, samples)| {
                let frame = AudioFrame::new(samples, 16_000, i as u64, i as u64 * 20);
                buffer.push(frame.clone()).expect("valid frame");
                analyzer
                    .analyze(&frame, &buffer.window(), &AnalysisSet::default())
                    .expect("prosody never fails")
            })
            .collect()
    }

    fn intonation_of(result: &AnalysisResult) -> Intonation {
        result
            .label(features::INTONATION)
            .and_then(Intonation::parse)
            .expect("intonation label")
    }

    #[test]
    fn rising_glide_reads_as_rising() {
        let mut analyzer = ProsodyAnalyzer::default();
        let results = run(&mut analyzer, glide(140.0, 280.0, 15, 0.3));
        let last = results.last().expect("results");
        assert_eq!(intonation_of(last), Intonation::Rising);
        assert_eq!(last.flag(features::IS_RISING_INTONATION), Some(true));
    }

    #[test]
    fn falling_glide_reads_as_falling() {
        let mut analyzer = ProsodyAnalyzer::default();
        let results = run(&mut analyzer, glide(280.0, 140.0, 15, 0.3));
        assert_eq!(intonation_of(results.last().expect("results")), Intonation::Falling);
    }

    #[test]
    fn steady_tone_is_flat_with_pitch() {
        let mut analyzer = ProsodyAnalyzer::default();
        let results = run(&mut analyzer, glide(180.0, 180.0, 15, 0.3));
        let last = results.last().expect("results");
        assert_eq!(intonation_of(last), Intonation::Flat);
        let hz = last.scalar(features::PITCH_HZ).expect("pitch");
        assert!((hz - 180.0).abs() < 6.0, "pitch {hz}");
    }

    #[test]
    fn intonation_is_held_then_released_in_silence() {
        let mut analyzer = ProsodyAnalyzer::default();
        let mut frames = glide(280.0, 140.0, 15, 0.3);
        frames.extend(std::iter::repeat(vec![0.0; 320]).take(60));
        let results = run(&mut analyzer, frames);

        // 400 ms into the silence the falling contour is still reported.
        assert_eq!(intonation_of(&results[15 + 19]), Intonation::Falling);
        assert_eq!(results[15 + 19].scalar(features::PAUSE_DURATION_MS), Some(400.0));
        assert_eq!(results[15 + 19].flag(features::IS_PAUSING), Some(true));
        assert_eq!(results[15 + 8].flag(features::IS_PAUSING), Some(false));
        // Past the hold it is released and the variance history is gone.
        let last = results.last().expect("results");
        assert_eq!(intonation_of(last), Intonation::Flat);
        assert_eq!(last.scalar(features::PITCH_VARIANCE), Some(0.0));
    }

    #[test]
    fn pause_follows_vad_when_present() {
        let mut analyzer = ProsodyAnalyzer::default();
        let audio = AudioConfig::default();
        let mut buffer = FrameBuffer::new(audio, 1_000);
        let frame = AudioFrame::new(vec![0.0; 320], 16_000, 0, 0);
        buffer.push(frame.clone()).expect("valid frame");

        // VAD still in hangover: silence samples, but speech reported.
        let mut prior = AnalysisSet::default();
        prior.insert(AnalysisResult::new(vad::NAME, &frame).with(features::IS_SPEECH, true));
        let result = analyzer
            .analyze(&frame, &buffer.window(), &prior)
            .expect("prosody never fails");
        assert_eq!(result.scalar(features::PAUSE_DURATION_MS), Some(0.0));
        assert_eq!(result.scalar(features::PITCH_HZ), Some(0.0));
    }

    #[test]
    fn syllabic_envelope_gives_tempo() {
        let mut analyzer = ProsodyAnalyzer::default();
        let total = 50 * 320;
        let samples: Vec<f32> = (0..total)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                let env = 0.15 + 0.85 * (std::f32::consts::PI * 7.0 * t).sin().powi(2);
                0.5 * env * (TAU * 150.0 * t).sin()
            })
            .collect();
        let frames = samples.chunks(320).map(|c| c.to_vec()).collect();
        let results = run(&mut analyzer, frames);
        let tempo = results
            .last()
            .and_then(|r| r.scalar(features::TEMPO))
            .expect("tempo");
        assert!((5.0..=9.0).contains(&tempo), "tempo {tempo}");
        // Not enough audio buffered early on.
        assert_eq!(results[10].scalar(features::TEMPO), Some(0.0));
    }

    #[test]
    fn validate_rejects_inverted_pitch_range() {
        let config = ProsodyConfig {
            min_pitch_hz: 400.0,
            max_pitch_hz: 100.0,
            ..ProsodyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
