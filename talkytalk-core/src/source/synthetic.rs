//! Deterministic test signals.
//!
//! A [`SyntheticSource`] is a list of segments rendered back to back into one
//! sample buffer. Oscillator phase carries across segments so a tone followed
//! by a glide has no click at the seam. Noise comes from a seeded RNG, so two
//! sources built the same way produce identical frames.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ArraySource, FrameSource};
use crate::audio::{AudioConfig, AudioFrame};

const DEFAULT_SEED: u64 = 0x7a1c;

/// Envelope floor for syllabic segments; the valleys between syllables keep
/// this much amplitude.
const SYLLABLE_FLOOR: f32 = 0.15;

#[derive(Debug)]
pub struct SyntheticSource {
    audio: AudioConfig,
    samples: Vec<f32>,
    phase: f32,
    rng: StdRng,
    rendered: Option<ArraySource>,
}

impl SyntheticSource {
    pub fn new(audio: AudioConfig) -> Self {
        Self::with_seed(audio, DEFAULT_SEED)
    }

    pub fn with_seed(audio: AudioConfig, seed: u64) -> Self {
        Self {
            audio,
            samples: Vec::new(),
            phase: 0.0,
            rng: StdRng::seed_from_u64(seed),
            rendered: None,
        }
    }

    fn len_for(&self, duration_ms: u64) -> usize {
        (self.audio.sample_rate as u64 * duration_ms / 1000) as usize
    }

    pub fn silence(mut self, duration_ms: u64) -> Self {
        let n = self.len_for(duration_ms);
        self.samples.resize(self.samples.len() + n, 0.0);
        self
    }

    pub fn tone(self, freq_hz: f32, duration_ms: u64, amplitude: f32) -> Self {
        self.glide(freq_hz, freq_hz, duration_ms, amplitude)
    }

    /// Sine whose frequency moves linearly from `from_hz` to `to_hz`.
    pub fn glide(self, from_hz: f32, to_hz: f32, duration_ms: u64, amplitude: f32) -> Self {
        self.oscillate(from_hz, to_hz, duration_ms, |_| amplitude)
    }

    /// A glide amplitude-modulated into `syllable_rate_hz` bursts per second,
    /// a rough stand-in for connected speech.
    pub fn syllabic(
        self,
        from_hz: f32,
        to_hz: f32,
        duration_ms: u64,
        amplitude: f32,
        syllable_rate_hz: f32,
    ) -> Self {
        self.oscillate(from_hz, to_hz, duration_ms, |t| {
            let s = (PI * syllable_rate_hz * t).sin();
            amplitude * (SYLLABLE_FLOOR + (1.0 - SYLLABLE_FLOOR) * s * s)
        })
    }

    /// Uniform noise in [-amplitude, amplitude].
    pub fn noise(mut self, duration_ms: u64, amplitude: f32) -> Self {
        let n = self.len_for(duration_ms);
        let amp = amplitude.abs();
        self.samples.reserve(n);
        for _ in 0..n {
            let s = if amp > 0.0 {
                self.rng.gen_range(-amp..=amp)
            } else {
                0.0
            };
            self.samples.push(s);
        }
        self
    }

    /// Append caller-supplied samples verbatim.
    pub fn samples(mut self, samples: &[f32]) -> Self {
        self.samples.extend_from_slice(samples);
        self
    }

    /// Rendered length so far.
    pub fn duration_ms(&self) -> u64 {
        if self.audio.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.audio.sample_rate as u64
    }

    pub fn into_array(self) -> ArraySource {
        ArraySource::new(self.audio, self.samples)
    }

    fn oscillate<E>(mut self, from_hz: f32, to_hz: f32, duration_ms: u64, envelope: E) -> Self
    where
        E: Fn(f32) -> f32,
    {
        let n = self.len_for(duration_ms);
        let rate = self.audio.sample_rate as f32;
        self.samples.reserve(n);
        for i in 0..n {
            let progress = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
            let freq = from_hz + (to_hz - from_hz) * progress;
            let t = i as f32 / rate;
            self.samples.push(envelope(t) * self.phase.sin());
            self.phase = (self.phase + 2.0 * PI * freq / rate) % (2.0 * PI);
        }
        self
    }
}

impl FrameSource for SyntheticSource {
    fn config(&self) -> AudioConfig {
        self.audio
    }

    /// The first call freezes the segment list; anything appended after
    /// that is not played.
    fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.rendered.is_none() {
            let samples = std::mem::take(&mut self.samples);
            self.rendered = Some(ArraySource::new(self.audio, samples));
        }
        self.rendered.as_mut()?.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::dsp;

    fn audio() -> AudioConfig {
        AudioConfig::default()
    }

    #[test]
    fn segments_render_back_to_back() {
        let source = SyntheticSource::new(audio())
            .silence(100)
            .tone(200.0, 200, 0.5)
            .noise(60, 0.1);
        assert_eq!(source.duration_ms(), 360);
        let frames: Vec<AudioFrame> = source.frames().collect();
        assert_eq!(frames.len(), 18);
        assert_eq!(frames[0].rms(), 0.0);
        assert!(frames[5].rms() > 0.3);
        assert_eq!(frames.last().map(|f| f.timestamp_ms()), Some(340));
    }

    #[test]
    fn tone_pitch_is_recoverable() {
        let frames: Vec<AudioFrame> = SyntheticSource::new(audio())
            .tone(200.0, 100, 0.5)
            .frames()
            .collect();
        let two: Vec<f32> = frames[1..3]
            .iter()
            .flat_map(|f| f.samples().iter().copied())
            .collect();
        let pitch = dsp::estimate_pitch(&two, 16_000, 50.0, 500.0, 0.3).expect("voiced");
        assert!((pitch - 200.0).abs() < 10.0, "pitch {pitch}");
    }

    #[test]
    fn same_seed_same_noise() {
        let a: Vec<AudioFrame> = SyntheticSource::with_seed(audio(), 9)
            .noise(100, 0.3)
            .frames()
            .collect();
        let b: Vec<AudioFrame> = SyntheticSource::with_seed(audio(), 9)
            .noise(100, 0.3)
            .frames()
            .collect();
        let c: Vec<AudioFrame> = SyntheticSource::with_seed(audio(), 10)
            .noise(100, 0.3)
            .frames()
            .collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().flat_map(|f| f.samples()).all(|s| s.abs() <= 0.3));
    }

    #[test]
    fn syllabic_envelope_dips_between_bursts() {
        // 5 Hz syllables: peaks at 100 ms, 300 ms; valleys at 0, 200, 400 ms.
        let frames: Vec<AudioFrame> = SyntheticSource::new(audio())
            .syllabic(200.0, 200.0, 400, 0.8, 5.0)
            .frames()
            .collect();
        let peak = frames[5].rms();
        let valley = frames[10].rms().min(frames[9].rms());
        assert!(peak > 2.0 * valley, "peak {peak} valley {valley}");
    }
}
