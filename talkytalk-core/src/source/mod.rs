//! Frame sources.
//!
//! Live capture is outside this crate; anything that can hand over frames
//! with increasing ids implements [`FrameSource`]. [`ArraySource`] slices a
//! sample buffer and [`SyntheticSource`] renders test signals into one.

pub mod synthetic;

pub use synthetic::SyntheticSource;

use crate::audio::{AudioConfig, AudioFrame};

pub trait FrameSource {
    fn config(&self) -> AudioConfig;

    /// `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<AudioFrame>;

    fn frames(self) -> Frames<Self>
    where
        Self: Sized,
    {
        Frames { source: self }
    }
}

/// Iterator over a source's frames.
pub struct Frames<S> {
    source: S,
}

impl<S: FrameSource> Iterator for Frames<S> {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        self.source.next_frame()
    }
}

/// Frames cut from an in-memory sample buffer.
///
/// Samples outside [-1, 1] are peak-normalised. Timestamps are
/// `frame_id × frame_duration_ms`; a trailing partial frame is dropped.
#[derive(Debug, Clone)]
pub struct ArraySource {
    audio: AudioConfig,
    samples: Vec<f32>,
    position: usize,
    next_id: u64,
}

impl ArraySource {
    pub fn new(audio: AudioConfig, mut samples: Vec<f32>) -> Self {
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 1.0 {
            for s in &mut samples {
                *s /= peak;
            }
        }
        Self {
            audio,
            samples,
            position: 0,
            next_id: 0,
        }
    }

    /// Whole frames still to come.
    pub fn remaining(&self) -> usize {
        let spf = self.audio.samples_per_frame().max(1);
        (self.samples.len() - self.position) / spf
    }
}

impl FrameSource for ArraySource {
    fn config(&self) -> AudioConfig {
        self.audio
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        let spf = self.audio.samples_per_frame();
        if spf == 0 || self.position + spf > self.samples.len() {
            return None;
        }
        let samples = self.samples[self.position..self.position + spf].to_vec();
        let frame = AudioFrame::new(
            samples,
            self.audio.sample_rate,
            self.next_id,
            self.next_id * self.audio.frame_duration_ms as u64,
        );
        self.position += spf;
        self.next_id += 1;
        Some(frame)
    }
}
