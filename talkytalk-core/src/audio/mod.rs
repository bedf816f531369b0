//! Audio frame primitives.
//!
//! The pipeline consumes short (20–40 ms) mono frames of f32 samples in
//! [-1.0, 1.0]. Capture, decoding and resampling happen upstream; a frame
//! arriving here is already at the pipeline's configured rate.

pub mod dsp;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TalkytalkError};

/// Shortest frame duration the pipeline accepts.
pub const MIN_FRAME_DURATION_MS: u32 = 20;
/// Longest frame duration the pipeline accepts.
pub const MAX_FRAME_DURATION_MS: u32 = 40;

/// Sample rate and frame size shared by a source and the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per second. Default: 16000.
    pub sample_rate: u32,
    /// Duration of one frame in milliseconds. Default: 20.
    pub frame_duration_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration_ms: 20,
        }
    }
}

impl AudioConfig {
    pub fn new(sample_rate: u32, frame_duration_ms: u32) -> Self {
        Self {
            sample_rate,
            frame_duration_ms,
        }
    }

    /// Number of samples in one frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TalkytalkError::config("sample_rate must be positive"));
        }
        if !(MIN_FRAME_DURATION_MS..=MAX_FRAME_DURATION_MS).contains(&self.frame_duration_ms) {
            return Err(TalkytalkError::config(format!(
                "frame_duration_ms must be within {MIN_FRAME_DURATION_MS}..={MAX_FRAME_DURATION_MS}, got {}",
                self.frame_duration_ms
            )));
        }
        if (self.sample_rate as u64 * self.frame_duration_ms as u64) % 1000 != 0 {
            return Err(TalkytalkError::config(format!(
                "{} ms at {} Hz is not a whole number of samples",
                self.frame_duration_ms, self.sample_rate
            )));
        }
        Ok(())
    }
}

/// One immutable frame of mono PCM audio.
///
/// Owned by the producer until handed to the pipeline, then owned by the
/// frame buffer until evicted.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    frame_id: u64,
    timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, frame_id: u64, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            frame_id,
            timestamp_ms,
        }
    }

    /// Build a frame from signed 16-bit PCM, scaling to [-1.0, 1.0).
    pub fn from_pcm16(pcm: &[i16], sample_rate: u32, frame_id: u64, timestamp_ms: u64) -> Self {
        let samples = pcm.iter().map(|&s| s as f32 / 32_768.0).collect();
        Self::new(samples, sample_rate, frame_id, timestamp_ms)
    }

    /// A frame of digital silence sized for `config`.
    pub fn silence(config: &AudioConfig, frame_id: u64, timestamp_ms: u64) -> Self {
        Self::new(
            vec![0.0; config.samples_per_frame()],
            config.sample_rate,
            frame_id,
            timestamp_ms,
        )
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Duration implied by the sample count, rounded down to whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn rms(&self) -> f32 {
        dsp::rms(&self.samples)
    }
}
