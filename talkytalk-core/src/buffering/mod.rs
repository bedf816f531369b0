//! Sliding window of recent frames.
//!
//! The buffer is the analyzers' only view of temporal context. It is owned by
//! exactly one pipeline and mutated only by frame ingestion.
//!
//! ## Invariants
//!
//! - frames are strictly ordered by `frame_id`
//! - every frame has exactly `samples_per_frame` samples at `sample_rate`
//! - `len() × frame_duration_ms ≤ window_ms`, oldest frames evicted first

use std::collections::VecDeque;

use crate::audio::{AudioConfig, AudioFrame};
use crate::error::FrameError;

/// Append-only sliding window of the most recent frames.
#[derive(Debug)]
pub struct FrameBuffer {
    frames: VecDeque<AudioFrame>,
    audio: AudioConfig,
    window_ms: u64,
    /// Survives eviction and is only cleared by `clear()`.
    last_frame_id: Option<u64>,
}

impl FrameBuffer {
    /// Create a buffer holding up to `window_ms` of audio (at least one frame).
    pub fn new(audio: AudioConfig, window_ms: u64) -> Self {
        let frame_ms = audio.frame_duration_ms.max(1) as u64;
        let capacity = (window_ms / frame_ms).max(1) as usize;
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            audio,
            window_ms: window_ms.max(frame_ms),
            last_frame_id: None,
        }
    }

    /// Append a frame, evicting from the front until the window fits.
    ///
    /// # Errors
    /// Rejects the frame without modifying the buffer when its id does not
    /// increase, or when its rate or sample count disagrees with the config.
    pub fn push(&mut self, frame: AudioFrame) -> Result<(), FrameError> {
        if let Some(previous) = self.last_frame_id {
            if frame.frame_id() <= previous {
                return Err(FrameError::NonMonotonicId {
                    previous,
                    got: frame.frame_id(),
                });
            }
        }
        if frame.samples().is_empty() {
            return Err(FrameError::Empty {
                frame_id: frame.frame_id(),
            });
        }
        if frame.sample_rate() != self.audio.sample_rate {
            return Err(FrameError::SampleRateMismatch {
                frame_id: frame.frame_id(),
                expected: self.audio.sample_rate,
                got: frame.sample_rate(),
            });
        }
        let expected = self.audio.samples_per_frame();
        if frame.samples().len() != expected {
            return Err(FrameError::SampleCountMismatch {
                frame_id: frame.frame_id(),
                expected,
                got: frame.samples().len(),
            });
        }

        self.last_frame_id = Some(frame.frame_id());
        self.frames.push_back(frame);
        while self.duration_ms() > self.window_ms {
            self.frames.pop_front();
        }
        Ok(())
    }

    /// Read-only view of the buffered frames, oldest first.
    pub fn window(&self) -> FrameWindow<'_> {
        FrameWindow {
            frames: &self.frames,
            audio: self.audio,
        }
    }

    /// Total buffered audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.frames.len() as u64 * self.audio.frame_duration_ms as u64
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last_frame_id(&self) -> Option<u64> {
        self.last_frame_id
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.last_frame_id = None;
    }
}

/// Borrowed, ordered view over the buffer handed to analyzers.
#[derive(Debug, Clone, Copy)]
pub struct FrameWindow<'a> {
    frames: &'a VecDeque<AudioFrame>,
    audio: AudioConfig,
}

impl<'a> FrameWindow<'a> {
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'a AudioFrame> + 'a {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn latest(&self) -> Option<&'a AudioFrame> {
        self.frames.back()
    }

    pub fn audio(&self) -> AudioConfig {
        self.audio
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames.len() as u64 * self.audio.frame_duration_ms as u64
    }

    /// All buffered samples, oldest first.
    pub fn concat(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames.len() * self.audio.samples_per_frame());
        for frame in self.frames {
            out.extend_from_slice(frame.samples());
        }
        out
    }

    /// The most recent `duration_ms` of samples (or everything buffered, if less).
    pub fn tail(&self, duration_ms: u64) -> Vec<f32> {
        let wanted = (self.audio.sample_rate as u64 * duration_ms / 1000) as usize;
        let mut chunks: Vec<&[f32]> = Vec::new();
        let mut collected = 0usize;
        for frame in self.frames.iter().rev() {
            if collected >= wanted {
                break;
            }
            chunks.push(frame.samples());
            collected += frame.samples().len();
        }
        let mut out = Vec::with_capacity(collected);
        for chunk in chunks.iter().rev() {
            out.extend_from_slice(chunk);
        }
        let excess = out.len().saturating_sub(wanted);
        out.drain(..excess);
        out
    }
}
