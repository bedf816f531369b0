//! Pipeline counters.
//!
//! Relaxed atomics: every counter is written by the single frame-processing
//! thread and read from anywhere for observability.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub frames_accepted: AtomicUsize,
    pub frames_rejected: AtomicUsize,
    pub analyzer_failures: AtomicUsize,
    pub packets_emitted: AtomicUsize,
    /// Frames whose processing took longer than the frame itself lasts.
    pub over_budget_frames: AtomicUsize,
    /// Frames discarded by the engine's input queue on overflow.
    pub frames_dropped: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            analyzer_failures: self.analyzer_failures.load(Ordering::Relaxed),
            packets_emitted: self.packets_emitted.load(Ordering::Relaxed),
            over_budget_frames: self.over_budget_frames.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_accepted: usize,
    pub frames_rejected: usize,
    pub analyzer_failures: usize,
    pub packets_emitted: usize,
    pub over_budget_frames: usize,
    pub frames_dropped: usize,
}
