//! `IntentEngine`: async boundary around a [`Pipeline`].
//!
//! ## Lifecycle
//!
//! ```text
//! IntentEngine::new(pipeline)      → status = Idle
//!     └─► start()                  → worker spawned, status = Running
//!         └─► push_frame() ...     → bounded queue → worker → broadcast
//!             └─► stop().await     → queue drained, status = Stopped,
//!                                    pipeline handed back
//! ```
//!
//! `start()`/`stop()` in the wrong state return an error rather than panicking.
//!
//! ## Threading
//!
//! The pipeline is synchronous and runs on a `spawn_blocking` thread; it is
//! never shared. Producers push frames through a bounded crossbeam queue
//! that drops the oldest frame when full, so a stalled worker costs
//! freshness, not memory. Packets go out on a `tokio::sync::broadcast`
//! channel; a subscriber that falls behind loses the oldest packets.

pub mod diagnostics;
pub mod pipeline;

pub use diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics};
pub use pipeline::{PacketCallback, Packets, Pipeline, PipelineBuilder};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::AudioFrame;
use crate::error::{Result, TalkytalkError};
use crate::packet::IntentPacket;

/// How long the worker waits for a frame before re-checking the running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, `start()` not yet called.
    Idle,
    Running,
    /// Worker finished; the pipeline has been handed back by `stop()`.
    Stopped,
}

/// Shareable engine handle. All fields use interior mutability; wrap in an
/// `Arc` to push frames from one task and subscribe from another.
pub struct IntentEngine {
    /// Present until `start()` moves it onto the worker.
    pipeline: Mutex<Option<Pipeline>>,
    frame_tx: Sender<AudioFrame>,
    /// Kept so the producer side can evict the oldest frame on overflow.
    frame_rx: Receiver<AudioFrame>,
    packet_tx: broadcast::Sender<IntentPacket>,
    running: Arc<AtomicBool>,
    /// Pushes hold it shared; `stop()` holds it exclusively to clear
    /// `running`, so no push lands after the worker's final drain.
    push_gate: RwLock<()>,
    status: Arc<Mutex<EngineStatus>>,
    diagnostics: Arc<PipelineDiagnostics>,
    worker: Mutex<Option<JoinHandle<Pipeline>>>,
}

impl IntentEngine {
    pub fn new(pipeline: Pipeline) -> Self {
        let config = pipeline.config();
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(config.frame_queue_capacity.max(1));
        let (packet_tx, _) = broadcast::channel(config.packet_channel_capacity.max(1));
        let diagnostics = pipeline.diagnostics_handle();

        Self {
            pipeline: Mutex::new(Some(pipeline)),
            frame_tx,
            frame_rx,
            packet_tx,
            running: Arc::new(AtomicBool::new(false)),
            push_gate: RwLock::new(()),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            diagnostics,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `TalkytalkError::AlreadyRunning` if already started.
    /// - `TalkytalkError::Other` if a previous `stop()` already handed the
    ///   pipeline back.
    pub fn start(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(TalkytalkError::AlreadyRunning);
        }
        let Some(mut pipeline) = self.pipeline.lock().take() else {
            return Err(TalkytalkError::Other(anyhow::anyhow!(
                "pipeline was handed back by stop(); build a new engine"
            )));
        };

        self.running.store(true, Ordering::SeqCst);
        *self.status.lock() = EngineStatus::Running;

        let running = Arc::clone(&self.running);
        let frames = self.frame_rx.clone();
        let packet_tx = self.packet_tx.clone();
        let diagnostics = Arc::clone(&self.diagnostics);

        let handle = tokio::task::spawn_blocking(move || {
            while running.load(Ordering::SeqCst) {
                match frames.recv_timeout(POLL_INTERVAL) {
                    Ok(frame) => forward(&mut pipeline, frame, &packet_tx),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // Frames queued before stop() still count.
            while let Ok(frame) = frames.try_recv() {
                forward(&mut pipeline, frame, &packet_tx);
            }

            let d = diagnostics.snapshot();
            info!(
                frames_accepted = d.frames_accepted,
                frames_rejected = d.frames_rejected,
                frames_dropped = d.frames_dropped,
                analyzer_failures = d.analyzer_failures,
                packets_emitted = d.packets_emitted,
                over_budget_frames = d.over_budget_frames,
                "engine worker finished"
            );
            pipeline
        });
        *self.worker.lock() = Some(handle);

        info!(
            queue_capacity = self.frame_tx.capacity().unwrap_or(0),
            "engine started"
        );
        Ok(())
    }

    /// Queue a frame for processing. Never blocks: when the queue is full
    /// the oldest queued frame is discarded.
    ///
    /// # Errors
    /// `TalkytalkError::NotRunning` unless the engine is running.
    pub fn push_frame(&self, frame: AudioFrame) -> Result<()> {
        let _gate = self.push_gate.read();
        if !self.running.load(Ordering::SeqCst) {
            return Err(TalkytalkError::NotRunning);
        }
        let mut frame = frame;
        loop {
            match self.frame_tx.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.frame_rx.try_recv() {
                        self.diagnostics
                            .frames_dropped
                            .fetch_add(1, Ordering::Relaxed);
                        debug!(
                            dropped_frame_id = oldest.frame_id(),
                            "frame queue full, dropped oldest"
                        );
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(TalkytalkError::NotRunning),
            }
        }
    }

    /// Subscribe to emitted packets. Receivers only see packets sent after
    /// they subscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<IntentPacket> {
        self.packet_tx.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Stop accepting frames, let the worker drain the queue, and take the
    /// pipeline back with its predictor state intact.
    ///
    /// # Errors
    /// - `TalkytalkError::NotRunning` if not currently running.
    /// - `TalkytalkError::Other` if the worker panicked.
    pub async fn stop(&self) -> Result<Pipeline> {
        let was_running = {
            let _gate = self.push_gate.write();
            self.running.swap(false, Ordering::SeqCst)
        };
        if !was_running {
            return Err(TalkytalkError::NotRunning);
        }
        info!("engine stop requested");

        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return Err(TalkytalkError::NotRunning);
        };
        let result = handle.await;
        *self.status.lock() = EngineStatus::Stopped;
        result.map_err(|e| TalkytalkError::Other(anyhow::anyhow!("engine worker failed: {e}")))
    }
}

fn forward(pipeline: &mut Pipeline, frame: AudioFrame, packet_tx: &broadcast::Sender<IntentPacket>) {
    // Rejected frames are already logged and counted by the pipeline.
    if let Ok(Some(packet)) = pipeline.process(frame) {
        // No subscribers is not an error.
        let _ = packet_tx.send(packet);
    }
}
