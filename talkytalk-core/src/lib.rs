//! # talkytalk-core
//!
//! Streaming intent and turn-taking signals from raw audio frames.
//!
//! ## Architecture
//!
//! ```text
//! FrameSource → FrameBuffer → AnalyzerStage (VAD → prosody → emotion [→ language])
//!                                   │
//!                              AnalysisSet
//!                                   │
//!           PredictorChain (intent → timing → early intent → turn taking)
//!                                   │
//!                            PredictorState
//!                                   │
//!                   emission policy → IntentPacket → callbacks / adapters
//! ```
//!
//! [`Pipeline`] is synchronous and deterministic: the same frames with the
//! same configuration produce the same packets. [`IntentEngine`] runs a
//! pipeline on a blocking worker behind a bounded frame queue and a
//! broadcast packet channel.
//!
//! ```no_run
//! use talkytalk_core::{Pipeline, PipelineConfig, SyntheticSource};
//!
//! let config = PipelineConfig::default();
//! let mut pipeline = Pipeline::standard(config.clone())?;
//! let source = SyntheticSource::new(config.audio)
//!     .glide(140.0, 260.0, 800, 0.5)
//!     .silence(800);
//! for packet in pipeline.run_sync(source) {
//!     println!("{:?} {:.2}", packet.intent, packet.confidence);
//! }
//! # Ok::<(), talkytalk_core::TalkytalkError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod packet;
pub mod predict;
pub mod source;

// Convenience re-exports for downstream crates
pub use analysis::{AnalysisResult, AnalysisSet, Analyzer, FeatureValue};
pub use audio::{AudioConfig, AudioFrame};
pub use buffering::{FrameBuffer, FrameWindow};
pub use config::PipelineConfig;
pub use engine::{
    DiagnosticsSnapshot, EngineStatus, IntentEngine, Pipeline, PipelineBuilder,
};
pub use error::{FrameError, Result, TalkytalkError};
pub use packet::{Adapter, Emotion, Intent, IntentPacket, JsonAdapter};
pub use predict::{
    InterruptReason, PredictionContext, Predictor, PredictorStage, PredictorState, TurnState,
};
pub use source::{ArraySource, FrameSource, SyntheticSource};
