use thiserror::Error;

/// A frame rejected at ingestion. The stream continues; no predictor state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame id {got} is not greater than previous frame id {previous}")]
    NonMonotonicId { previous: u64, got: u64 },

    #[error("frame {frame_id} has {got} samples, expected {expected}")]
    SampleCountMismatch {
        frame_id: u64,
        expected: usize,
        got: usize,
    },

    #[error("frame {frame_id} sampled at {got} Hz, pipeline expects {expected} Hz")]
    SampleRateMismatch {
        frame_id: u64,
        expected: u32,
        got: u32,
    },

    #[error("frame {frame_id} carries no samples")]
    Empty { frame_id: u64 },
}

/// All errors produced by talkytalk-core.
#[derive(Debug, Error)]
pub enum TalkytalkError {
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("analyzer `{analyzer}` failed: {reason}")]
    Analyzer { analyzer: String, reason: String },

    #[error("invalid configuration json: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TalkytalkError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TalkytalkError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TalkytalkError>;
