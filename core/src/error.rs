use faceproof_cas::CasError;
use faceproof_embed::EmbedError;
use faceproof_ledger::LedgerError;
use faceproof_queue::QueueError;
use faceproof_vecstore::VecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Content(#[from] CasError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Index(#[from] VecError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("core: non-finite vector component at index {0}")]
    NonFiniteComponent(usize),

    #[error("core: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("core: invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("core: serialization error: {0}")]
    Serialization(String),

    #[error("core: calibration: {0}")]
    Calibration(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl CoreError {
    /// Returns true if the failure belongs to an unreachable collaborator
    /// rather than to the item being processed, so the same work may
    /// succeed on a later cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Ledger(e) => e.is_retryable(),
            CoreError::Content(e) => e.is_retryable(),
            _ => false,
        }
    }
}
