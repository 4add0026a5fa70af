//! Durable local queues backed by redb.
//!
//! Every queue lives in its own redb file. Each state transition (enqueue,
//! archive, quarantine, clear) is a single write transaction, so an entry is
//! visible in exactly one table at any time, including across crashes.
//! redb holds an exclusive lock on the file, which makes each queue
//! single-writer across processes.

pub mod auth;
mod db;
pub mod intents;
pub mod pending;

use thiserror::Error;

/// Errors that can occur in queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue: storage error: {0}")]
    Storage(String),

    #[error("queue: serialization error: {0}")]
    Serialization(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

pub use auth::{AuthQueue, AuthRequest, QueuedRequest, StoredDecision};
pub use intents::IntentQueue;
pub use pending::{FailedEntry, PendingStore};
