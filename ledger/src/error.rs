use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger: unavailable: {0}")]
    Unavailable(String),

    #[error("ledger: call timed out")]
    Timeout,

    #[error("ledger: record {0} already exists")]
    AlreadyExists(String),

    #[error("ledger: record {0} does not exist")]
    NotFound(String),

    #[error("ledger: rejected: {0}")]
    Rejected(String),

    #[error("ledger: decode error: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Returns true if the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout)
    }
}
