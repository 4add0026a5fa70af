use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CasError {
    #[error("cas: unavailable: {0}")]
    Unavailable(String),

    #[error("cas: call timed out")]
    Timeout,

    #[error("cas: content {0} not found")]
    NotFound(String),

    #[error("cas: rejected: {0}")]
    Rejected(String),
}

impl CasError {
    /// Returns true if the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CasError::Unavailable(_) | CasError::Timeout)
    }
}
