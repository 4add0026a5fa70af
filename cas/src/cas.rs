use crate::error::CasError;

/// ContentStore stores immutable payloads under deterministic ids.
///
/// Implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a payload and return its content id. Storing identical bytes
    /// again returns the same id.
    async fn put(&self, data: &[u8]) -> Result<String, CasError>;

    /// Fetch the payload stored under a content id.
    async fn get(&self, cid: &str) -> Result<Vec<u8>, CasError>;
}
