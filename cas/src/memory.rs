//! In-memory content store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use crate::cas::ContentStore;
use crate::error::CasError;

/// An in-memory [`ContentStore`] addressing payloads by `sha256:<hex>`.
///
/// Counts `put` calls so tests can observe re-uploads. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    puts: Arc<AtomicUsize>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content id for a payload.
    pub fn content_id(data: &[u8]) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(data)))
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of distinct objects stored.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, data: &[u8]) -> Result<String, CasError> {
        let cid = Self::content_id(data);
        let mut objects = self
            .objects
            .lock()
            .map_err(|e| CasError::Unavailable(e.to_string()))?;
        objects.entry(cid.clone()).or_insert_with(|| data.to_vec());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, CasError> {
        let objects = self
            .objects
            .lock()
            .map_err(|e| CasError::Unavailable(e.to_string()))?;
        objects
            .get(cid)
            .cloned()
            .ok_or_else(|| CasError::NotFound(cid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_bytes_same_id() {
        let store = MemoryContentStore::new();
        let a = store.put(b"payload").await.unwrap();
        let b = store.put(b"payload").await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.get(&a).await.unwrap(), b"payload".to_vec());
    }

    #[tokio::test]
    async fn missing_content() {
        let store = MemoryContentStore::new();
        assert_eq!(
            store.get("sha256:00").await.unwrap_err(),
            CasError::NotFound("sha256:00".into())
        );
    }
}
