//! Fault-injecting collaborators for tests and drills.
//!
//! Both wrap the in-memory implementations and fail with a retryable
//! `Unavailable` error while a toggle is set. The content store can also
//! refuse writes with a permanent `Rejected` error. Clones share toggles and
//! state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use faceproof_cas::{CasError, ContentStore, MemoryContentStore};
use faceproof_ledger::{Ledger, LedgerError, LedgerRecord, MemoryLedger};

/// A [`MemoryContentStore`] that can be switched off.
#[derive(Clone, Default)]
pub struct FlakyContentStore {
    inner: MemoryContentStore,
    failing: Arc<AtomicBool>,
    rejecting: Arc<AtomicBool>,
}

impl FlakyContentStore {
    pub fn new(inner: MemoryContentStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Refuse every `put` as a permanent error.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryContentStore {
        &self.inner
    }

    fn check(&self) -> Result<(), CasError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CasError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentStore for FlakyContentStore {
    async fn put(&self, data: &[u8]) -> Result<String, CasError> {
        self.check()?;
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(CasError::Rejected("injected refusal".into()));
        }
        self.inner.put(data).await
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, CasError> {
        self.check()?;
        self.inner.get(cid).await
    }
}

/// A [`MemoryLedger`] with an outage switch for every call and a separate
/// one for `confirm_cid_upload` only.
#[derive(Clone, Default)]
pub struct FlakyLedger {
    inner: MemoryLedger,
    failing: Arc<AtomicBool>,
    failing_confirm: Arc<AtomicBool>,
}

impl FlakyLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_confirm(&self, failing: bool) {
        self.failing_confirm.store(failing, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryLedger {
        &self.inner
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Ledger for FlakyLedger {
    async fn register_hash(&self, key: &str, meta: &str) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.register_hash(key, meta).await
    }

    async fn get_cid(&self, key: &str) -> Result<Option<String>, LedgerError> {
        self.check()?;
        self.inner.get_cid(key).await
    }

    async fn read_record(&self, key: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        self.check()?;
        self.inner.read_record(key).await
    }

    async fn confirm_cid_upload(&self, key: &str, cid: &str) -> Result<(), LedgerError> {
        self.check()?;
        if self.failing_confirm.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected confirm outage".into()));
        }
        self.inner.confirm_cid_upload(key, cid).await
    }

    async fn delete_cid_record(&self, key: &str) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.delete_cid_record(key).await
    }

    async fn get_all_cid_records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.check()?;
        self.inner.get_all_cid_records().await
    }
}
