//! In-memory ledger for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::LedgerError;
use crate::ledger::{Ledger, LedgerRecord, LedgerStatus};

/// An in-memory [`Ledger`] with the contract's conflict rules:
/// registering a present key and confirming a confirmed key fail with
/// `AlreadyExists`, deleting an absent key fails with `NotFound`.
///
/// Records enumerate in key order. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<BTreeMap<String, LedgerRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, bypassing contract checks.
    pub fn put_raw(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        let mut records = self.lock()?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, LedgerRecord>>, LedgerError> {
        self.records
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn register_hash(&self, key: &str, _meta: &str) -> Result<(), LedgerError> {
        let mut records = self.lock()?;
        if records.contains_key(key) {
            return Err(LedgerError::AlreadyExists(key.to_string()));
        }
        records.insert(key.to_string(), LedgerRecord::registered(key));
        Ok(())
    }

    async fn get_cid(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let records = self.lock()?;
        Ok(records
            .get(key)
            .and_then(|r| r.confirmed_cid())
            .map(str::to_string))
    }

    async fn read_record(&self, key: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let records = self.lock()?;
        Ok(records.get(key).cloned())
    }

    async fn confirm_cid_upload(&self, key: &str, cid: &str) -> Result<(), LedgerError> {
        let mut records = self.lock()?;
        if let Some(existing) = records.get(key) {
            if existing.status == LedgerStatus::Confirmed {
                return Err(LedgerError::AlreadyExists(key.to_string()));
            }
        }
        records.insert(key.to_string(), LedgerRecord::confirmed(key, cid));
        Ok(())
    }

    async fn delete_cid_record(&self, key: &str) -> Result<(), LedgerError> {
        let mut records = self.lock()?;
        match records.remove(key) {
            Some(_) => Ok(()),
            None => Err(LedgerError::NotFound(key.to_string())),
        }
    }

    async fn get_all_cid_records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let records = self.lock()?;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_confirm_delete() {
        let ledger = MemoryLedger::new();

        ledger.register_hash("h1", "{}").await.unwrap();
        assert_eq!(ledger.get_cid("h1").await.unwrap(), None);
        assert_eq!(
            ledger.register_hash("h1", "{}").await.unwrap_err(),
            LedgerError::AlreadyExists("h1".into())
        );

        ledger.confirm_cid_upload("h1", "c1").await.unwrap();
        assert_eq!(ledger.get_cid("h1").await.unwrap(), Some("c1".into()));
        assert_eq!(
            ledger.confirm_cid_upload("h1", "c1").await.unwrap_err(),
            LedgerError::AlreadyExists("h1".into())
        );
        assert_eq!(ledger.len(), 1);

        ledger.delete_cid_record("h1").await.unwrap();
        assert_eq!(
            ledger.delete_cid_record("h1").await.unwrap_err(),
            LedgerError::NotFound("h1".into())
        );
        assert!(ledger.get_all_cid_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enumerates_in_key_order() {
        let ledger = MemoryLedger::new();
        ledger.put_raw(LedgerRecord::confirmed("b", "c2")).unwrap();
        ledger.put_raw(LedgerRecord::confirmed("a", "c1")).unwrap();

        let ids: Vec<String> = ledger
            .get_all_cid_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
