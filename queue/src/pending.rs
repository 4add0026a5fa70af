//! Pending Record Store: enrollment records waiting for ledger confirmation.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

use crate::db::{self, storage};
use crate::QueueResult;

const PENDING: TableDefinition<&str, &[u8]> = TableDefinition::new("pending");
const ARCHIVE: TableDefinition<&str, &[u8]> = TableDefinition::new("archive");
const FAILED: TableDefinition<&str, &[u8]> = TableDefinition::new("failed");
const FAILED_REASON: TableDefinition<&str, &str> = TableDefinition::new("failed_reason");
const PARSE_FAILURES: TableDefinition<&str, u32> = TableDefinition::new("parse_failures");
const ATTEMPTS: TableDefinition<&str, u32> = TableDefinition::new("attempts");

/// A dead-lettered entry together with the reason it was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEntry {
    pub key: String,
    pub reason: String,
    pub payload: Vec<u8>,
}

/// Keyed store of pending entries with archive and dead-letter views.
///
/// Values are opaque bytes; the caller owns the encoding. A key lives in at
/// most one of pending, archive and failed.
pub struct PendingStore {
    db: Database,
}

impl PendingStore {
    /// Open or create the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> QueueResult<Self> {
        let db = db::open(path, |tx| {
            db::ensure(tx, PENDING)?;
            db::ensure(tx, ARCHIVE)?;
            db::ensure(tx, FAILED)?;
            db::ensure(tx, FAILED_REASON)?;
            db::ensure(tx, PARSE_FAILURES)?;
            db::ensure(tx, ATTEMPTS)
        })?;
        Ok(Self { db })
    }

    /// Add an entry. Returns `false` without writing if the key is already
    /// known in any table.
    pub fn enqueue(&self, key: &str, value: &[u8]) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let inserted = {
            let mut pending = tx.open_table(PENDING).map_err(storage)?;
            let archive = tx.open_table(ARCHIVE).map_err(storage)?;
            let failed = tx.open_table(FAILED).map_err(storage)?;

            let known = pending.get(key).map_err(storage)?.is_some()
                || archive.get(key).map_err(storage)?.is_some()
                || failed.get(key).map_err(storage)?.is_some();
            if !known {
                pending.insert(key, value).map_err(storage)?;
            }
            !known
        };
        tx.commit().map_err(storage)?;
        Ok(inserted)
    }

    /// Start a new lifecycle for an archived key: the archived entry is
    /// dropped and `value` becomes pending, in one transaction. Returns
    /// `false` if the key is not archived.
    pub fn reenroll(&self, key: &str, value: &[u8]) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let moved = {
            let mut archive = tx.open_table(ARCHIVE).map_err(storage)?;
            let present = archive.remove(key).map_err(storage)?.is_some();
            if present {
                let mut pending = tx.open_table(PENDING).map_err(storage)?;
                pending.insert(key, value).map_err(storage)?;
                clear_counters(&tx, key)?;
            }
            present
        };
        tx.commit().map_err(storage)?;
        if moved {
            debug!(key, "pending: archived key re-enrolled");
        }
        Ok(moved)
    }

    /// Rewrite a pending entry in place. Returns `false` if the key is not
    /// pending.
    pub fn update(&self, key: &str, value: &[u8]) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let updated = {
            let mut pending = tx.open_table(PENDING).map_err(storage)?;
            let present = pending.get(key).map_err(storage)?.is_some();
            if present {
                pending.insert(key, value).map_err(storage)?;
            }
            present
        };
        tx.commit().map_err(storage)?;
        Ok(updated)
    }

    /// Get a pending entry.
    pub fn get(&self, key: &str) -> QueueResult<Option<Vec<u8>>> {
        self.read(PENDING, key)
    }

    /// Get an archived entry.
    pub fn archived(&self, key: &str) -> QueueResult<Option<Vec<u8>>> {
        self.read(ARCHIVE, key)
    }

    /// Snapshot of all pending entries, sorted by key.
    pub fn list_pending(&self) -> QueueResult<Vec<(String, Vec<u8>)>> {
        self.scan(PENDING)
    }

    /// Snapshot of all archived entries, sorted by key.
    pub fn list_archived(&self) -> QueueResult<Vec<(String, Vec<u8>)>> {
        self.scan(ARCHIVE)
    }

    pub fn pending_len(&self) -> QueueResult<usize> {
        Ok(self.scan(PENDING)?.len())
    }

    /// Move a pending entry to the archive. Returns `false` if the key was
    /// not pending.
    pub fn mark_processed(&self, key: &str) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let moved = {
            let mut pending = tx.open_table(PENDING).map_err(storage)?;
            let raw = pending
                .remove(key)
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            match raw {
                Some(raw) => {
                    let mut archive = tx.open_table(ARCHIVE).map_err(storage)?;
                    archive.insert(key, raw.as_slice()).map_err(storage)?;
                    clear_counters(&tx, key)?;
                    true
                }
                None => false,
            }
        };
        tx.commit().map_err(storage)?;
        Ok(moved)
    }

    /// Increment and return the parse-failure count for a key.
    pub fn record_parse_failure(&self, key: &str) -> QueueResult<u32> {
        self.bump(PARSE_FAILURES, key)
    }

    /// Increment and return the failed-attempt count for a key.
    pub fn record_attempt_failure(&self, key: &str) -> QueueResult<u32> {
        self.bump(ATTEMPTS, key)
    }

    /// Move a pending entry into the dead-letter set. Returns `false` if the
    /// key was not pending.
    pub fn quarantine(&self, key: &str, reason: &str) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let moved = {
            let mut pending = tx.open_table(PENDING).map_err(storage)?;
            let raw = pending
                .remove(key)
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            match raw {
                Some(raw) => {
                    let mut failed = tx.open_table(FAILED).map_err(storage)?;
                    failed.insert(key, raw.as_slice()).map_err(storage)?;
                    let mut reasons = tx.open_table(FAILED_REASON).map_err(storage)?;
                    reasons.insert(key, reason).map_err(storage)?;
                    clear_counters(&tx, key)?;
                    true
                }
                None => false,
            }
        };
        tx.commit().map_err(storage)?;
        if moved {
            warn!(key, reason, "pending: moved to failed");
        }
        Ok(moved)
    }

    /// All dead-lettered entries, sorted by key.
    pub fn list_failed(&self) -> QueueResult<Vec<FailedEntry>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let failed = tx.open_table(FAILED).map_err(storage)?;
        let reasons = tx.open_table(FAILED_REASON).map_err(storage)?;

        let mut out = Vec::new();
        for item in failed.iter().map_err(storage)? {
            let (k, v) = item.map_err(storage)?;
            let key = k.value().to_string();
            let reason = reasons
                .get(key.as_str())
                .map_err(storage)?
                .map(|g| g.value().to_string())
                .unwrap_or_default();
            out.push(FailedEntry {
                key,
                reason,
                payload: v.value().to_vec(),
            });
        }
        Ok(out)
    }

    /// Move a dead-lettered entry back to pending with fresh counters.
    /// Returns `false` if the key was not in the dead-letter set.
    pub fn requeue_failed(&self, key: &str) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let moved = {
            let mut failed = tx.open_table(FAILED).map_err(storage)?;
            let raw = failed
                .remove(key)
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            match raw {
                Some(raw) => {
                    let mut reasons = tx.open_table(FAILED_REASON).map_err(storage)?;
                    reasons.remove(key).map_err(storage)?;
                    let mut pending = tx.open_table(PENDING).map_err(storage)?;
                    pending.insert(key, raw.as_slice()).map_err(storage)?;
                    clear_counters(&tx, key)?;
                    true
                }
                None => false,
            }
        };
        tx.commit().map_err(storage)?;
        if moved {
            info!(key, "pending: requeued from failed");
        }
        Ok(moved)
    }

    fn read(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> QueueResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(def).map_err(storage)?;
        Ok(table
            .get(key)
            .map_err(storage)?
            .map(|g| g.value().to_vec()))
    }

    fn scan(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
    ) -> QueueResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(def).map_err(storage)?;

        let mut results = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (k, v) = item.map_err(storage)?;
            results.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(results)
    }

    fn bump(
        &self,
        def: TableDefinition<'static, &'static str, u32>,
        key: &str,
    ) -> QueueResult<u32> {
        let tx = self.db.begin_write().map_err(storage)?;
        let n = {
            let mut table = tx.open_table(def).map_err(storage)?;
            let n = table
                .get(key)
                .map_err(storage)?
                .map(|g| g.value())
                .unwrap_or(0)
                + 1;
            table.insert(key, n).map_err(storage)?;
            n
        };
        tx.commit().map_err(storage)?;
        Ok(n)
    }
}

fn clear_counters(tx: &redb::WriteTransaction, key: &str) -> QueueResult<()> {
    let mut parse = tx.open_table(PARSE_FAILURES).map_err(storage)?;
    parse.remove(key).map_err(storage)?;
    let mut attempts = tx.open_table(ATTEMPTS).map_err(storage)?;
    attempts.remove(key).map_err(storage)?;
    Ok(())
}
