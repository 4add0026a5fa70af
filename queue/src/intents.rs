//! Deletion Intent Queue: identity keys an operator asked to remove.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::db::{self, storage};
use crate::QueueResult;

const INTENTS: TableDefinition<&str, &str> = TableDefinition::new("intents");
const RESOLVED: TableDefinition<&str, &str> = TableDefinition::new("resolved");

/// Keyed set of deletion intents. Values are RFC 3339 timestamps of when the
/// intent was requested or resolved.
pub struct IntentQueue {
    db: Database,
}

impl IntentQueue {
    /// Open or create the queue at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> QueueResult<Self> {
        let db = db::open(path, |tx| {
            db::ensure(tx, INTENTS)?;
            db::ensure(tx, RESOLVED)
        })?;
        Ok(Self { db })
    }

    /// Record an intent. Returns `false` if the key is already queued.
    /// A key resolved earlier can be requested again.
    pub fn request(&self, key: &str) -> QueueResult<bool> {
        let now = Utc::now().to_rfc3339();
        let tx = self.db.begin_write().map_err(storage)?;
        let inserted = {
            let mut intents = tx.open_table(INTENTS).map_err(storage)?;
            let known = intents.get(key).map_err(storage)?.is_some();
            if !known {
                intents.insert(key, now.as_str()).map_err(storage)?;
            }
            !known
        };
        tx.commit().map_err(storage)?;
        Ok(inserted)
    }

    /// Outstanding intents sorted by key.
    pub fn list(&self) -> QueueResult<Vec<String>> {
        self.keys(INTENTS)
    }

    /// Keys whose deletion has been carried out.
    pub fn list_resolved(&self) -> QueueResult<Vec<String>> {
        self.keys(RESOLVED)
    }

    /// Move an intent to the resolved set. Returns `false` if it was not
    /// outstanding.
    pub fn resolve(&self, key: &str) -> QueueResult<bool> {
        let now = Utc::now().to_rfc3339();
        let tx = self.db.begin_write().map_err(storage)?;
        let moved = {
            let mut intents = tx.open_table(INTENTS).map_err(storage)?;
            let present = intents.remove(key).map_err(storage)?.is_some();
            if present {
                let mut resolved = tx.open_table(RESOLVED).map_err(storage)?;
                resolved.insert(key, now.as_str()).map_err(storage)?;
            }
            present
        };
        tx.commit().map_err(storage)?;
        Ok(moved)
    }

    fn keys(
        &self,
        def: TableDefinition<'static, &'static str, &'static str>,
    ) -> QueueResult<Vec<String>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(def).map_err(storage)?;

        let mut out = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (k, _) = item.map_err(storage)?;
            out.push(k.value().to_string());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_request_resolve_cycle() {
        let dir = tempdir().unwrap();
        let q = IntentQueue::open(dir.path().join("intents.redb")).unwrap();

        assert!(q.request("h1").unwrap());
        assert!(!q.request("h1").unwrap());
        assert!(q.request("h2").unwrap());
        assert_eq!(q.list().unwrap(), vec!["h1".to_string(), "h2".to_string()]);

        assert!(q.resolve("h1").unwrap());
        assert!(!q.resolve("h1").unwrap());
        assert_eq!(q.list().unwrap(), vec!["h2".to_string()]);
        assert_eq!(q.list_resolved().unwrap(), vec!["h1".to_string()]);

        // A resolved key may be requested again.
        assert!(q.request("h1").unwrap());
    }
}
