use std::path::Path;

use redb::Database;

use crate::{QueueError, QueueResult};

pub(crate) fn storage<E: std::fmt::Display>(e: E) -> QueueError {
    QueueError::Storage(e.to_string())
}

/// Open or create a redb file and make sure every table exists, so that
/// read transactions never see a missing table.
pub(crate) fn open<P, F>(path: P, create_tables: F) -> QueueResult<Database>
where
    P: AsRef<Path>,
    F: FnOnce(&redb::WriteTransaction) -> Result<(), redb::TableError>,
{
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(storage)?;
        }
    }
    let db = Database::create(path).map_err(storage)?;
    let tx = db.begin_write().map_err(storage)?;
    create_tables(&tx).map_err(storage)?;
    tx.commit().map_err(storage)?;
    Ok(db)
}

/// Touch a table inside a write transaction so it gets created.
pub(crate) fn ensure<K, V>(
    tx: &redb::WriteTransaction,
    def: redb::TableDefinition<K, V>,
) -> Result<(), redb::TableError>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    tx.open_table(def).map(|_| ())
}
