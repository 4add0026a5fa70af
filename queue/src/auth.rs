//! Auth Request Queue: captured vectors waiting for a matching pass.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::db::{self, storage};
use crate::{QueueError, QueueResult};

const REQUESTS: TableDefinition<u64, &[u8]> = TableDefinition::new("requests");
const DECISIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("decisions");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_REQUEST: &str = "next_request";
const NEXT_DECISION: &str = "next_decision";

/// A captured face vector waiting to be authenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Identity hash of the captured vector.
    pub hash: String,
    pub vector: Vec<f32>,
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,
}

/// A request as stored, before decoding.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl QueuedRequest {
    pub fn decode(&self) -> QueueResult<AuthRequest> {
        serde_json::from_slice(&self.payload).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

/// An entry of the append-only decision log.
#[derive(Debug, Clone)]
pub struct StoredDecision {
    pub seq: u64,
    pub request_seq: u64,
    pub payload: Vec<u8>,
}

/// FIFO of authentication requests plus the log of emitted decisions.
///
/// A request leaves the queue only through [`AuthQueue::complete`], which
/// appends its decision in the same transaction.
pub struct AuthQueue {
    db: Database,
}

impl AuthQueue {
    /// Open or create the queue at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> QueueResult<Self> {
        let db = db::open(path, |tx| {
            db::ensure(tx, REQUESTS)?;
            db::ensure(tx, DECISIONS)?;
            db::ensure(tx, META)
        })?;
        Ok(Self { db })
    }

    /// Append a request and return its sequence number.
    pub fn enqueue(&self, request: &AuthRequest) -> QueueResult<u64> {
        let payload =
            serde_json::to_vec(request).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let tx = self.db.begin_write().map_err(storage)?;
        let seq = {
            let seq = next_seq(&tx, NEXT_REQUEST)?;
            let mut requests = tx.open_table(REQUESTS).map_err(storage)?;
            requests.insert(seq, payload.as_slice()).map_err(storage)?;
            seq
        };
        tx.commit().map_err(storage)?;
        Ok(seq)
    }

    /// Snapshot of outstanding requests in enqueue order.
    pub fn list(&self) -> QueueResult<Vec<QueuedRequest>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let requests = tx.open_table(REQUESTS).map_err(storage)?;

        let mut out = Vec::new();
        for item in requests.iter().map_err(storage)? {
            let (k, v) = item.map_err(storage)?;
            out.push(QueuedRequest {
                seq: k.value(),
                payload: v.value().to_vec(),
            });
        }
        Ok(out)
    }

    pub fn len(&self) -> QueueResult<usize> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Record the decision for a request and remove the request.
    ///
    /// Returns `false` and records nothing if the request is no longer
    /// queued, so a request never gets two decisions.
    pub fn complete(&self, seq: u64, decision: &[u8]) -> QueueResult<bool> {
        let tx = self.db.begin_write().map_err(storage)?;
        let done = {
            let mut requests = tx.open_table(REQUESTS).map_err(storage)?;
            let present = requests.remove(seq).map_err(storage)?.is_some();
            if present {
                let dseq = next_seq(&tx, NEXT_DECISION)?;
                let mut decisions = tx.open_table(DECISIONS).map_err(storage)?;
                let mut entry = Vec::with_capacity(8 + decision.len());
                entry.extend_from_slice(&seq.to_be_bytes());
                entry.extend_from_slice(decision);
                decisions.insert(dseq, entry.as_slice()).map_err(storage)?;
            }
            present
        };
        tx.commit().map_err(storage)?;
        Ok(done)
    }

    /// The decision log in emission order.
    pub fn decisions(&self) -> QueueResult<Vec<StoredDecision>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let decisions = tx.open_table(DECISIONS).map_err(storage)?;

        let mut out = Vec::new();
        for item in decisions.iter().map_err(storage)? {
            let (k, v) = item.map_err(storage)?;
            let raw = v.value();
            if raw.len() < 8 {
                return Err(QueueError::Serialization(format!(
                    "decision {} is truncated",
                    k.value()
                )));
            }
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&raw[..8]);
            out.push(StoredDecision {
                seq: k.value(),
                request_seq: u64::from_be_bytes(prefix),
                payload: raw[8..].to_vec(),
            });
        }
        Ok(out)
    }
}

fn next_seq(tx: &redb::WriteTransaction, counter: &str) -> QueueResult<u64> {
    let mut meta = tx.open_table(META).map_err(storage)?;
    let seq = meta
        .get(counter)
        .map_err(storage)?
        .map(|g| g.value())
        .unwrap_or(0)
        + 1;
    meta.insert(counter, seq).map_err(storage)?;
    Ok(seq)
}
