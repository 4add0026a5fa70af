use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Lifecycle state of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// The identity key is registered; content is not yet confirmed.
    Registered,
    /// The content id has been uploaded and confirmed.
    Confirmed,
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// One identity binding as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireRecord")]
pub struct LedgerRecord {
    /// Identity hash.
    pub id: String,

    /// Content id, present once confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    pub status: LedgerStatus,
}

impl LedgerRecord {
    pub fn registered(id: &str) -> Self {
        Self {
            id: id.to_string(),
            cid: None,
            status: LedgerStatus::Registered,
        }
    }

    pub fn confirmed(id: &str, cid: &str) -> Self {
        Self {
            id: id.to_string(),
            cid: Some(cid.to_string()),
            status: LedgerStatus::Confirmed,
        }
    }

    /// Returns the content id if the record is confirmed.
    pub fn confirmed_cid(&self) -> Option<&str> {
        match self.status {
            LedgerStatus::Confirmed => self.cid.as_deref().filter(|c| !c.is_empty()),
            LedgerStatus::Registered => None,
        }
    }
}

/// Contracts that only store confirmed bindings emit `{id, cid}` without a
/// status field.
#[derive(Deserialize)]
struct WireRecord {
    id: String,
    #[serde(default)]
    cid: Option<String>,
    #[serde(default)]
    status: Option<LedgerStatus>,
}

impl From<WireRecord> for LedgerRecord {
    fn from(w: WireRecord) -> Self {
        let cid = w.cid.filter(|c| !c.is_empty());
        let status = w.status.unwrap_or(if cid.is_some() {
            LedgerStatus::Confirmed
        } else {
            LedgerStatus::Registered
        });
        Self {
            id: w.id,
            cid,
            status,
        }
    }
}

/// Ledger is the function-style interface of the identity contract.
///
/// Conflicts are reported as [`LedgerError::AlreadyExists`] and
/// [`LedgerError::NotFound`]; callers decide whether they are benign.
/// Implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Register a pending identity key. `meta` is an opaque payload
    /// description forwarded to the contract.
    async fn register_hash(&self, key: &str, meta: &str) -> Result<(), LedgerError>;

    /// Return the content id of a confirmed record, `None` otherwise.
    async fn get_cid(&self, key: &str) -> Result<Option<String>, LedgerError>;

    /// Return the record for a key, `None` if absent.
    async fn read_record(&self, key: &str) -> Result<Option<LedgerRecord>, LedgerError>;

    /// Bind a content id to a key and mark the record confirmed.
    async fn confirm_cid_upload(&self, key: &str, cid: &str) -> Result<(), LedgerError>;

    /// Remove the record for a key.
    async fn delete_cid_record(&self, key: &str) -> Result<(), LedgerError>;

    /// Enumerate every record.
    async fn get_all_cid_records(&self) -> Result<Vec<LedgerRecord>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_contract_record_without_status() {
        let rec: LedgerRecord = serde_json::from_str(r#"{"id":"h1","cid":"bafy1"}"#).unwrap();
        assert_eq!(rec, LedgerRecord::confirmed("h1", "bafy1"));
        assert_eq!(rec.confirmed_cid(), Some("bafy1"));
    }

    #[test]
    fn decode_registered_record() {
        let rec: LedgerRecord =
            serde_json::from_str(r#"{"id":"h1","cid":"","status":"registered"}"#).unwrap();
        assert_eq!(rec, LedgerRecord::registered("h1"));
        assert_eq!(rec.confirmed_cid(), None);
    }

    #[test]
    fn encode_uses_lowercase_status() {
        let json = serde_json::to_string(&LedgerRecord::confirmed("h1", "c1")).unwrap();
        assert_eq!(json, r#"{"id":"h1","cid":"c1","status":"confirmed"}"#);
    }
}
