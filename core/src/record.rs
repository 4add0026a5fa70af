//! Records that move through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::identity::identity_hash;

/// Local lifecycle of an enrolled vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Registered on the ledger, content not yet uploaded.
    Pending,
    /// Content uploaded and its cid recorded; ledger confirmation pending.
    Uploaded,
    /// Confirmed on the ledger.
    Confirmed,
}

fn default_status() -> RecordStatus {
    RecordStatus::Pending
}

/// An enrolled face vector as held in the pending store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricRecord {
    /// Identity key, see [`identity_hash`].
    pub hash: String,

    pub vector: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "label_compat")]
    pub label: Option<String>,

    /// Content id, set once uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    #[serde(default = "default_status")]
    pub status: RecordStatus,

    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl BiometricRecord {
    /// Build a pending record, deriving its identity key.
    pub fn new(vector: Vec<f32>, label: Option<String>) -> Result<Self, CoreError> {
        let hash = identity_hash(&vector, label.as_deref())?;
        Ok(Self {
            hash,
            vector,
            label,
            cid: None,
            status: RecordStatus::Pending,
            created_at: Utc::now(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored entry and check it belongs to `key`.
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self, CoreError> {
        let record: Self = serde_json::from_slice(bytes).map_err(|e| CoreError::InvalidRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if record.hash != key {
            return Err(CoreError::InvalidRecord {
                key: key.to_string(),
                reason: format!("stored under {key} but carries hash {}", record.hash),
            });
        }
        if record.vector.is_empty() {
            return Err(CoreError::InvalidRecord {
                key: key.to_string(),
                reason: "empty vector".into(),
            });
        }
        Ok(record)
    }

    /// The payload uploaded to the content store.
    pub fn content_object(&self) -> ContentObject {
        ContentObject {
            vector: self.vector.clone(),
            label: self.label.clone(),
        }
    }

    pub fn mark_uploaded(&mut self, cid: &str) {
        self.cid = Some(cid.to_string());
        self.status = RecordStatus::Uploaded;
    }
}

/// The immutable payload kept in the content store.
///
/// Serialization is deterministic: fixed field order, label omitted when
/// absent, so one record always yields one content id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentObject {
    pub vector: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentDoc {
    Bare(Vec<f32>),
    Wrapped {
        vector: Vec<f32>,
        #[serde(default, deserialize_with = "label_compat")]
        label: Option<String>,
    },
}

impl ContentObject {
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode `{"vector": [...], "label": ...}` or a bare float array.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let doc: ContentDoc = serde_json::from_slice(bytes)?;
        Ok(match doc {
            ContentDoc::Bare(vector) => Self {
                vector,
                label: None,
            },
            ContentDoc::Wrapped { vector, label } => Self { vector, label },
        })
    }
}

/// Labels written by batch loaders may be numeric class ids.
fn label_compat<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Label>::deserialize(deserializer)?.map(|l| match l {
        Label::Text(s) => s,
        Label::Number(n) => n.to_string(),
    }))
}

/// Result of matching one authentication request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Match { id: String },
    NoMatch,
    /// The request could not be evaluated.
    Invalid { reason: String },
}

/// A decision appended to the decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthDecision {
    pub request_hash: String,
    pub outcome: Outcome,
    /// Similarity to the nearest reference, rounded to 4 decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    pub decided_at: DateTime<Utc>,
}

impl AuthDecision {
    pub fn is_match(&self) -> bool {
        matches!(self.outcome, Outcome::Match { .. })
    }

    pub fn matched_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Match { id } => Some(id),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
