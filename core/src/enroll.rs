//! Enrollment: register a vector's identity key on the ledger and queue the
//! record for upload and confirmation.

use std::sync::Arc;

use faceproof_ledger::{Ledger, LedgerError, LedgerStatus};
use faceproof_queue::PendingStore;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::matcher::MatchingEngine;
use crate::record::BiometricRecord;
use crate::retry::RetryPolicy;

/// Result of an enrollment attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrollOutcome {
    /// Registered and queued for confirmation.
    Enrolled { hash: String },
    /// The key is already confirmed on the ledger.
    Duplicate { hash: String, cid: String },
    /// The key is registered and already queued locally.
    InProgress { hash: String },
    /// A different confirmed identity is within the match threshold.
    SimilarExists {
        hash: String,
        matched: String,
        similarity: f32,
    },
}

impl EnrollOutcome {
    pub fn hash(&self) -> &str {
        match self {
            Self::Enrolled { hash }
            | Self::Duplicate { hash, .. }
            | Self::InProgress { hash }
            | Self::SimilarExists { hash, .. } => hash,
        }
    }
}

pub struct Enroller {
    ledger: Arc<dyn Ledger>,
    pending: Arc<PendingStore>,
    retry: RetryPolicy,
    dimension: usize,
    normalize: bool,
}

impl Enroller {
    pub fn new(ledger: Arc<dyn Ledger>, pending: Arc<PendingStore>, dimension: usize) -> Self {
        Self {
            ledger,
            pending,
            retry: RetryPolicy::default(),
            dimension,
            normalize: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// L2-normalize vectors before hashing.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn prepare(&self, mut vector: Vec<f32>) -> Result<Vec<f32>, CoreError> {
        if vector.len() != self.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        if self.normalize {
            faceproof_vecstore::l2_normalize(&mut vector);
        }
        Ok(vector)
    }

    /// Enroll a vector.
    ///
    /// The ledger registration comes first; the local record is written
    /// only once the ledger has accepted the key, or already holds it
    /// unconfirmed (a previous attempt stopped in between).
    pub async fn enroll(
        &self,
        vector: Vec<f32>,
        label: Option<String>,
    ) -> Result<EnrollOutcome, CoreError> {
        let record = BiometricRecord::new(self.prepare(vector)?, label)?;
        self.enroll_record(record).await
    }

    /// Like [`enroll`](Self::enroll), but refuses vectors that already match
    /// a confirmed identity under `matcher`'s threshold.
    pub async fn enroll_checked(
        &self,
        matcher: &MatchingEngine,
        vector: Vec<f32>,
        label: Option<String>,
    ) -> Result<EnrollOutcome, CoreError> {
        let record = BiometricRecord::new(self.prepare(vector)?, label)?;
        let snapshot = matcher.snapshot().await?;
        if let Some((matched, similarity)) = matcher.score(&snapshot, &record.vector)? {
            if matched != record.hash && similarity >= matcher.config().threshold {
                info!(key = %record.hash, matched = %matched, similarity, "enroll: similar identity exists");
                return Ok(EnrollOutcome::SimilarExists {
                    hash: record.hash,
                    matched,
                    similarity,
                });
            }
        }
        self.enroll_record(record).await
    }

    async fn enroll_record(&self, record: BiometricRecord) -> Result<EnrollOutcome, CoreError> {
        let key = record.hash.clone();

        if let Some(cid) = self
            .retry
            .run("get_cid", &key, || self.ledger.get_cid(&key))
            .await?
        {
            info!(key = %key, cid = %cid, "enroll: duplicate");
            return Ok(EnrollOutcome::Duplicate { hash: key, cid });
        }

        let meta = json!({
            "dim": record.vector.len(),
            "label": record.label,
            "timestamp": record.created_at,
        })
        .to_string();
        match self
            .retry
            .run("register_hash", &key, || self.ledger.register_hash(&key, &meta))
            .await
        {
            Ok(()) => debug!(key = %key, "enroll: registered"),
            Err(LedgerError::AlreadyExists(_)) => {
                let existing = self
                    .retry
                    .run("read_record", &key, || self.ledger.read_record(&key))
                    .await?;
                if let Some(existing) = existing.filter(|r| r.status == LedgerStatus::Confirmed) {
                    return Ok(EnrollOutcome::Duplicate {
                        hash: key,
                        cid: existing.cid.unwrap_or_default(),
                    });
                }
                debug!(key = %key, "enroll: resuming earlier registration");
            }
            Err(e) => return Err(e.into()),
        }

        let bytes = record.encode()?;
        if self.pending.enqueue(&key, &bytes)? {
            info!(key = %key, "enroll: queued");
            return Ok(EnrollOutcome::Enrolled { hash: key });
        }
        if self.pending.reenroll(&key, &bytes)? {
            info!(key = %key, "enroll: re-enrolled after deletion");
            return Ok(EnrollOutcome::Enrolled { hash: key });
        }
        debug!(key = %key, "enroll: already queued");
        Ok(EnrollOutcome::InProgress { hash: key })
    }
}
