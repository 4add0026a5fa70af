//! Matching Engine: authenticates captured vectors against the confirmed
//! reference set.
//!
//! Each cycle builds a fresh [`Snapshot`] from the ledger and content store,
//! scores every queued request against it, and completes each request with
//! its decision in one queue transaction.

use std::sync::Arc;

use chrono::Utc;
use faceproof_cas::ContentStore;
use faceproof_ledger::Ledger;
use faceproof_queue::{AuthQueue, AuthRequest};
use faceproof_vecstore::{FlatIndex, VecIndex, l2_normalize, similarity};
use tracing::{debug, error, info, warn};

use crate::error::CoreError;
use crate::identity::identity_hash;
use crate::record::{AuthDecision, ContentObject, Outcome};
use crate::retry::RetryPolicy;
use crate::worker::{Cycle, CycleReport};

/// Matching parameters.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Minimum similarity, inclusive, for a match.
    pub threshold: f32,
    pub dimension: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            dimension: faceproof_embed::FACE_DIM,
        }
    }
}

/// The reference set of one cycle.
pub struct Snapshot {
    index: FlatIndex,
    skipped: usize,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Confirmed records left out because their payload was unusable.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn ids(&self) -> &[String] {
        self.index.ids()
    }
}

/// Round to 4 decimal places.
fn round4(x: f32) -> f32 {
    ((x as f64 * 10_000.0).round() / 10_000.0) as f32
}

pub struct MatchingEngine {
    ledger: Arc<dyn Ledger>,
    content: Arc<dyn ContentStore>,
    cfg: MatchConfig,
    retry: RetryPolicy,
}

impl MatchingEngine {
    pub fn new(ledger: Arc<dyn Ledger>, content: Arc<dyn ContentStore>, cfg: MatchConfig) -> Self {
        Self {
            ledger,
            content,
            cfg,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    /// Build the reference index from confirmed ledger records.
    ///
    /// Fails if the ledger cannot be enumerated or any confirmed payload is
    /// temporarily unreachable. Payloads that are missing or malformed are
    /// skipped and counted.
    pub async fn snapshot(&self) -> Result<Snapshot, CoreError> {
        let records = self
            .retry
            .run("get_all_cid_records", "*", || self.ledger.get_all_cid_records())
            .await?;
        let mut index = FlatIndex::with_capacity(self.cfg.dimension, records.len())?;
        let mut skipped = 0;
        for record in &records {
            let Some(cid) = record.confirmed_cid() else {
                continue;
            };
            let inserted = match self.load_vector(&record.id, cid).await {
                Ok(v) => index.insert(&record.id, &v).map_err(CoreError::from),
                Err(e) => Err(e),
            };
            match inserted {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!(key = %record.id, cid = %cid, error = %e, "match: reference unreachable, pass postponed");
                    return Err(e);
                }
                Err(e) => {
                    error!(key = %record.id, cid = %cid, error = %e, "match: unusable reference skipped");
                    skipped += 1;
                }
            }
        }
        debug!(references = index.len(), skipped, "match: snapshot built");
        Ok(Snapshot { index, skipped })
    }

    async fn load_vector(&self, key: &str, cid: &str) -> Result<Vec<f32>, CoreError> {
        let bytes = self
            .retry
            .run("get", key, || self.content.get(cid))
            .await?;
        let object = ContentObject::decode(&bytes)?;
        if object.vector.len() != self.cfg.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.cfg.dimension,
                got: object.vector.len(),
            });
        }
        Ok(object.vector)
    }

    /// Decide one request.
    pub fn decide(&self, snapshot: &Snapshot, request: &AuthRequest) -> AuthDecision {
        let outcome = self.score(snapshot, &request.vector);
        let (outcome, similarity) = match outcome {
            Ok(Some((id, sim))) if sim >= self.cfg.threshold => (Outcome::Match { id }, Some(sim)),
            Ok(Some((_, sim))) => (Outcome::NoMatch, Some(sim)),
            Ok(None) => (Outcome::NoMatch, None),
            Err(e) => (Outcome::Invalid { reason: e.to_string() }, None),
        };
        AuthDecision {
            request_hash: request.hash.clone(),
            outcome,
            similarity,
            captured_at: Some(request.captured_at),
            decided_at: Utc::now(),
        }
    }

    /// Nearest reference and its rounded similarity, or `None` for an empty
    /// reference set.
    pub fn score(&self, snapshot: &Snapshot, vector: &[f32]) -> Result<Option<(String, f32)>, CoreError> {
        if vector.len() != self.cfg.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.cfg.dimension,
                got: vector.len(),
            });
        }
        if snapshot.is_empty() {
            return Ok(None);
        }
        Ok(snapshot
            .index
            .nearest(vector)?
            .map(|m| (m.id, round4(similarity(m.distance)))))
    }

    /// Decide a batch of requests against one snapshot.
    pub fn authenticate(&self, snapshot: &Snapshot, requests: &[AuthRequest]) -> Vec<AuthDecision> {
        requests.iter().map(|r| self.decide(snapshot, r)).collect()
    }

    /// Drain the queue once.
    ///
    /// Nothing is consumed if the reference set cannot be loaded. Requests
    /// that cannot be decoded are completed with an `Invalid` decision so
    /// they do not block the queue.
    pub async fn run_cycle(&self, queue: &AuthQueue) -> Result<CycleReport, CoreError> {
        let queued = queue.list()?;
        let mut report = CycleReport::default();
        if queued.is_empty() {
            return Ok(report);
        }
        let snapshot = self.snapshot().await?;
        if snapshot.is_empty() {
            warn!("match: reference set is empty, every request will be rejected");
        }

        for entry in queued {
            let decision = match entry.decode() {
                Ok(request) => self.decide(&snapshot, &request),
                Err(e) => {
                    warn!(seq = entry.seq, error = %e, "match: undecodable request");
                    AuthDecision {
                        request_hash: String::new(),
                        outcome: Outcome::Invalid { reason: e.to_string() },
                        similarity: None,
                        captured_at: None,
                        decided_at: Utc::now(),
                    }
                }
            };
            match &decision.outcome {
                Outcome::Match { id } => {
                    info!(seq = entry.seq, request = %decision.request_hash, matched = %id, similarity = ?decision.similarity, "match: MATCH");
                    report.matched += 1;
                }
                Outcome::NoMatch => {
                    info!(seq = entry.seq, request = %decision.request_hash, similarity = ?decision.similarity, "match: NO_MATCH");
                }
                Outcome::Invalid { reason } => {
                    warn!(seq = entry.seq, request = %decision.request_hash, reason = %reason, "match: INVALID");
                }
            }
            if queue.complete(entry.seq, &decision.encode()?)? {
                report.completed += 1;
            }
        }
        Ok(report)
    }
}

/// Queue a captured vector for the next matching pass. Returns the request
/// sequence number.
pub fn submit_auth_request(queue: &AuthQueue, mut vector: Vec<f32>, normalize: bool) -> Result<u64, CoreError> {
    if normalize {
        l2_normalize(&mut vector);
    }
    let request = AuthRequest {
        hash: identity_hash(&vector, None)?,
        vector,
        captured_at: Utc::now(),
    };
    Ok(queue.enqueue(&request)?)
}

/// Binds a [`MatchingEngine`] to its queue as a worker [`Cycle`].
pub struct MatchLoop {
    engine: Arc<MatchingEngine>,
    queue: Arc<AuthQueue>,
}

impl MatchLoop {
    pub fn new(engine: Arc<MatchingEngine>, queue: Arc<AuthQueue>) -> Self {
        Self { engine, queue }
    }
}

#[async_trait::async_trait]
impl Cycle for MatchLoop {
    fn name(&self) -> &str {
        "match"
    }

    async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        self.engine.run_cycle(&self.queue).await
    }
}
