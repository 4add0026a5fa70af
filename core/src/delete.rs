//! Deletion of identity bindings.
//!
//! Deletion removes the ledger record only. Content objects are immutable
//! and stay where they are.

use std::collections::HashSet;
use std::sync::Arc;

use faceproof_ledger::{Ledger, LedgerError};
use faceproof_queue::IntentQueue;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::retry::RetryPolicy;
use crate::worker::{Cycle, CycleReport};

/// Result of a synchronous delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteOutcome {
    Deleted,
    /// No record existed for the key.
    Absent,
}

/// Delete the ledger record for `key` right away.
pub async fn delete_now(
    ledger: &dyn Ledger,
    retry: &RetryPolicy,
    key: &str,
) -> Result<DeleteOutcome, CoreError> {
    if retry
        .run("read_record", key, || ledger.read_record(key))
        .await?
        .is_none()
    {
        debug!(key = %key, "delete: no record");
        return Ok(DeleteOutcome::Absent);
    }
    match retry
        .run("delete_cid_record", key, || ledger.delete_cid_record(key))
        .await
    {
        Ok(()) => {
            info!(key = %key, "delete: removed");
            Ok(DeleteOutcome::Deleted)
        }
        Err(LedgerError::NotFound(_)) => Ok(DeleteOutcome::Absent),
        Err(e) => Err(e.into()),
    }
}

/// A request to delete `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub target: String,
    /// Ledger id of the marker record that carried the request, if any.
    pub marker: Option<String>,
}

/// Where deletion intents come from.
#[async_trait::async_trait]
pub trait IntentSource: Send + Sync {
    fn name(&self) -> &str;

    /// Intents that are not resolved yet.
    async fn pending(&self, ledger: &dyn Ledger, retry: &RetryPolicy)
    -> Result<Vec<Intent>, CoreError>;

    /// Called once the target is gone from the ledger.
    async fn resolve(
        &self,
        ledger: &dyn Ledger,
        retry: &RetryPolicy,
        intent: &Intent,
    ) -> Result<(), CoreError>;
}

/// Intents from the local deletion intent queue.
pub struct QueuedIntents {
    queue: Arc<IntentQueue>,
}

impl QueuedIntents {
    pub fn new(queue: Arc<IntentQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait::async_trait]
impl IntentSource for QueuedIntents {
    fn name(&self) -> &str {
        "queue"
    }

    async fn pending(&self, _: &dyn Ledger, _: &RetryPolicy) -> Result<Vec<Intent>, CoreError> {
        Ok(self
            .queue
            .list()?
            .into_iter()
            .map(|target| Intent {
                target,
                marker: None,
            })
            .collect())
    }

    async fn resolve(&self, _: &dyn Ledger, _: &RetryPolicy, intent: &Intent) -> Result<(), CoreError> {
        self.queue.resolve(&intent.target)?;
        Ok(())
    }
}

/// Marker records on the ledger: an id `<target><suffix>` requests deletion
/// of `<target>`. The marker is deleted after its target.
pub struct MarkerIntents {
    suffix: String,
}

impl MarkerIntents {
    pub const DEFAULT_SUFFIX: &'static str = "_delete";

    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: if suffix.is_empty() {
                Self::DEFAULT_SUFFIX.to_string()
            } else {
                suffix.to_string()
            },
        }
    }

    fn target_of<'a>(&self, id: &'a str) -> Option<&'a str> {
        id.strip_suffix(self.suffix.as_str()).filter(|t| !t.is_empty())
    }
}

impl Default for MarkerIntents {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SUFFIX)
    }
}

#[async_trait::async_trait]
impl IntentSource for MarkerIntents {
    fn name(&self) -> &str {
        "markers"
    }

    async fn pending(&self, ledger: &dyn Ledger, retry: &RetryPolicy) -> Result<Vec<Intent>, CoreError> {
        let records = retry
            .run("get_all_cid_records", "*", || ledger.get_all_cid_records())
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                self.target_of(&r.id).map(|target| Intent {
                    target: target.to_string(),
                    marker: Some(r.id.clone()),
                })
            })
            .collect())
    }

    async fn resolve(
        &self,
        ledger: &dyn Ledger,
        retry: &RetryPolicy,
        intent: &Intent,
    ) -> Result<(), CoreError> {
        let Some(marker) = intent.marker.as_deref() else {
            return Ok(());
        };
        match retry
            .run("delete_cid_record", marker, || ledger.delete_cid_record(marker))
            .await
        {
            Ok(()) | Err(LedgerError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Executes deletion intents against the ledger.
pub struct DeletionReconciler {
    ledger: Arc<dyn Ledger>,
    source: Box<dyn IntentSource>,
    retry: RetryPolicy,
}

impl DeletionReconciler {
    pub fn new(ledger: Arc<dyn Ledger>, source: Box<dyn IntentSource>) -> Self {
        Self {
            ledger,
            source,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One pass over the outstanding intents. Each target is deleted at most
    /// once per pass; an absent record counts as deleted. Intents whose
    /// deletion fails stay outstanding.
    pub async fn reconcile(&self) -> Result<CycleReport, CoreError> {
        let ledger = self.ledger.as_ref();
        let intents = self.source.pending(ledger, &self.retry).await?;
        let mut report = CycleReport::default();
        let mut done: HashSet<String> = HashSet::new();

        for intent in intents {
            if !done.contains(&intent.target) {
                match self
                    .retry
                    .run("delete_cid_record", &intent.target, || {
                        ledger.delete_cid_record(&intent.target)
                    })
                    .await
                {
                    Ok(()) => info!(key = %intent.target, "delete: removed"),
                    Err(LedgerError::NotFound(_)) => {
                        debug!(key = %intent.target, "delete: already absent")
                    }
                    Err(e) => {
                        warn!(key = %intent.target, error = %e, "delete: will retry");
                        report.retried += 1;
                        continue;
                    }
                }
                done.insert(intent.target.clone());
                report.completed += 1;
            }

            if let Err(e) = self.source.resolve(ledger, &self.retry, &intent).await {
                warn!(key = %intent.target, error = %e, "delete: cannot resolve intent");
                report.retried += 1;
            }
        }
        Ok(report)
    }
}

#[async_trait::async_trait]
impl Cycle for DeletionReconciler {
    fn name(&self) -> &str {
        match self.source.name() {
            "markers" => "delete-markers",
            _ => "delete",
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        self.reconcile().await
    }
}

#[cfg(test)]
mod tests {
    use faceproof_ledger::{LedgerRecord, MemoryLedger};
    use tempfile::tempdir;

    use super::*;
    use crate::testing::FlakyLedger;

    async fn confirmed(ledger: &MemoryLedger, key: &str) {
        ledger.register_hash(key, "{}").await.unwrap();
        ledger.confirm_cid_upload(key, "bafy").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_now_is_idempotent() {
        let ledger = MemoryLedger::new();
        confirmed(&ledger, "h1").await;
        let retry = RetryPolicy::none();
        assert_eq!(delete_now(&ledger, &retry, "h1").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(delete_now(&ledger, &retry, "h1").await.unwrap(), DeleteOutcome::Absent);
        assert!(ledger.read_record("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queued_intents() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(IntentQueue::open(dir.path().join("i.redb")).unwrap());
        let ledger = FlakyLedger::new(MemoryLedger::new());
        confirmed(ledger.inner(), "h1").await;
        queue.request("h1").unwrap();
        queue.request("missing").unwrap();

        let rec = DeletionReconciler::new(
            Arc::new(ledger.clone()),
            Box::new(QueuedIntents::new(queue.clone())),
        )
        .with_retry(RetryPolicy::none());

        ledger.set_failing(true);
        let report = rec.reconcile().await.unwrap();
        assert_eq!(report.retried, 2);
        assert_eq!(queue.list().unwrap().len(), 2);

        ledger.set_failing(false);
        let report = rec.reconcile().await.unwrap();
        assert_eq!(report.completed, 2);
        assert!(queue.list().unwrap().is_empty());
        assert!(ledger.read_record("h1").await.unwrap().is_none());
        assert!(rec.reconcile().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_marker_intents() {
        let ledger = MemoryLedger::new();
        confirmed(&ledger, "h1").await;
        confirmed(&ledger, "h2").await;
        ledger
            .put_raw(LedgerRecord::confirmed("h1_delete", "marker"))
            .unwrap();
        ledger
            .put_raw(LedgerRecord::confirmed("_delete", "not-a-marker"))
            .unwrap();

        let rec = DeletionReconciler::new(Arc::new(ledger.clone()), Box::new(MarkerIntents::default()))
            .with_retry(RetryPolicy::none());
        assert_eq!(rec.name(), "delete-markers");
        let report = rec.reconcile().await.unwrap();
        assert_eq!(report.completed, 1);

        let ids: Vec<String> = ledger
            .get_all_cid_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["_delete".to_string(), "h2".to_string()]);
        assert!(rec.reconcile().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_marker_for_absent_target_is_cleared() {
        let ledger = MemoryLedger::new();
        ledger
            .put_raw(LedgerRecord::confirmed("gone_delete", "marker"))
            .unwrap();
        let rec = DeletionReconciler::new(Arc::new(ledger.clone()), Box::new(MarkerIntents::default()));
        assert_eq!(rec.reconcile().await.unwrap().completed, 1);
        assert!(ledger.is_empty());
    }
}
