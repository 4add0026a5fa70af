//! Registration Reconciler: drives pending records to ledger confirmation.

use std::sync::Arc;

use faceproof_cas::ContentStore;
use faceproof_ledger::{Ledger, LedgerError};
use faceproof_queue::PendingStore;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;
use crate::record::{BiometricRecord, RecordStatus};
use crate::retry::RetryPolicy;
use crate::worker::{Cycle, CycleReport};

/// Failure budgets of the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Decode failures tolerated before an entry is quarantined.
    pub max_parse_failures: u32,
    /// Failed cycles tolerated before an entry is dead-lettered. Cycles lost
    /// to an unreachable ledger or content store are not counted. `None` or
    /// zero retries forever.
    pub dead_letter_after: Option<u32>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_parse_failures: 3,
            dead_letter_after: Some(100),
        }
    }
}

enum Step {
    Confirmed,
    Recovered,
}

/// Uploads pending records and confirms them on the ledger.
///
/// Every step is idempotent: the ledger is asked first whether the key is
/// already confirmed, uploads are content addressed, and an "already
/// exists" confirmation counts as success. A record leaves the pending
/// store only after the ledger reports it confirmed.
pub struct RegistrationReconciler {
    ledger: Arc<dyn Ledger>,
    content: Arc<dyn ContentStore>,
    pending: Arc<PendingStore>,
    retry: RetryPolicy,
    cfg: ReconcileConfig,
}

impl RegistrationReconciler {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        content: Arc<dyn ContentStore>,
        pending: Arc<PendingStore>,
    ) -> Self {
        Self {
            ledger,
            content,
            pending,
            retry: RetryPolicy::default(),
            cfg: ReconcileConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_config(mut self, cfg: ReconcileConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// One pass over the pending store, in key order.
    ///
    /// Collaborator failures are counted in the report and never abort the
    /// pass; only a local storage failure does.
    pub async fn reconcile(&self) -> Result<CycleReport, CoreError> {
        let mut report = CycleReport::default();
        for (key, raw) in self.pending.list_pending()? {
            let record = match BiometricRecord::decode(&key, &raw) {
                Ok(r) => r,
                Err(e) => {
                    self.handle_corrupt(&key, &e, &mut report)?;
                    continue;
                }
            };
            match self.advance(record).await {
                Ok(Step::Confirmed) => report.completed += 1,
                Ok(Step::Recovered) => report.recovered += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "register: left pending");
                    report.retried += 1;
                    self.charge_attempt(&key, &e, &mut report)?;
                }
            }
        }
        Ok(report)
    }

    async fn advance(&self, mut record: BiometricRecord) -> Result<Step, CoreError> {
        let key = record.hash.clone();

        if let Some(cid) = self
            .retry
            .run("get_cid", &key, || self.ledger.get_cid(&key))
            .await?
        {
            info!(key = %key, cid = %cid, "register: already confirmed on ledger");
            self.pending.mark_processed(&key)?;
            return Ok(Step::Recovered);
        }

        let cid = match (record.status, record.cid.clone()) {
            (RecordStatus::Uploaded, Some(cid)) => cid,
            _ => {
                let payload = record.content_object().encode()?;
                let cid = self
                    .retry
                    .run("put", &key, || self.content.put(&payload))
                    .await?;
                record.mark_uploaded(&cid);
                self.pending.update(&key, &record.encode()?)?;
                debug!(key = %key, cid = %cid, "register: uploaded");
                cid
            }
        };

        match self
            .retry
            .run("confirm_cid_upload", &key, || {
                self.ledger.confirm_cid_upload(&key, &cid)
            })
            .await
        {
            Ok(()) => {}
            Err(LedgerError::AlreadyExists(_)) => {
                debug!(key = %key, "register: confirmation already recorded");
            }
            Err(e) => return Err(e.into()),
        }

        record.status = RecordStatus::Confirmed;
        self.pending.update(&key, &record.encode()?)?;
        self.pending.mark_processed(&key)?;
        info!(key = %key, cid = %cid, "register: confirmed");
        Ok(Step::Confirmed)
    }

    fn handle_corrupt(
        &self,
        key: &str,
        err: &CoreError,
        report: &mut CycleReport,
    ) -> Result<(), CoreError> {
        let failures = self.pending.record_parse_failure(key)?;
        if failures >= self.cfg.max_parse_failures.max(1) {
            self.pending
                .quarantine(key, &format!("undecodable after {failures} attempts: {err}"))?;
            error!(key = %key, error = %err, "register: quarantined corrupt entry");
            report.quarantined += 1;
        } else {
            warn!(key = %key, failures, error = %err, "register: cannot decode entry");
            report.retried += 1;
        }
        Ok(())
    }

    fn charge_attempt(
        &self,
        key: &str,
        err: &CoreError,
        report: &mut CycleReport,
    ) -> Result<(), CoreError> {
        // Outages say nothing about the record itself.
        if err.is_transient() {
            return Ok(());
        }
        let Some(limit) = self.cfg.dead_letter_after.filter(|n| *n > 0) else {
            return Ok(());
        };
        let attempts = self.pending.record_attempt_failure(key)?;
        if attempts >= limit {
            self.pending
                .quarantine(key, &format!("gave up after {attempts} cycles: {err}"))?;
            error!(key = %key, attempts, error = %err, "register: dead-lettered");
            report.dead_lettered += 1;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Cycle for RegistrationReconciler {
    fn name(&self) -> &str {
        "register"
    }

    async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        self.reconcile().await
    }
}
