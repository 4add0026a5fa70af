//! Enrollment, reconciliation and matching for ledger-anchored face
//! identities.
//!
//! A face vector is keyed by its [`identity_hash`], registered on the
//! [`Ledger`](faceproof_ledger::Ledger), queued locally, uploaded to a
//! [`ContentStore`](faceproof_cas::ContentStore) and finally confirmed on the
//! ledger by the [`RegistrationReconciler`]. The [`MatchingEngine`] answers
//! authentication requests against the confirmed reference set and the
//! [`DeletionReconciler`] removes bindings on request.
//!
//! Every pipeline stage is a [`Cycle`] driven by a [`Trigger`] through
//! [`run_worker`].

pub mod calibrate;
pub mod delete;
pub mod enroll;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod record;
pub mod register;
pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;

pub use calibrate::{CalibrationReport, Confusion, LabeledVector, calibrate, load_corpus};
pub use delete::{
    DeleteOutcome, DeletionReconciler, Intent, IntentSource, MarkerIntents, QueuedIntents,
    delete_now,
};
pub use enroll::{EnrollOutcome, Enroller};
pub use error::CoreError;
pub use identity::identity_hash;
pub use matcher::{MatchConfig, MatchLoop, MatchingEngine, Snapshot, submit_auth_request};
pub use record::{AuthDecision, BiometricRecord, ContentObject, Outcome, RecordStatus};
pub use register::{ReconcileConfig, RegistrationReconciler};
pub use retry::{RetryPolicy, Retryable};
pub use worker::{Cycle, CycleReport, NotifyTrigger, PollTrigger, Trigger, run_worker};

pub use faceproof_vecstore::l2_normalize;
