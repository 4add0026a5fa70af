use std::sync::Arc;
use std::time::Duration;

use faceproof_cas::{ContentStore, MemoryContentStore};
use faceproof_core::testing::{FlakyContentStore, FlakyLedger};
use faceproof_core::{
    AuthDecision, BiometricRecord, DeleteOutcome, DeletionReconciler, EnrollOutcome, Enroller,
    MatchConfig, MatchLoop, MatchingEngine, NotifyTrigger, Outcome, QueuedIntents, ReconcileConfig,
    RecordStatus, RegistrationReconciler, RetryPolicy, delete_now, identity_hash, run_worker,
    submit_auth_request,
};
use faceproof_embed::{Extractor, FACE_DIM, JsonVectorExtractor};
use faceproof_ledger::{Ledger, LedgerStatus, MemoryLedger};
use faceproof_queue::{AuthQueue, IntentQueue, PendingStore};
use tempfile::tempdir;

fn face(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; FACE_DIM];
    v[seed % FACE_DIM] = 1.0;
    v
}

fn near(v: &[f32]) -> Vec<f32> {
    // Rotate a little towards the next axis; similarity stays above 0.99.
    let i = v.iter().position(|x| *x == 1.0).unwrap_or(0);
    let mut out = vec![0.0f32; v.len()];
    out[i] = 0.995;
    out[(i + 1) % v.len()] = 0.0998;
    out
}

fn decisions(queue: &AuthQueue) -> Vec<AuthDecision> {
    queue
        .decisions()
        .unwrap()
        .iter()
        .map(|d| AuthDecision::decode(&d.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn enroll_confirm_authenticate_delete() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::new();
    let content = MemoryContentStore::new();
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());
    let auth = Arc::new(AuthQueue::open(dir.path().join("auth.redb")).unwrap());
    let intents = Arc::new(IntentQueue::open(dir.path().join("intents.redb")).unwrap());

    let extractor = JsonVectorExtractor::new(FACE_DIM);
    let body = serde_json::to_vec(&serde_json::json!({ "vector": face(3) })).unwrap();
    let vector = extractor.extract(&body).await.unwrap();

    let enroller = Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM);
    let out = enroller.enroll(vector.clone(), Some("alice".into())).await.unwrap();
    let key = out.hash().to_string();
    assert_eq!(key, identity_hash(&vector, Some("alice")).unwrap());

    let reconciler = RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending.clone(),
    );
    assert_eq!(reconciler.reconcile().await.unwrap().completed, 1);
    assert_eq!(
        ledger.read_record(&key).await.unwrap().unwrap().status,
        LedgerStatus::Confirmed
    );

    let engine = MatchingEngine::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        MatchConfig::default(),
    );
    submit_auth_request(&auth, near(&face(3)), false).unwrap();
    submit_auth_request(&auth, face(40), false).unwrap();
    let report = engine.run_cycle(&auth).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.matched, 1);

    let log = decisions(&auth);
    assert_eq!(log[0].matched_id(), Some(key.as_str()));
    assert!(log[0].similarity.unwrap() >= 0.95);
    assert_eq!(log[1].outcome, Outcome::NoMatch);

    intents.request(&key).unwrap();
    let deleter = DeletionReconciler::new(
        Arc::new(ledger.clone()),
        Box::new(QueuedIntents::new(intents.clone())),
    );
    assert_eq!(deleter.reconcile().await.unwrap().completed, 1);
    assert!(ledger.read_record(&key).await.unwrap().is_none());

    // The content object outlives the ledger binding.
    assert_eq!(content.len(), 1);

    submit_auth_request(&auth, near(&face(3)), false).unwrap();
    engine.run_cycle(&auth).await.unwrap();
    assert_eq!(decisions(&auth)[2].outcome, Outcome::NoMatch);
}

#[tokio::test]
async fn duplicate_enrollment_creates_one_binding() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::new();
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());
    let enroller = Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM);

    for _ in 0..3 {
        enroller.enroll(face(1), None).await.unwrap();
    }
    assert_eq!(ledger.len(), 1);
    assert_eq!(pending.pending_len().unwrap(), 1);

    RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(MemoryContentStore::new()),
        pending.clone(),
    )
    .reconcile()
    .await
    .unwrap();
    let out = enroller.enroll(face(1), None).await.unwrap();
    assert!(matches!(out, EnrollOutcome::Duplicate { .. }));
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn restart_between_upload_and_confirm() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pending.redb");
    let ledger = FlakyLedger::new(MemoryLedger::new());
    let content = MemoryContentStore::new();
    let key;

    {
        let pending = Arc::new(PendingStore::open(&path).unwrap());
        let enroller = Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM);
        key = enroller.enroll(face(7), None).await.unwrap().hash().to_string();

        ledger.fail_confirm(true);
        let reconciler = RegistrationReconciler::new(
            Arc::new(ledger.clone()),
            Arc::new(content.clone()),
            pending.clone(),
        )
        .with_retry(RetryPolicy::none());
        assert_eq!(reconciler.reconcile().await.unwrap().retried, 1);
    }

    // Process restarts with the confirmation service back.
    ledger.fail_confirm(false);
    let pending = Arc::new(PendingStore::open(&path).unwrap());
    let stored = BiometricRecord::decode(&key, &pending.get(&key).unwrap().unwrap()).unwrap();
    assert_eq!(stored.status, RecordStatus::Uploaded);

    let reconciler = RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending.clone(),
    );
    assert_eq!(reconciler.reconcile().await.unwrap().completed, 1);
    assert_eq!(content.put_count(), 1);
    assert_eq!(pending.pending_len().unwrap(), 0);
}

#[tokio::test]
async fn restart_after_confirm_before_archive() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::new();
    let content = MemoryContentStore::new();
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());

    // Simulate a crash after the ledger confirmed but before archiving.
    let record = BiometricRecord::new(face(9), None).unwrap();
    ledger.register_hash(&record.hash, "{}").await.unwrap();
    pending.enqueue(&record.hash, &record.encode().unwrap()).unwrap();
    let cid = content
        .put(&record.content_object().encode().unwrap())
        .await
        .unwrap();
    ledger.confirm_cid_upload(&record.hash, &cid).await.unwrap();

    let report = RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending.clone(),
    )
    .reconcile()
    .await
    .unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(content.put_count(), 1);
    assert_eq!(ledger.get_cid(&record.hash).await.unwrap(), Some(cid));
}

#[tokio::test]
async fn converges_after_outages_end() {
    let dir = tempdir().unwrap();
    let ledger = FlakyLedger::new(MemoryLedger::new());
    let content = FlakyContentStore::new(MemoryContentStore::new());
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());
    let enroller = Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM);
    for i in 0..5 {
        enroller.enroll(face(i), None).await.unwrap();
    }

    let reconciler = RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending.clone(),
    )
    .with_retry(RetryPolicy::none());

    content.set_failing(true);
    assert_eq!(reconciler.reconcile().await.unwrap().retried, 5);
    content.set_failing(false);
    ledger.set_failing(true);
    assert_eq!(reconciler.reconcile().await.unwrap().retried, 5);
    ledger.set_failing(false);

    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.completed, 5);
    assert_eq!(pending.pending_len().unwrap(), 0);
    let records = ledger.get_all_cid_records().await.unwrap();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.status == LedgerStatus::Confirmed));
}

#[tokio::test]
async fn long_outage_leaves_budget_untouched() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::new();
    let content = FlakyContentStore::new(MemoryContentStore::new());
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());
    let enroller = Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM);
    let key = enroller.enroll(face(9), None).await.unwrap().hash().to_string();

    let reconciler = RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending.clone(),
    )
    .with_retry(RetryPolicy::none())
    .with_config(ReconcileConfig {
        max_parse_failures: 3,
        dead_letter_after: Some(3),
    });

    content.set_failing(true);
    for _ in 0..10 {
        assert_eq!(reconciler.reconcile().await.unwrap().dead_lettered, 0);
    }
    content.set_failing(false);

    assert_eq!(reconciler.reconcile().await.unwrap().completed, 1);
    assert!(pending.list_failed().unwrap().is_empty());
    assert!(ledger.get_cid(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn content_outage_postpones_matching() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::new();
    let content = FlakyContentStore::new(MemoryContentStore::new());
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());
    let auth = AuthQueue::open(dir.path().join("auth.redb")).unwrap();

    let enroller = Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM);
    let key = enroller
        .enroll(face(4), Some("alice".into()))
        .await
        .unwrap()
        .hash()
        .to_string();
    RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending.clone(),
    )
    .reconcile()
    .await
    .unwrap();

    let engine = MatchingEngine::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        MatchConfig::default(),
    )
    .with_retry(RetryPolicy::none());
    submit_auth_request(&auth, face(4), false).unwrap();

    content.set_failing(true);
    for _ in 0..3 {
        assert!(engine.run_cycle(&auth).await.is_err());
    }
    assert_eq!(auth.len().unwrap(), 1);
    assert!(decisions(&auth).is_empty());

    content.set_failing(false);
    engine.run_cycle(&auth).await.unwrap();
    let decided = decisions(&auth);
    assert_eq!(decided.len(), 1);
    assert_eq!(decided[0].matched_id(), Some(key.as_str()));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let ledger = MemoryLedger::new();
    ledger.register_hash("k", "{}").await.unwrap();
    let retry = RetryPolicy::none();
    assert_eq!(delete_now(&ledger, &retry, "k").await.unwrap(), DeleteOutcome::Deleted);
    for _ in 0..2 {
        assert_eq!(delete_now(&ledger, &retry, "k").await.unwrap(), DeleteOutcome::Absent);
    }
}

#[tokio::test]
async fn match_worker_runs_on_notification() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::new();
    let content = MemoryContentStore::new();
    let pending = Arc::new(PendingStore::open(dir.path().join("pending.redb")).unwrap());
    let auth = Arc::new(AuthQueue::open(dir.path().join("auth.redb")).unwrap());

    Enroller::new(Arc::new(ledger.clone()), pending.clone(), FACE_DIM)
        .enroll(face(5), None)
        .await
        .unwrap();
    RegistrationReconciler::new(
        Arc::new(ledger.clone()),
        Arc::new(content.clone()),
        pending,
    )
    .reconcile()
    .await
    .unwrap();

    let engine = Arc::new(MatchingEngine::new(
        Arc::new(ledger),
        Arc::new(content),
        MatchConfig::default(),
    ));
    let worker = MatchLoop::new(engine, auth.clone());
    let (tx, trigger) = NotifyTrigger::channel(1);

    submit_auth_request(&auth, face(5), false).unwrap();
    tx.send(()).await.unwrap();
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), run_worker(&worker, trigger))
        .await
        .unwrap();

    assert!(auth.is_empty().unwrap());
    let log = decisions(&auth);
    assert_eq!(log.len(), 1);
    assert!(log[0].is_match());
    assert_eq!(log[0].similarity, Some(1.0));
}
