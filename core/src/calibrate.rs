//! Threshold calibration over a labeled corpus.
//!
//! Every pair of samples is scored with the matching similarity; pairs with
//! equal labels are genuine, the rest impostors. The ROC curve is swept over
//! the distinct scores and the equal-error point picks the threshold.

use std::cmp::Ordering;

use faceproof_cas::ContentStore;
use faceproof_ledger::Ledger;
use faceproof_vecstore::{similarity, squared_l2};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::record::ContentObject;
use crate::retry::RetryPolicy;

/// A vector with its ground-truth identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledVector {
    pub label: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confusion {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub pairs: usize,
    pub genuine_pairs: usize,
    pub impostor_pairs: usize,
    /// Area under the ROC curve.
    pub auc: f64,
    /// Equal error rate, the mean of FAR and FRR at the chosen point.
    pub eer: f64,
    /// Similarity threshold at the equal-error point.
    pub threshold: f32,
    pub accuracy: f64,
    /// False accept rate at `threshold`.
    pub far: f64,
    /// False reject rate at `threshold`.
    pub frr: f64,
    pub confusion: Confusion,
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 { 0.0 } else { n as f64 / d as f64 }
}

pub fn calibrate(samples: &[LabeledVector]) -> Result<CalibrationReport, CoreError> {
    if samples.len() < 2 {
        return Err(CoreError::Calibration(format!(
            "need at least 2 samples, got {}",
            samples.len()
        )));
    }
    let dim = samples[0].vector.len();
    if let Some(bad) = samples.iter().find(|s| s.vector.len() != dim) {
        return Err(CoreError::DimensionMismatch {
            expected: dim,
            got: bad.vector.len(),
        });
    }

    let mut scored: Vec<(f32, bool)> = Vec::with_capacity(samples.len() * (samples.len() - 1) / 2);
    for (i, a) in samples.iter().enumerate() {
        for b in &samples[i + 1..] {
            let sim = similarity(squared_l2(&a.vector, &b.vector));
            scored.push((sim, a.label == b.label));
        }
    }
    let positives = scored.iter().filter(|(_, genuine)| *genuine).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(CoreError::Calibration(format!(
            "need genuine and impostor pairs, got {positives} genuine and {negatives} impostor"
        )));
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    // ROC points at each distinct score, starting above the highest one.
    let mut points: Vec<(f32, f64, f64)> = vec![(f32::INFINITY, 0.0, 0.0)];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < scored.len() {
        let t = scored[i].0;
        while i < scored.len() && scored[i].0 == t {
            if scored[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push((t, ratio(fp, negatives), ratio(tp, positives)));
    }

    let auc: f64 = points
        .windows(2)
        .map(|w| (w[1].1 - w[0].1) * (w[1].2 + w[0].2) / 2.0)
        .sum();

    let (threshold, fpr, tpr) = points
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = ((1.0 - a.2) - a.1).abs();
            let db = ((1.0 - b.2) - b.1).abs();
            da.partial_cmp(&db).unwrap_or(Ordering::Equal)
        })
        .unwrap_or((f32::INFINITY, 0.0, 0.0));
    let eer = (fpr + (1.0 - tpr)) / 2.0;

    let mut confusion = Confusion::default();
    for &(score, genuine) in &scored {
        match (score >= threshold, genuine) {
            (true, true) => confusion.tp += 1,
            (true, false) => confusion.fp += 1,
            (false, false) => confusion.tn += 1,
            (false, true) => confusion.fn_ += 1,
        }
    }
    debug!(pairs = scored.len(), threshold, eer, "calibrate: done");

    Ok(CalibrationReport {
        pairs: scored.len(),
        genuine_pairs: positives,
        impostor_pairs: negatives,
        auc,
        eer,
        threshold,
        accuracy: ratio(confusion.tp + confusion.tn, scored.len()),
        far: ratio(confusion.fp, confusion.fp + confusion.tn),
        frr: ratio(confusion.fn_, confusion.fn_ + confusion.tp),
        confusion,
    })
}

/// Load labeled vectors from confirmed ledger records. Records without a
/// label or with an unreadable payload are skipped.
pub async fn load_corpus(
    ledger: &dyn Ledger,
    content: &dyn ContentStore,
    retry: &RetryPolicy,
) -> Result<Vec<LabeledVector>, CoreError> {
    let records = retry
        .run("get_all_cid_records", "*", || ledger.get_all_cid_records())
        .await?;
    let mut corpus = Vec::new();
    for record in &records {
        let Some(cid) = record.confirmed_cid() else {
            continue;
        };
        let object = match retry.run("get", &record.id, || content.get(cid)).await {
            Ok(bytes) => ContentObject::decode(&bytes),
            Err(e) => Err(e.into()),
        };
        match object {
            Ok(ContentObject {
                vector,
                label: Some(label),
            }) => corpus.push(LabeledVector { label, vector }),
            Ok(_) => {}
            Err(e) => warn!(key = %record.id, error = %e, "calibrate: skipping record"),
        }
    }
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use faceproof_cas::MemoryContentStore;
    use faceproof_ledger::{LedgerRecord, MemoryLedger};

    use super::*;

    fn sample(label: &str, v: &[f32]) -> LabeledVector {
        LabeledVector {
            label: label.into(),
            vector: v.to_vec(),
        }
    }

    #[test]
    fn test_separable_corpus() {
        let samples = vec![
            sample("a", &[1.0, 0.0]),
            sample("a", &[0.995, 0.0998]),
            sample("b", &[0.0, 1.0]),
            sample("b", &[0.0998, 0.995]),
        ];
        let r = calibrate(&samples).unwrap();
        assert_eq!(r.pairs, 6);
        assert_eq!(r.genuine_pairs, 2);
        assert_eq!(r.impostor_pairs, 4);
        assert_eq!(r.eer, 0.0);
        assert_eq!(r.auc, 1.0);
        assert_eq!(r.accuracy, 1.0);
        assert_eq!(r.far, 0.0);
        assert_eq!(r.frr, 0.0);
        assert_eq!(
            r.confusion,
            Confusion {
                tp: 2,
                fp: 0,
                tn: 4,
                fn_: 0
            }
        );
        assert!(r.threshold > 0.9 && r.threshold < 1.0);
    }

    #[test]
    fn test_overlapping_corpus_has_error() {
        let samples = vec![
            sample("a", &[1.0, 0.0]),
            sample("a", &[0.0, 1.0]),
            sample("b", &[0.995, 0.0998]),
            sample("b", &[0.6, 0.8]),
        ];
        let r = calibrate(&samples).unwrap();
        assert!(r.eer > 0.0);
        assert!(r.auc < 1.0);
    }

    #[test]
    fn test_rejects_degenerate_corpus() {
        assert!(matches!(
            calibrate(&[sample("a", &[1.0])]),
            Err(CoreError::Calibration(_))
        ));
        assert!(matches!(
            calibrate(&[sample("a", &[1.0]), sample("a", &[0.5])]),
            Err(CoreError::Calibration(_))
        ));
        assert!(matches!(
            calibrate(&[sample("a", &[1.0]), sample("b", &[0.5, 0.5])]),
            Err(CoreError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_corpus_keeps_labeled() {
        let ledger = MemoryLedger::new();
        let content = MemoryContentStore::new();
        for (id, body) in [
            ("x", r#"{"vector":[1.0,0.0],"label":"7"}"#),
            ("y", r#"{"vector":[0.0,1.0]}"#),
            ("z", r#"{"vector":[0.6,0.8],"label":7}"#),
        ] {
            let cid = content.put(body.as_bytes()).await.unwrap();
            ledger.put_raw(LedgerRecord::confirmed(id, &cid)).unwrap();
        }
        ledger.put_raw(LedgerRecord::confirmed("w", "sha256:missing")).unwrap();

        let corpus = load_corpus(&ledger, &content, &RetryPolicy::none()).await.unwrap();
        assert_eq!(corpus.len(), 2);
        assert!(corpus.iter().all(|s| s.label == "7"));
    }
}
