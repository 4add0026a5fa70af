//! Threshold calibration.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use faceproof_core::{ContentObject, LabeledVector, calibrate, load_corpus};
use tracing::{info, warn};

use super::{load_app, output};
use crate::Cli;

/// Estimate the match threshold at the equal error rate.
///
/// Samples come from confirmed ledger records carrying a label, or from a
/// JSON-lines file of `{"vector": [...], "label": ...}`.
#[derive(Args)]
pub struct CalibrateCommand {
    /// Read labeled vectors from a JSON-lines file instead of the ledger
    #[arg(long)]
    file: Option<PathBuf>,
}

impl CalibrateCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let samples = match &self.file {
            Some(path) => read_samples(path)?,
            None => load_corpus(app.ledger.as_ref(), app.content.as_ref(), &app.retry).await?,
        };
        info!(samples = samples.len(), "calibrate: corpus loaded");
        let report = calibrate(&samples)?;
        output(cli).print(&report)
    }
}

fn read_samples(path: &PathBuf) -> anyhow::Result<Vec<LabeledVector>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut samples = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match ContentObject::decode(line.as_bytes()) {
            Ok(ContentObject {
                vector,
                label: Some(label),
            }) => samples.push(LabeledVector { label, vector }),
            Ok(_) => warn!(line = n + 1, "calibrate: unlabeled line skipped"),
            Err(e) => warn!(line = n + 1, error = %e, "calibrate: bad line skipped"),
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_samples_skips_unusable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lfw.jsonl");
        std::fs::write(
            &path,
            "{\"vector\":[1.0,0.0],\"label\":3}\n\n{\"vector\":[0.0,1.0]}\nnot json\n{\"vector\":[0.6,0.8],\"label\":\"3\"}\n",
        )
        .unwrap();
        let samples = read_samples(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.label == "3"));
    }
}
