//! Enrollment commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use faceproof_core::{ContentObject, EnrollOutcome};
use serde::Serialize;
use tracing::warn;

use super::{FaceInput, load_app, output};
use crate::Cli;

/// Enroll one face.
///
/// The identity key is registered on the ledger and the record is queued
/// for upload; the registration worker confirms it.
#[derive(Args)]
pub struct EnrollCommand {
    #[command(flatten)]
    input: FaceInput,

    /// Label stored with the vector
    #[arg(long)]
    label: Option<String>,

    /// Refuse vectors that match an already confirmed identity
    #[arg(long)]
    check_similar: bool,
}

impl EnrollCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let vector = self.input.load(&app).await?;
        let pending = Arc::new(
            app.open_pending()
                .await
                .context("open pending store")?,
        );
        let enroller = app.enroller(pending);
        let outcome = if self.check_similar {
            enroller
                .enroll_checked(&app.matcher(), vector, self.label.clone())
                .await?
        } else {
            enroller.enroll(vector, self.label.clone()).await?
        };
        output(cli).print(&outcome)
    }
}

/// Enroll faces from a JSON-lines file.
///
/// Each line is `{"vector": [...], "label": ...}`. Lines that fail are
/// reported and skipped.
#[derive(Args)]
pub struct EnrollBatchCommand {
    /// JSON-lines input file
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Default, Serialize)]
struct BatchSummary {
    lines: usize,
    enrolled: usize,
    duplicate: usize,
    in_progress: usize,
    similar: usize,
    failed: usize,
}

impl BatchSummary {
    fn count(&mut self, outcome: &EnrollOutcome) {
        match outcome {
            EnrollOutcome::Enrolled { .. } => self.enrolled += 1,
            EnrollOutcome::Duplicate { .. } => self.duplicate += 1,
            EnrollOutcome::InProgress { .. } => self.in_progress += 1,
            EnrollOutcome::SimilarExists { .. } => self.similar += 1,
        }
    }
}

impl EnrollBatchCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let content = std::fs::read_to_string(&self.file)
            .with_context(|| format!("read {}", self.file.display()))?;
        let pending = Arc::new(
            app.open_pending()
                .await
                .context("open pending store")?,
        );
        let enroller = app.enroller(pending);

        let mut summary = BatchSummary::default();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            summary.lines += 1;
            let object = match ContentObject::decode(line.as_bytes()) {
                Ok(o) => o,
                Err(e) => {
                    warn!(line = n + 1, error = %e, "enroll-batch: bad line");
                    summary.failed += 1;
                    continue;
                }
            };
            match enroller.enroll(object.vector, object.label).await {
                Ok(outcome) => summary.count(&outcome),
                Err(e) => {
                    warn!(line = n + 1, error = %e, "enroll-batch: enrollment failed");
                    summary.failed += 1;
                }
            }
        }
        output(cli).print(&summary)
    }
}
