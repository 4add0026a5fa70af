//! Authentication commands.

use anyhow::Context as _;
use clap::Args;
use faceproof_core::{AuthDecision, submit_auth_request};
use serde::Serialize;
use tracing::warn;

use super::{FaceInput, load_app, output};
use crate::Cli;

/// Queue an authentication request.
///
/// The matching worker decides it on its next cycle; see `decisions`.
#[derive(Args)]
pub struct AuthenticateCommand {
    #[command(flatten)]
    input: FaceInput,
}

#[derive(Serialize)]
struct Queued {
    seq: u64,
}

impl AuthenticateCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let vector = self.input.load(&app).await?;
        let queue = app.open_auth().await.context("open auth queue")?;
        let seq = submit_auth_request(&queue, vector, app.cfg.matching.normalize)?;
        output(cli).print(&Queued { seq })
    }
}

/// Print recorded authentication decisions.
#[derive(Args)]
pub struct DecisionsCommand {
    /// Only the last N decisions
    #[arg(long)]
    last: Option<usize>,
}

#[derive(Serialize)]
struct DecisionRow {
    seq: u64,
    request_seq: u64,
    #[serde(flatten)]
    decision: AuthDecision,
}

impl DecisionsCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let queue = app.open_auth().await.context("open auth queue")?;
        let mut rows: Vec<DecisionRow> = queue
            .decisions()?
            .into_iter()
            .filter_map(|d| match AuthDecision::decode(&d.payload) {
                Ok(decision) => Some(DecisionRow {
                    seq: d.seq,
                    request_seq: d.request_seq,
                    decision,
                }),
                Err(e) => {
                    warn!(seq = d.seq, error = %e, "decisions: undecodable entry");
                    None
                }
            })
            .collect();
        if let Some(n) = self.last {
            let skip = rows.len().saturating_sub(n);
            rows.drain(..skip);
        }
        output(cli).print(&rows)
    }
}
