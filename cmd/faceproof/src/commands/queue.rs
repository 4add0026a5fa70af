//! Local queue inspection.

use anyhow::Context as _;
use clap::{Args, Subcommand};
use serde::Serialize;

use super::{load_app, output};
use crate::Cli;

/// Inspect and repair local queues.
#[derive(Args)]
pub struct QueueCommand {
    #[command(subcommand)]
    command: QueueSubcommand,
}

#[derive(Subcommand)]
enum QueueSubcommand {
    /// Entry counts of every queue
    Status,
    /// List dead-lettered enrollments
    Failed,
    /// Move a dead-lettered enrollment back to pending
    Requeue {
        /// Identity key
        key: String,
    },
}

#[derive(Serialize)]
struct Status {
    pending: usize,
    archived: usize,
    failed: usize,
    auth_requests: usize,
    decisions: usize,
    deletion_intents: usize,
    resolved_intents: usize,
}

#[derive(Serialize)]
struct Failed {
    key: String,
    reason: String,
    bytes: usize,
}

#[derive(Serialize)]
struct Requeued<'a> {
    key: &'a str,
    requeued: bool,
}

impl QueueCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        match &self.command {
            QueueSubcommand::Status => {
                let pending = app.open_pending().await.context("open pending store")?;
                let (p, a, f) = (
                    pending.pending_len()?,
                    pending.list_archived()?.len(),
                    pending.list_failed()?.len(),
                );
                drop(pending);
                let auth = app.open_auth().await.context("open auth queue")?;
                let (r, d) = (auth.len()?, auth.decisions()?.len());
                drop(auth);
                let intents = app.open_intents().await.context("open intent queue")?;
                output(cli).print(&Status {
                    pending: p,
                    archived: a,
                    failed: f,
                    auth_requests: r,
                    decisions: d,
                    deletion_intents: intents.list()?.len(),
                    resolved_intents: intents.list_resolved()?.len(),
                })
            }
            QueueSubcommand::Failed => {
                let pending = app.open_pending().await.context("open pending store")?;
                let rows: Vec<Failed> = pending
                    .list_failed()?
                    .into_iter()
                    .map(|e| Failed {
                        key: e.key,
                        reason: e.reason,
                        bytes: e.payload.len(),
                    })
                    .collect();
                output(cli).print(&rows)
            }
            QueueSubcommand::Requeue { key } => {
                let pending = app.open_pending().await.context("open pending store")?;
                let requeued = pending.requeue_failed(key)?;
                output(cli).print(&Requeued { key, requeued })
            }
        }
    }
}
