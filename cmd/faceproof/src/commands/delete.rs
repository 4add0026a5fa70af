//! Deletion commands.

use anyhow::Context as _;
use clap::Args;
use faceproof_core::{DeleteOutcome, delete_now};
use serde::Serialize;

use super::{load_app, output};
use crate::Cli;

/// Delete an identity binding from the ledger now.
///
/// The content object stays in IPFS; only the ledger record is removed.
#[derive(Args)]
pub struct DeleteCommand {
    /// Identity key
    key: String,
}

#[derive(Serialize)]
struct Deleted<'a> {
    key: &'a str,
    outcome: DeleteOutcome,
}

impl DeleteCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let outcome = delete_now(app.ledger.as_ref(), &app.retry, &self.key).await?;
        output(cli).print(&Deleted {
            key: &self.key,
            outcome,
        })
    }
}

/// Queue an identity binding for deletion by the deletion worker.
#[derive(Args)]
pub struct RequestDeleteCommand {
    /// Identity key
    key: String,
}

#[derive(Serialize)]
struct Requested<'a> {
    key: &'a str,
    queued: bool,
}

impl RequestDeleteCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let queue = app.open_intents().await.context("open intent queue")?;
        let queued = queue.request(&self.key)?;
        output(cli).print(&Requested {
            key: &self.key,
            queued,
        })
    }
}
