//! Worker commands.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::Args;
use faceproof_core::{Cycle, CycleReport, PollTrigger, run_worker};
use tracing::{error, info};

use super::{load_app, output};
use crate::Cli;
use crate::app::{App, Stage, StageCycle};

/// Run a worker until interrupted.
#[derive(Args)]
pub struct WorkerCommand {
    /// Polling period in seconds (default from config)
    #[arg(long)]
    interval: Option<u64>,
}

impl WorkerCommand {
    pub async fn run(&self, cli: &Cli, stage: Stage) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        serve(app, stage, self.interval).await
    }
}

/// Run the deletion worker until interrupted.
#[derive(Args)]
pub struct DeleteWorkerCommand {
    #[command(flatten)]
    worker: WorkerCommand,

    /// Take deletion requests from `<key>_delete` marker records on the
    /// ledger instead of the local intent queue
    #[arg(long)]
    markers: bool,
}

impl DeleteWorkerCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let stage = if self.markers {
            Stage::DeleteMarkers
        } else {
            Stage::Delete
        };
        self.worker.run(cli, stage).await
    }
}

async fn serve(app: Arc<App>, stage: Stage, interval: Option<u64>) -> anyhow::Result<()> {
    let period = interval
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| app.cfg.poll_interval());
    let cycle = StageCycle::new(app, stage);
    info!(worker = cycle.name(), ?period, "starting");

    tokio::select! {
        _ = run_worker(&cycle, PollTrigger::new(period)) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(worker = cycle.name(), "interrupted, stopping");
        }
    }
    Ok(())
}

/// Run one pass of every worker and exit.
#[derive(Args)]
pub struct ReconcileCommand {
    /// Also process `<key>_delete` marker records
    #[arg(long)]
    markers: bool,
}

impl ReconcileCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let app = load_app(cli)?;
        let mut stages = vec![Stage::Register, Stage::Delete];
        if self.markers {
            stages.push(Stage::DeleteMarkers);
        }
        stages.push(Stage::Match);

        let cycles: Vec<StageCycle> = stages
            .into_iter()
            .map(|stage| StageCycle::new(app.clone(), stage))
            .collect();
        let (reports, failed) = run_passes(&cycles).await;
        output(cli).print(&reports)?;
        if !failed.is_empty() {
            bail!("{} of the passes failed: {}", failed.len(), failed.join("; "));
        }
        Ok(())
    }
}

/// Run every cycle once, in order. A failed pass is logged and does not stop
/// the ones after it.
async fn run_passes<C: Cycle>(cycles: &[C]) -> (BTreeMap<String, CycleReport>, Vec<String>) {
    let mut reports = BTreeMap::new();
    let mut failed = Vec::new();
    for cycle in cycles {
        match cycle.run_cycle().await {
            Ok(report) => {
                reports.insert(cycle.name().to_string(), report);
            }
            Err(e) => {
                error!(worker = cycle.name(), error = %e, "reconcile: pass failed");
                failed.push(format!("{}: {e}", cycle.name()));
            }
        }
    }
    (reports, failed)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use faceproof_core::CoreError;
    use faceproof_ledger::LedgerError;

    use super::*;

    struct Stub {
        name: &'static str,
        fail: bool,
        runs: AtomicUsize,
    }

    impl Stub {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                fail,
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Cycle for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LedgerError::Unavailable("peer down".into()).into());
            }
            Ok(CycleReport {
                completed: 1,
                ..CycleReport::default()
            })
        }
    }

    #[tokio::test]
    async fn test_failed_pass_does_not_stop_the_rest() {
        let cycles = [
            Stub::new("register", true),
            Stub::new("delete", false),
            Stub::new("match", false),
        ];
        let (reports, failed) = run_passes(&cycles).await;

        assert!(cycles.iter().all(|c| c.runs.load(Ordering::SeqCst) == 1));
        assert_eq!(failed.len(), 1);
        assert!(failed[0].starts_with("register:"));
        assert_eq!(reports.len(), 2);
        assert_eq!(reports["match"].completed, 1);
        assert!(!reports.contains_key("register"));
    }
}
