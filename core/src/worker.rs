//! Long-running worker loops.
//!
//! A worker runs one [`Cycle`] each time its [`Trigger`] fires. Cycles are
//! sequential; a failed cycle is logged and the loop waits for the next
//! trigger.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::CoreError;

/// Counters reported by one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Items finished by this cycle (confirmed, deleted, decided).
    pub completed: usize,
    /// Items found already finished elsewhere and archived.
    pub recovered: usize,
    /// Items left in place after a failure, to be retried.
    pub retried: usize,
    /// Undecodable items moved to the dead-letter table.
    pub quarantined: usize,
    /// Items moved to the dead-letter table after too many failed cycles.
    pub dead_lettered: usize,
    /// Decisions that were a match.
    pub matched: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// One pass of a pipeline stage.
#[async_trait::async_trait]
pub trait Cycle: Send + Sync {
    fn name(&self) -> &str;

    async fn run_cycle(&self) -> Result<CycleReport, CoreError>;
}

/// Source of wake-ups for a worker.
#[async_trait::async_trait]
pub trait Trigger: Send {
    /// Wait for the next wake-up. Returns `false` once the source is closed.
    async fn wait(&mut self) -> bool;
}

/// Fires on a fixed period. The first tick is immediate; ticks missed while
/// a cycle runs are delayed, not bunched.
pub struct PollTrigger {
    interval: Interval,
}

impl PollTrigger {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl Trigger for PollTrigger {
    async fn wait(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Fires whenever a notification arrives, e.g. from a ledger event
/// subscription. Bursts collapse into one wake-up.
pub struct NotifyTrigger {
    rx: mpsc::Receiver<()>,
}

impl NotifyTrigger {
    /// Create a trigger and the sender that fires it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

#[async_trait::async_trait]
impl Trigger for NotifyTrigger {
    async fn wait(&mut self) -> bool {
        if self.rx.recv().await.is_none() {
            return false;
        }
        while self.rx.try_recv().is_ok() {}
        true
    }
}

/// Run `cycle` on every trigger until the trigger closes.
pub async fn run_worker<C, T>(cycle: &C, mut trigger: T)
where
    C: Cycle + ?Sized,
    T: Trigger,
{
    let worker = cycle.name().to_string();
    info!(worker = %worker, "worker started");
    while trigger.wait().await {
        match cycle.run_cycle().await {
            Ok(report) if report.is_idle() => debug!(worker = %worker, "cycle idle"),
            Ok(report) => info!(
                worker = %worker,
                completed = report.completed,
                recovered = report.recovered,
                retried = report.retried,
                quarantined = report.quarantined,
                dead_lettered = report.dead_lettered,
                matched = report.matched,
                "cycle done"
            ),
            Err(e) => error!(worker = %worker, error = %e, "cycle failed"),
        }
    }
    info!(worker = %worker, "trigger closed, worker stopped");
}
