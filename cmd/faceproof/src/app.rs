//! Collaborators built from the configuration.
//!
//! Each queue is a redb file that one process can hold at a time. Commands
//! open only the queue they need, and workers reopen theirs every cycle, so
//! short-lived commands (enroll, authenticate) can interleave with running
//! workers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use faceproof_cas::{ContentStore, IpfsClient};
use faceproof_core::{
    CoreError, Cycle, CycleReport, DeletionReconciler, Enroller, MarkerIntents, MatchingEngine,
    QueuedIntents, RegistrationReconciler, RetryPolicy,
};
use faceproof_embed::{ExtractorConfig, HttpExtractor};
use faceproof_ledger::{GatewayConfig, GatewayLedger, Ledger};
use faceproof_queue::{AuthQueue, IntentQueue, PendingStore, QueueResult};
use tracing::debug;

use crate::config::Config;

const OPEN_ATTEMPTS: u32 = 50;
const OPEN_BACKOFF: Duration = Duration::from_millis(100);

pub struct App {
    pub cfg: Config,
    pub ledger: Arc<dyn Ledger>,
    pub content: Arc<dyn ContentStore>,
    pub retry: RetryPolicy,
}

impl App {
    pub fn new(cfg: Config) -> anyhow::Result<Self> {
        let retry = cfg.retry_policy();
        let ledger = GatewayLedger::new(
            GatewayConfig::new(&cfg.ledger.gateway_url)
                .with_channel(&cfg.ledger.channel)
                .with_contract(&cfg.ledger.contract)
                .with_timeout(retry.call_timeout),
        )?;
        let content = IpfsClient::with_timeout(&cfg.content.ipfs_api, retry.call_timeout)?;
        Ok(Self {
            cfg,
            ledger: Arc::new(ledger),
            content: Arc::new(content),
            retry,
        })
    }

    pub fn extractor(&self) -> anyhow::Result<HttpExtractor> {
        Ok(HttpExtractor::with_config(
            ExtractorConfig::default()
                .with_url(&self.cfg.extractor.url)
                .with_dimension(self.cfg.matching.dimension)
                .with_timeout(self.retry.call_timeout),
        )?)
    }

    pub async fn open_pending(&self) -> QueueResult<PendingStore> {
        open_store(&self.cfg.pending_path(), |p| PendingStore::open(p)).await
    }

    pub async fn open_auth(&self) -> QueueResult<AuthQueue> {
        open_store(&self.cfg.auth_path(), |p| AuthQueue::open(p)).await
    }

    pub async fn open_intents(&self) -> QueueResult<IntentQueue> {
        open_store(&self.cfg.intents_path(), |p| IntentQueue::open(p)).await
    }

    pub fn enroller(&self, pending: Arc<PendingStore>) -> Enroller {
        Enroller::new(self.ledger.clone(), pending, self.cfg.matching.dimension)
            .with_retry(self.retry.clone())
            .with_normalize(self.cfg.matching.normalize)
    }

    pub fn registration(&self, pending: Arc<PendingStore>) -> RegistrationReconciler {
        RegistrationReconciler::new(self.ledger.clone(), self.content.clone(), pending)
            .with_retry(self.retry.clone())
            .with_config(self.cfg.reconcile_config())
    }

    pub fn matcher(&self) -> MatchingEngine {
        MatchingEngine::new(
            self.ledger.clone(),
            self.content.clone(),
            self.cfg.match_config(),
        )
        .with_retry(self.retry.clone())
    }

    pub fn deletion(&self, intents: Option<Arc<IntentQueue>>) -> DeletionReconciler {
        let source: Box<dyn faceproof_core::IntentSource> = match intents {
            Some(queue) => Box::new(QueuedIntents::new(queue)),
            None => Box::new(MarkerIntents::default()),
        };
        DeletionReconciler::new(self.ledger.clone(), source).with_retry(self.retry.clone())
    }
}

/// Open a queue, waiting while another process holds its file.
async fn open_store<T, F>(path: &Path, open: F) -> QueueResult<T>
where
    F: Fn(&Path) -> QueueResult<T>,
{
    let mut attempt = 1;
    loop {
        match open(path) {
            Ok(store) => return Ok(store),
            Err(e) if attempt < OPEN_ATTEMPTS => {
                debug!(path = %path.display(), attempt, error = %e, "store busy, retrying");
                attempt += 1;
                tokio::time::sleep(OPEN_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The stages a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register,
    Delete,
    DeleteMarkers,
    Match,
}

/// A stage that reopens its queue on every cycle.
pub struct StageCycle {
    app: Arc<App>,
    stage: Stage,
}

impl StageCycle {
    pub fn new(app: Arc<App>, stage: Stage) -> Self {
        Self { app, stage }
    }
}

#[async_trait]
impl Cycle for StageCycle {
    fn name(&self) -> &str {
        match self.stage {
            Stage::Register => "register",
            Stage::Delete => "delete",
            Stage::DeleteMarkers => "delete-markers",
            Stage::Match => "match",
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        match self.stage {
            Stage::Register => {
                let pending = Arc::new(self.app.open_pending().await?);
                self.app.registration(pending).reconcile().await
            }
            Stage::Delete => {
                let intents = Arc::new(self.app.open_intents().await?);
                self.app.deletion(Some(intents)).reconcile().await
            }
            Stage::DeleteMarkers => self.app.deletion(None).reconcile().await,
            Stage::Match => {
                let auth = self.app.open_auth().await?;
                self.app.matcher().run_cycle(&auth).await
            }
        }
    }
}
