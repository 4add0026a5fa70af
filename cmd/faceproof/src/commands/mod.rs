//! CLI commands module.

mod authenticate;
mod calibrate;
mod config;
mod delete;
mod enroll;
mod queue;
mod worker;

pub use authenticate::{AuthenticateCommand, DecisionsCommand};
pub use calibrate::CalibrateCommand;
pub use config::ConfigCommand;
pub use delete::{DeleteCommand, RequestDeleteCommand};
pub use enroll::{EnrollBatchCommand, EnrollCommand};
pub use queue::QueueCommand;
pub use worker::{DeleteWorkerCommand, ReconcileCommand, WorkerCommand};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use faceproof_embed::{Extractor, JsonVectorExtractor};

use crate::Cli;
use crate::app::App;
use crate::config::Config;
use crate::output::OutputFormat;

pub(crate) fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    Config::load(cli.config.as_deref())
}

pub(crate) fn load_app(cli: &Cli) -> anyhow::Result<Arc<App>> {
    Ok(Arc::new(App::new(load_config(cli)?)?))
}

pub(crate) fn output(cli: &Cli) -> OutputFormat {
    OutputFormat::from_json_flag(cli.json)
}

/// Where a face vector comes from.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct FaceInput {
    /// Image file sent to the extractor service
    #[arg(long)]
    image: Option<PathBuf>,

    /// JSON file holding a precomputed vector (array or {"vector": [...]})
    #[arg(long)]
    vector: Option<PathBuf>,
}

impl FaceInput {
    pub(crate) async fn load(&self, app: &App) -> anyhow::Result<Vec<f32>> {
        match (&self.image, &self.vector) {
            (Some(path), _) => {
                let bytes =
                    std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
                Ok(app.extractor()?.extract(&bytes).await?)
            }
            (None, Some(path)) => {
                let bytes =
                    std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
                Ok(JsonVectorExtractor::new(app.cfg.matching.dimension)
                    .extract(&bytes)
                    .await?)
            }
            (None, None) => anyhow::bail!("either --image or --vector is required"),
        }
    }
}
