//! faceproof - ledger-anchored face enrollment and authentication.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;
mod output;

use commands::{
    AuthenticateCommand, CalibrateCommand, ConfigCommand, DecisionsCommand, DeleteCommand,
    DeleteWorkerCommand, EnrollBatchCommand, EnrollCommand, QueueCommand, ReconcileCommand,
    RequestDeleteCommand, WorkerCommand,
};

/// faceproof - ledger-anchored face enrollment and authentication.
///
/// Face vectors are keyed by a hash of their canonical encoding, registered
/// on a ledger contract and stored in IPFS. Workers reconcile registrations
/// and deletions and answer queued authentication requests.
///
/// Configuration is stored in ~/.faceproof/config.yaml.
#[derive(Parser)]
#[command(name = "faceproof")]
#[command(about = "Ledger-anchored face identity CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.faceproof/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output as JSON instead of YAML
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enroll one face
    Enroll(EnrollCommand),
    /// Enroll faces from a JSON-lines file
    EnrollBatch(EnrollBatchCommand),
    /// Queue an authentication request
    Authenticate(AuthenticateCommand),
    /// Print recorded authentication decisions
    Decisions(DecisionsCommand),
    /// Delete an identity binding now
    Delete(DeleteCommand),
    /// Queue an identity binding for deletion
    RequestDelete(RequestDeleteCommand),
    /// Run the registration worker
    RegisterWorker(WorkerCommand),
    /// Run the deletion worker
    DeleteWorker(DeleteWorkerCommand),
    /// Run the matching worker
    MatchWorker(WorkerCommand),
    /// Run one pass of every worker and exit
    Reconcile(ReconcileCommand),
    /// Inspect and repair local queues
    Queue(QueueCommand),
    /// Estimate the match threshold from labeled enrollments
    Calibrate(CalibrateCommand),
    /// Show configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Enroll(cmd) => cmd.run(&cli).await,
        Commands::EnrollBatch(cmd) => cmd.run(&cli).await,
        Commands::Authenticate(cmd) => cmd.run(&cli).await,
        Commands::Decisions(cmd) => cmd.run(&cli).await,
        Commands::Delete(cmd) => cmd.run(&cli).await,
        Commands::RequestDelete(cmd) => cmd.run(&cli).await,
        Commands::RegisterWorker(cmd) => cmd.run(&cli, app::Stage::Register).await,
        Commands::DeleteWorker(cmd) => cmd.run(&cli).await,
        Commands::MatchWorker(cmd) => cmd.run(&cli, app::Stage::Match).await,
        Commands::Reconcile(cmd) => cmd.run(&cli).await,
        Commands::Queue(cmd) => cmd.run(&cli).await,
        Commands::Calibrate(cmd) => cmd.run(&cli).await,
        Commands::Config(cmd) => cmd.run(&cli).await,
    }
}
