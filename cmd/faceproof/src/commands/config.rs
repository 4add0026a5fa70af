//! Configuration commands.

use clap::{Args, Subcommand};

use super::{load_config, output};
use crate::Cli;

/// Show configuration.
///
/// Configuration is stored in ~/.faceproof/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

impl ConfigCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = load_config(cli)?;
        match &self.command {
            ConfigSubcommand::Show => output(cli).print(&cfg),
            ConfigSubcommand::Path => {
                println!("{}", cfg.path().display());
                Ok(())
            }
        }
    }
}
