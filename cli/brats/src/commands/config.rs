//! Config command.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::output::{print_single, print_success};

use super::CommandContext;

/// Show or persist configuration.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Print the configuration after environment and flag overrides.
    Show,

    /// Write the effective configuration to the config file.
    Save,
}

impl ConfigCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ConfigSubcommand::Show => {
                print_single(&ctx.config);
                Ok(())
            }
            ConfigSubcommand::Save => {
                let path = ctx.config.save()?;
                print_success(&format!("Saved configuration to {}", path.display()));
                Ok(())
            }
        }
    }
}
