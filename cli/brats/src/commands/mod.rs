//! CLI commands.

mod config;
mod list;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use brats_verify::{load_suite, nodejs_scenarios, Scenario};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::output::OutputFormat;

/// Buildpack acceptance tests against a live platform.
#[derive(Debug, Parser)]
#[command(name = "brats")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Buildpack source checkout.
    #[arg(long, global = true)]
    buildpack_dir: Option<PathBuf>,

    /// Directory containing fixture apps.
    #[arg(long, global = true)]
    fixtures_dir: Option<PathBuf>,

    /// Load scenarios from a TOML suite file instead of the built-in catalog.
    #[arg(long, global = true)]
    suite: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy fixtures and verify the buildpack.
    Run(run::RunCommand),

    /// List available scenarios.
    List(list::ListCommand),

    /// Show or save the effective configuration.
    Config(config::ConfigCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, mut config: Config) -> Result<()> {
        if let Some(dir) = self.buildpack_dir {
            config.buildpack_dir = dir;
        }
        if let Some(dir) = self.fixtures_dir {
            config.fixtures_dir = Some(dir);
        }

        let ctx = CommandContext {
            config,
            format: OutputFormat::parse(&self.format),
            suite: self.suite,
        };

        match self.command {
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::List(cmd) => cmd.run(ctx),
            Commands::Config(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("brats {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub suite: Option<PathBuf>,
}

impl CommandContext {
    /// Scenarios from the suite file if one was given, else the built-in
    /// catalog.
    pub fn scenarios(&self) -> Result<Vec<Scenario>> {
        let fixtures_dir = self.config.fixtures_dir();
        let scenarios = match &self.suite {
            Some(path) => load_suite(path, &fixtures_dir)?,
            None => nodejs_scenarios(&fixtures_dir)?,
        };
        Ok(scenarios)
    }
}
