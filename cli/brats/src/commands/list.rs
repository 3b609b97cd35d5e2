//! List command.

use anyhow::Result;
use clap::Args;

use crate::output::{print_output, ScenarioRow};

use super::CommandContext;

/// List scenarios without deploying anything.
#[derive(Debug, Args)]
pub struct ListCommand {}

impl ListCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let scenarios = ctx.scenarios()?;
        let rows: Vec<ScenarioRow> = scenarios.iter().map(ScenarioRow::from).collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}
