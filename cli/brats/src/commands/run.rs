//! Run command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use brats_platform::{CfConfig, CfPlatform, PlatformClient};
use brats_poll::{PollPolicy, DEFAULT_ASSERTION_WINDOW, DEFAULT_INSTANCE_TIMEOUT, DEFAULT_POLL_INTERVAL};
use brats_verify::{RunConfig, SuiteRunner, TeardownPolicy, Timeouts, Verifier};
use clap::Args;
use tracing::{info, warn};

use crate::error::CliError;
use crate::output::print_report;

use super::CommandContext;

/// Deploy fixtures and verify them.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Scenario to run (repeatable). Runs every scenario when omitted.
    #[arg(long = "scenario", short = 's')]
    scenarios: Vec<String>,

    /// When to delete deployed apps: always, on-success or never.
    #[arg(long, env = "BRATS_TEARDOWN", default_value_t = TeardownPolicy::Always)]
    teardown: TeardownPolicy,

    /// The buildpack under test is a cached artifact.
    #[arg(long)]
    cached: bool,

    /// Path to the cf CLI.
    #[arg(long)]
    cf_path: Option<std::path::PathBuf>,

    /// Stack for buildpack registration and pushes.
    #[arg(long)]
    stack: Option<String>,

    /// Seconds to wait for instances to run.
    #[arg(long, default_value_t = DEFAULT_INSTANCE_TIMEOUT.as_secs())]
    instance_timeout: u64,

    /// Seconds to retry log and body assertions.
    #[arg(long, default_value_t = DEFAULT_ASSERTION_WINDOW.as_secs())]
    assertion_timeout: u64,

    /// Seconds between polls.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    poll_interval: u64,
}

impl RunCommand {
    fn timeouts(&self) -> Result<Timeouts, CliError> {
        let secs = |value: u64, flag: &'static str| {
            if value == 0 {
                Err(CliError::InvalidTimeout { flag })
            } else {
                Ok(Duration::from_secs(value))
            }
        };
        let interval = secs(self.poll_interval, "--poll-interval")?;
        Ok(Timeouts {
            instances: PollPolicy::new(interval, secs(self.instance_timeout, "--instance-timeout")?),
            assertion: PollPolicy::new(interval, secs(self.assertion_timeout, "--assertion-timeout")?),
        })
    }

    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let timeouts = self.timeouts()?;
        let scenarios = ctx.scenarios()?;

        let mut config = ctx.config;
        if let Some(path) = self.cf_path {
            config.cf_path = path;
        }
        if self.stack.is_some() {
            config.stack = self.stack;
        }

        let platform = CfPlatform::new(CfConfig {
            cf_path: config.cf_path.clone(),
            app_scheme: config.app_scheme.clone(),
            skip_tls_verify: config.skip_tls_verify,
            ..CfConfig::default()
        })
        .map_err(CliError::from)?;

        match platform.api_version().await {
            Ok(version) => info!(api_version = %version, "connected to platform"),
            Err(e) => warn!(error = %e, "could not read platform API version"),
        }

        let run_config = RunConfig {
            selection: self.scenarios,
            teardown: self.teardown,
            cached: self.cached || config.cached,
            buildpack_dir: config.buildpack_dir.clone(),
            stack: config.stack.clone(),
        };
        let runner = SuiteRunner::new(Verifier::new(Arc::new(platform), timeouts), run_config);

        let report = runner.run(&scenarios).await.map_err(CliError::from)?;
        print_report(&report, ctx.format);

        if !report.is_success() {
            return Err(CliError::ScenariosFailed {
                failed: report.failed(),
                total: report.scenarios.len(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunCommand,
    }

    #[test]
    fn test_defaults_match_poll_constants() {
        let harness = Harness::try_parse_from(["brats"]).unwrap();
        let timeouts = harness.run.timeouts().unwrap();
        assert_eq!(timeouts, Timeouts::default());
        assert_eq!(harness.run.teardown, TeardownPolicy::Always);
        assert!(harness.run.scenarios.is_empty());
    }

    #[test]
    fn test_repeated_scenario_flags_accumulate() {
        let harness = Harness::try_parse_from([
            "brats",
            "--scenario",
            "node-version-range",
            "-s",
            "multi-buildpack",
            "--teardown",
            "on-success",
        ])
        .unwrap();
        assert_eq!(harness.run.scenarios, vec!["node-version-range", "multi-buildpack"]);
        assert_eq!(harness.run.teardown, TeardownPolicy::OnSuccess);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let harness = Harness::try_parse_from(["brats", "--instance-timeout", "0"]).unwrap();
        assert!(matches!(
            harness.run.timeouts(),
            Err(CliError::InvalidTimeout { flag: "--instance-timeout" })
        ));
    }

    #[test]
    fn test_invalid_teardown_rejected() {
        assert!(Harness::try_parse_from(["brats", "--teardown", "sometimes"]).is_err());
    }
}
