//! Sequential suite runner.
//!
//! Each scenario gets its own app handle, buildpack package and teardown.
//! A failing scenario is recorded and the next one starts from scratch.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{ErrorKind, ScenarioError, SuiteError};
use crate::package::BuildpackPackage;
use crate::scenario::{Precondition, Scenario};
use crate::verifier::{DeployedApp, Resources, Timeouts, Verifier};

/// When deployed apps are deleted after a scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownPolicy {
    /// Always delete the app.
    #[default]
    Always,
    /// Keep failed apps around for inspection.
    OnSuccess,
    /// Never delete apps; something else cleans the space.
    Never,
}

impl TeardownPolicy {
    fn should_destroy(&self, passed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::OnSuccess => passed,
            Self::Never => false,
        }
    }
}

impl FromStr for TeardownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "on-success" => Ok(Self::OnSuccess),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "invalid teardown policy '{}' (expected always, on-success or never)",
                other
            )),
        }
    }
}

impl fmt::Display for TeardownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Always => "always",
            Self::OnSuccess => "on-success",
            Self::Never => "never",
        })
    }
}

/// Run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Scenario names to run. Empty runs everything.
    pub selection: Vec<String>,

    pub teardown: TeardownPolicy,

    /// The buildpack under test is a pre-packaged cached artifact.
    pub cached: bool,

    /// Buildpack source checkout, packaged for unbuilt scenarios.
    pub buildpack_dir: PathBuf,

    /// Stack passed when registering buildpacks and pushing.
    pub stack: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            selection: Vec::new(),
            teardown: TeardownPolicy::default(),
            cached: false,
            buildpack_dir: PathBuf::from("."),
            stack: None,
        }
    }
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

impl Outcome {
    fn failed(err: &ScenarioError) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_warnings: Vec<String>,
}

/// Results of a whole run, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    fn count(&self, label: &str) -> usize {
        self.scenarios
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn passed(&self) -> usize {
        self.count("passed")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    /// True when no scenario failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs scenarios one after another against a single verifier.
pub struct SuiteRunner {
    verifier: Verifier,
    config: RunConfig,
}

impl SuiteRunner {
    pub fn new(verifier: Verifier, config: RunConfig) -> Self {
        Self { verifier, config }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.verifier.timeouts()
    }

    /// Pick the configured scenarios, in the order they were defined.
    pub fn select<'a>(&self, scenarios: &'a [Scenario]) -> Result<Vec<&'a Scenario>, SuiteError> {
        if self.config.selection.is_empty() {
            return Ok(scenarios.iter().collect());
        }

        let unknown: Vec<String> = self
            .config
            .selection
            .iter()
            .filter(|name| !scenarios.iter().any(|s| &s.name == *name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(SuiteError::UnknownScenario(unknown));
        }

        Ok(scenarios
            .iter()
            .filter(|s| self.config.selection.contains(&s.name))
            .collect())
    }

    /// Run the selected scenarios sequentially.
    pub async fn run(&self, scenarios: &[Scenario]) -> Result<SuiteReport, SuiteError> {
        let selected = self.select(scenarios)?;
        info!(count = selected.len(), teardown = %self.config.teardown, "running scenarios");

        let mut report = SuiteReport::default();
        for scenario in selected {
            let span = info_span!("scenario", name = %scenario.name);
            let result = self.run_scenario(scenario).instrument(span).await;
            report.scenarios.push(result);
        }

        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "run complete"
        );
        Ok(report)
    }

    /// Run one scenario from preconditions through teardown.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            outcome: Outcome::Passed,
            app_name: None,
            started_at,
            duration_ms: 0,
            cleanup_warnings: Vec::new(),
        };

        if let Some(reason) = self.unmet_precondition(scenario).await {
            info!(reason = %reason, "skipping");
            report.outcome = Outcome::Skipped { reason };
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }

        let mut registered = None;
        let mut app = None;
        let result = self.execute(scenario, &mut registered, &mut app).await;

        report.outcome = match &result {
            Ok(()) => Outcome::Passed,
            Err(e) => Outcome::failed(e),
        };

        if let Some(app) = app {
            report.app_name = Some(app.name().to_string());
            if self.config.teardown.should_destroy(result.is_ok()) {
                report.cleanup_warnings.extend(self.verifier.destroy(app).await);
            } else {
                info!(app = %app.name(), "leaving app deployed");
            }
        }
        if let Some(name) = registered {
            report
                .cleanup_warnings
                .extend(self.verifier.unregister_buildpack(&name).await);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        match &report.outcome {
            Outcome::Failed { message, .. } => warn!(error = %message, "scenario failed"),
            _ => info!(duration_ms = report.duration_ms, "scenario passed"),
        }
        report
    }

    async fn unmet_precondition(&self, scenario: &Scenario) -> Option<String> {
        for precondition in &scenario.preconditions {
            match precondition {
                Precondition::Uncached if self.config.cached => {
                    return Some("skipping cached buildpack test".to_string());
                }
                Precondition::Uncached => {}
                Precondition::ApiGreaterThan(version) => {
                    match self.verifier.platform().api_greater_than(version).await {
                        Ok(true) => {}
                        Ok(false) => {
                            return Some(format!("platform API version is not greater than {}", version))
                        }
                        Err(e) => {
                            return Some(format!("could not determine API version: {}", e))
                        }
                    }
                }
            }
        }
        None
    }

    /// The scenario body. Anything it creates is handed back through
    /// `registered` and `app` so teardown runs on every path.
    async fn execute(
        &self,
        scenario: &Scenario,
        registered: &mut Option<String>,
        app: &mut Option<DeployedApp>,
    ) -> Result<(), ScenarioError> {
        if let Some(name) = scenario.unbuilt_buildpack.as_deref() {
            let package = BuildpackPackage::from_git_head(&self.config.buildpack_dir, name).await?;
            // A registration that fails partway can still leave the buildpack behind.
            *registered = Some(name.to_string());
            self.verifier
                .register_buildpack(name, package.archive(), self.config.stack.as_deref())
                .await?;
        }

        let resources = Resources {
            disk: scenario.disk.clone(),
            memory: scenario.memory.clone(),
            instances: scenario.instances,
            stack: self.config.stack.clone(),
        };
        let deployed = app.insert(self.verifier.stage(
            &scenario.name,
            &scenario.fixture,
            scenario.buildpacks.clone(),
            resources,
        )?);

        self.verifier.push(deployed).await?;
        self.verifier.await_running(deployed).await?;

        if !scenario.expected_states.is_empty() {
            self.verifier
                .assert_instance_states(deployed, &scenario.expected_states)?;
        }
        for pattern in &scenario.log_patterns {
            self.verifier.assert_log_matches(deployed, pattern).await?;
        }
        for check in &scenario.body_checks {
            self.verifier
                .assert_body_matches(deployed, &check.path, &check.expectation)
                .await?;
        }
        Ok(())
    }
}
