//! Deployment verifier.
//!
//! Drives one application through `Unstaged → Staged → Pushed → {Running,
//! Failed, TimedOut}` and checks what it observes along the way. Every wait
//! is bounded by [`brats_poll::poll_until`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use brats_platform::{AppConfig, InstanceState, LogBuffer, PlatformClient};
use brats_poll::{classify, poll_until, ConvergenceStatus, PollPolicy};
use serde::Serialize;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::error::ScenarioError;
use crate::scenario::{BodyExpectation, Pattern};

/// Longest scenario prefix kept in a generated app name. Route hosts are
/// limited to 63 characters and the ULID suffix takes 27.
const MAX_NAME_PREFIX: usize = 30;

/// Lines of stdout quoted in a failed log assertion.
const OBSERVED_TAIL_LINES: usize = 40;

/// Lifecycle phase of a deployed application handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unstaged,
    Staged,
    Pushed,
    Running,
    Failed,
    TimedOut,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unstaged => "unstaged",
            Self::Staged => "staged",
            Self::Pushed => "pushed",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Resource limits applied at push time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub disk: Option<String>,
    pub memory: Option<String>,
    pub instances: Option<u32>,
    pub stack: Option<String>,
}

/// Waits used by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound for instances to become running.
    pub instances: PollPolicy,
    /// Retry window for log and body assertions.
    pub assertion: PollPolicy,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            instances: PollPolicy::instances(),
            assertion: PollPolicy::assertion(),
        }
    }
}

/// One deployment, owned by the scenario that staged it.
#[derive(Debug)]
pub struct DeployedApp {
    config: AppConfig,
    phase: Phase,
    last_states: Vec<InstanceState>,
    stdout: Option<LogBuffer>,
}

impl DeployedApp {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Instance states seen by the most recent poll.
    pub fn last_states(&self) -> &[InstanceState] {
        &self.last_states
    }

    /// Captured stdout so far; empty before push.
    pub async fn stdout_text(&self) -> String {
        match &self.stdout {
            Some(buffer) => buffer.contents().await,
            None => String::new(),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), ScenarioError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ScenarioError::InvalidPhase {
                operation,
                phase: self.phase,
            })
        }
    }
}

/// Generate an application name unique to this run.
pub fn unique_app_name(prefix: &str) -> String {
    let prefix: String = prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(MAX_NAME_PREFIX)
        .collect();
    format!("{}-{}", prefix.trim_matches('-'), Ulid::new()).to_lowercase()
}

/// Drives deployments against a platform.
#[derive(Clone)]
pub struct Verifier {
    platform: Arc<dyn PlatformClient>,
    timeouts: Timeouts,
}

impl Verifier {
    pub fn new(platform: Arc<dyn PlatformClient>, timeouts: Timeouts) -> Self {
        Self { platform, timeouts }
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Bind a fixture directory and buildpacks to a new app handle.
    ///
    /// No platform calls are made.
    pub fn stage(
        &self,
        name_prefix: &str,
        fixture: &Path,
        buildpacks: Vec<String>,
        resources: Resources,
    ) -> Result<DeployedApp, ScenarioError> {
        if !fixture.is_dir() {
            return Err(ScenarioError::Setup(format!(
                "fixture directory {} does not exist",
                fixture.display()
            )));
        }

        let mut config = AppConfig::new(unique_app_name(name_prefix), fixture);
        config.buildpacks = buildpacks;
        config.disk = resources.disk;
        config.memory = resources.memory;
        config.instances = resources.instances;
        config.stack = resources.stack;

        debug!(app = %config.name, fixture = %fixture.display(), "staged");
        Ok(DeployedApp {
            config,
            phase: Phase::Staged,
            last_states: Vec::new(),
            stdout: None,
        })
    }

    /// Submit a staged app to the platform.
    pub async fn push(&self, app: &mut DeployedApp) -> Result<(), ScenarioError> {
        app.require("push", &[Phase::Staged])?;
        app.stdout = Some(self.platform.stdout(app.name()).await);

        info!(app = %app.name(), buildpacks = ?app.config.buildpacks, "pushing app");
        match self.platform.push(&app.config).await {
            Ok(()) => {
                app.phase = Phase::Pushed;
                Ok(())
            }
            Err(e) => {
                app.phase = Phase::Failed;
                warn!(app = %app.name(), error = %e, "push failed");
                Err(ScenarioError::Push(e))
            }
        }
    }

    /// Wait until every instance reports running.
    ///
    /// Partial readiness and transient query errors are retried until the
    /// instance timeout elapses.
    pub async fn await_running(
        &self,
        app: &mut DeployedApp,
    ) -> Result<Vec<InstanceState>, ScenarioError> {
        app.require("await", &[Phase::Pushed, Phase::Running])?;

        let platform = self.platform.clone();
        let name = app.name().to_string();
        let outcome = poll_until(
            || {
                let platform = platform.clone();
                let name = name.clone();
                async move { platform.instance_states(&name).await }
            },
            |result| match result {
                Ok(states) => {
                    let status = classify(states.iter(), |s| s.is_running(), |s| s.is_failed());
                    if status == ConvergenceStatus::Diverged {
                        warn!(app = %name, states = ?states, "instance crashed, still waiting");
                    }
                    status.is_converged()
                }
                Err(e) if e.is_transient() => {
                    debug!(app = %name, error = %e, "instance query failed");
                    false
                }
                Err(e) => {
                    warn!(app = %name, error = %e, "instance query failed, still waiting");
                    false
                }
            },
            self.timeouts.instances,
        )
        .await;

        let elapsed = outcome.elapsed;
        let timed_out = outcome.timed_out;
        let mut last_error = None;
        match outcome.value {
            Some(Ok(states)) => app.last_states = states,
            Some(Err(e)) => last_error = Some(e.to_string()),
            None => {}
        }

        if timed_out {
            app.phase = Phase::TimedOut;
            warn!(app = %app.name(), ?elapsed, states = ?app.last_states, "instances did not converge");
            return Err(ScenarioError::Timeout {
                app: app.name().to_string(),
                elapsed,
                last_states: app.last_states.iter().map(ToString::to_string).collect(),
                last_error,
            });
        }

        app.phase = Phase::Running;
        info!(app = %app.name(), ?elapsed, "instances running");
        Ok(app.last_states.clone())
    }

    /// Require the last observed instance states to equal `expected` exactly.
    pub fn assert_instance_states(
        &self,
        app: &DeployedApp,
        expected: &[InstanceState],
    ) -> Result<(), ScenarioError> {
        app.require("check instances of", &[Phase::Running])?;
        if app.last_states == expected {
            Ok(())
        } else {
            Err(ScenarioError::Assertion {
                what: "instance states".to_string(),
                expected: format!("{:?}", display_states(expected)),
                observed: format!("{:?}", display_states(&app.last_states)),
            })
        }
    }

    /// Wait for the app's stdout to match `pattern`.
    pub async fn assert_log_matches(
        &self,
        app: &DeployedApp,
        pattern: &Pattern,
    ) -> Result<(), ScenarioError> {
        app.require("check logs of", &[Phase::Pushed, Phase::Running])?;
        let buffer = match &app.stdout {
            Some(buffer) => buffer.clone(),
            None => self.platform.stdout(app.name()).await,
        };

        let outcome = poll_until(
            || {
                let buffer = buffer.clone();
                async move { buffer.contents().await }
            },
            |text| pattern.is_match(text),
            self.timeouts.assertion,
        )
        .await;

        if outcome.is_satisfied() {
            debug!(app = %app.name(), pattern = %pattern, "stdout matched");
            return Ok(());
        }

        Err(ScenarioError::Assertion {
            what: "stdout".to_string(),
            expected: pattern.to_string(),
            observed: tail_lines(&outcome.value.unwrap_or_default(), OBSERVED_TAIL_LINES),
        })
    }

    /// Wait for GET `path` on the app to satisfy `expectation`.
    pub async fn assert_body_matches(
        &self,
        app: &DeployedApp,
        path: &str,
        expectation: &BodyExpectation,
    ) -> Result<(), ScenarioError> {
        app.require("check body of", &[Phase::Pushed, Phase::Running])?;

        let platform = self.platform.clone();
        let name = app.name().to_string();
        let outcome = poll_until(
            || {
                let platform = platform.clone();
                let name = name.clone();
                let path = path.to_string();
                async move { platform.get_body(&name, &path).await }
            },
            |result| matches!(result, Ok(body) if expectation.is_met(body)),
            self.timeouts.assertion,
        )
        .await;

        if outcome.is_satisfied() {
            debug!(app = %app.name(), path, "body matched");
            return Ok(());
        }

        let observed = match outcome.value {
            Some(Ok(body)) => body,
            Some(Err(e)) => format!("error: {}", e),
            None => "no response".to_string(),
        };
        Err(ScenarioError::Assertion {
            what: format!("GET {}", path),
            expected: expectation.to_string(),
            observed,
        })
    }

    /// Register a buildpack archive so later pushes can reference it.
    pub async fn register_buildpack(
        &self,
        name: &str,
        archive: &Path,
        stack: Option<&str>,
    ) -> Result<(), ScenarioError> {
        self.platform
            .create_or_update_buildpack(name, archive, stack)
            .await
            .map_err(|source| ScenarioError::Register {
                name: name.to_string(),
                source,
            })
    }

    /// Remove a registered buildpack. Best-effort: failures are logged and
    /// returned as a message.
    pub async fn unregister_buildpack(&self, name: &str) -> Option<String> {
        match self.platform.delete_buildpack(name).await {
            Ok(()) => None,
            Err(e) => {
                warn!(buildpack = %name, error = %e, "failed to delete buildpack");
                Some(format!("delete buildpack {}: {}", name, e))
            }
        }
    }

    /// Delete the app. Best-effort: failures are logged and returned as a
    /// message.
    pub async fn destroy(&self, app: DeployedApp) -> Option<String> {
        if app.phase == Phase::Staged {
            return None;
        }
        match self.platform.destroy(app.name()).await {
            Ok(()) => None,
            Err(e) => {
                warn!(app = %app.name(), error = %e, "failed to destroy app");
                Some(format!("destroy {}: {}", app.name(), e))
            }
        }
    }
}

fn display_states(states: &[InstanceState]) -> Vec<&str> {
    states.iter().map(InstanceState::as_str).collect()
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use brats_platform::MockPlatform;

    use super::*;

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            instances: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(120)),
            assertion: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(10)),
        }
    }

    fn verifier(platform: MockPlatform) -> (Verifier, Arc<MockPlatform>) {
        let platform = Arc::new(platform);
        (Verifier::new(platform.clone(), fast_timeouts()), platform)
    }

    fn fixture() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_unique_app_name() {
        let a = unique_app_name("Node Version_Range");
        let b = unique_app_name("Node Version_Range");
        assert_ne!(a, b);
        assert!(a.starts_with("node-version-range-"));
        assert!(a.len() <= 63);
        assert_eq!(a, a.to_lowercase());
    }

    #[test]
    fn test_stage_requires_fixture_dir() {
        let (verifier, _) = verifier(MockPlatform::new());
        let err = verifier
            .stage("missing", Path::new("/nonexistent/fixture"), vec![], Resources::default())
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Setup(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_phases() {
        let dir = fixture();
        let (verifier, _) = verifier(
            MockPlatform::new()
                .with_instance_script(vec![
                    vec![],
                    vec![InstanceState::Starting],
                    vec![InstanceState::Running],
                ])
                .with_push_output(["NodeJS 8.9.4: Contributing to layer"])
                .with_body("/", "Hello World!"),
        );

        let mut app = verifier
            .stage("happy", dir.path(), vec![], Resources::default())
            .unwrap();
        assert_eq!(app.phase(), Phase::Staged);

        verifier.push(&mut app).await.unwrap();
        assert_eq!(app.phase(), Phase::Pushed);

        let states = verifier.await_running(&mut app).await.unwrap();
        assert_eq!(states, vec![InstanceState::Running]);
        assert_eq!(app.phase(), Phase::Running);

        verifier
            .assert_instance_states(&app, &[InstanceState::Running])
            .unwrap();
        verifier
            .assert_log_matches(&app, &Pattern::new(r"NodeJS.*8\.\d+\.\d+.*Contributing").unwrap())
            .await
            .unwrap();
        verifier
            .assert_body_matches(&app, "/", &BodyExpectation::Contains("Hello World!".into()))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_running_times_out_on_partial_readiness() {
        let dir = fixture();
        let (verifier, _) = verifier(MockPlatform::new().with_instance_script(vec![vec![
            InstanceState::Running,
            InstanceState::Starting,
        ]]));

        let mut app = verifier
            .stage("partial", dir.path(), vec![], Resources::default())
            .unwrap();
        verifier.push(&mut app).await.unwrap();

        let start = tokio::time::Instant::now();
        let err = verifier.await_running(&mut app).await.unwrap_err();
        assert!(start.elapsed() <= Duration::from_secs(121));
        assert_eq!(app.phase(), Phase::TimedOut);

        match err {
            ScenarioError::Timeout { last_states, .. } => {
                assert_eq!(last_states, vec!["RUNNING", "STARTING"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_instance_state_mismatch_is_assertion() {
        let dir = fixture();
        let (verifier, _) = verifier(MockPlatform::new().with_instance_script(vec![vec![
            InstanceState::Running,
            InstanceState::Running,
        ]]));

        let mut app = verifier
            .stage("two", dir.path(), vec![], Resources::default())
            .unwrap();
        verifier.push(&mut app).await.unwrap();
        verifier.await_running(&mut app).await.unwrap();

        let err = verifier
            .assert_instance_states(&app, &[InstanceState::Running])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Assertion);
    }

    #[tokio::test]
    async fn test_push_failure_moves_to_failed() {
        let dir = fixture();
        let (verifier, _) = verifier(MockPlatform::new().with_push_error("staging failed"));

        let mut app = verifier
            .stage("broken", dir.path(), vec![], Resources::default())
            .unwrap();
        let err = verifier.push(&mut app).await.unwrap_err();
        assert!(matches!(err, ScenarioError::Push(_)));
        assert_eq!(app.phase(), Phase::Failed);

        let err = verifier.await_running(&mut app).await.unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidPhase { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_assertion_sees_late_lines() {
        let dir = fixture();
        let (verifier, platform) = verifier(MockPlatform::new());

        let mut app = verifier
            .stage("late", dir.path(), vec![], Resources::default())
            .unwrap();
        verifier.push(&mut app).await.unwrap();

        let name = app.name().to_string();
        let emitter = platform.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            emitter.emit(&name, "-----> Installing node_modules").await;
        });

        verifier
            .assert_log_matches(&app, &Pattern::new("Installing node_modules").unwrap())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_assertion_reports_observed_body() {
        let dir = fixture();
        let (verifier, _) = verifier(MockPlatform::new().with_body("/", "dotnet: missing"));

        let mut app = verifier
            .stage("body", dir.path(), vec![], Resources::default())
            .unwrap();
        verifier.push(&mut app).await.unwrap();

        let err = verifier
            .assert_body_matches(
                &app,
                "/",
                &BodyExpectation::Matches(Pattern::new(r"dotnet: \d+\.\d+\.\d+").unwrap()),
            )
            .await
            .unwrap_err();
        match err {
            ScenarioError::Assertion { observed, .. } => assert_eq!(observed, "dotnet: missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_destroy_staged_app_is_noop() {
        let dir = fixture();
        let (verifier, platform) = verifier(MockPlatform::new());
        let app = verifier
            .stage("never-pushed", dir.path(), vec![], Resources::default())
            .unwrap();
        assert!(verifier.destroy(app).await.is_none());
        assert!(platform.calls().await.is_empty());
    }
}
