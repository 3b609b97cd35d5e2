//! In-memory platform for tests and dry runs.
//!
//! Behavior is scripted up front: the instance states each poll observes,
//! the lines a push writes to stdout, the bodies served per path. Every call
//! is recorded so tests can assert on cleanup.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::{registered_buildpack_name, PlatformClient};
use crate::error::PlatformError;
use crate::types::{ApiVersion, AppConfig, BuildpackKind, InstanceState, LogBuffer};

/// Buildpacks the mock treats as preinstalled.
const BUILTIN_BUILDPACKS: &[&str] = &["nodejs_buildpack", "dotnet_core_buildpack"];

/// A recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Push(AppConfig),
    CreateOrUpdateBuildpack {
        name: String,
        archive: PathBuf,
        stack: Option<String>,
    },
    DeleteBuildpack(String),
    Destroy(String),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    buildpacks: BTreeSet<String>,
    live_apps: BTreeSet<String>,
    logs: HashMap<String, LogBuffer>,
    instance_queues: HashMap<String, VecDeque<Vec<InstanceState>>>,
}

/// Scripted in-memory platform.
#[derive(Debug)]
pub struct MockPlatform {
    api_version: Option<ApiVersion>,
    builtin_buildpacks: BTreeSet<String>,
    push_error: Option<String>,
    register_error: Option<String>,
    push_output: Vec<String>,
    instance_script: Vec<Vec<InstanceState>>,
    bodies: HashMap<String, String>,
    state: Mutex<MockState>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// A platform where every push succeeds and one instance runs at once.
    pub fn new() -> Self {
        Self {
            api_version: Some(ApiVersion::new(2, 100, 0)),
            builtin_buildpacks: BUILTIN_BUILDPACKS.iter().map(|s| s.to_string()).collect(),
            push_error: None,
            register_error: None,
            push_output: Vec::new(),
            instance_script: vec![vec![InstanceState::Running]],
            bodies: HashMap::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Report this API version; `None` makes the version query fail.
    pub fn with_api_version(mut self, version: Option<ApiVersion>) -> Self {
        self.api_version = version;
        self
    }

    /// Fail every push with `message`.
    pub fn with_push_error(mut self, message: impl Into<String>) -> Self {
        self.push_error = Some(message.into());
        self
    }

    /// Fail every buildpack registration with `message` after the buildpack
    /// was created, as a rejected stack update does.
    pub fn with_register_error(mut self, message: impl Into<String>) -> Self {
        self.register_error = Some(message.into());
        self
    }

    /// Lines written to an app's stdout when it is pushed.
    pub fn with_push_output<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_output = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Instance states observed by successive polls of each pushed app.
    /// The last entry repeats forever.
    pub fn with_instance_script(mut self, script: Vec<Vec<InstanceState>>) -> Self {
        self.instance_script = script;
        self
    }

    /// Serve `body` for GET `path` on every app.
    pub fn with_body(mut self, path: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(path.into(), body.into());
        self
    }

    /// All calls recorded so far.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.lock().await.calls.clone()
    }

    /// Buildpacks currently registered, by their platform-visible name.
    pub async fn registered_buildpacks(&self) -> BTreeSet<String> {
        self.state.lock().await.buildpacks.clone()
    }

    /// Apps pushed and not yet destroyed.
    pub async fn live_apps(&self) -> BTreeSet<String> {
        self.state.lock().await.live_apps.clone()
    }

    /// Append a line to an app's stdout after the fact.
    pub async fn emit(&self, app: &str, line: &str) {
        self.stdout(app).await.push_line(line).await;
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn push(&self, app: &AppConfig) -> Result<(), PlatformError> {
        let buffer = self.stdout(&app.name).await;
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::Push(app.clone()));

        for bp in &app.buildpacks {
            let resolvable = BuildpackKind::classify(bp) != BuildpackKind::Registry
                || self.builtin_buildpacks.contains(bp)
                || state.buildpacks.contains(bp);
            if !resolvable {
                return Err(PlatformError::Command {
                    command: format!("cf push {}", app.name),
                    status: "exit status: 1".to_string(),
                    stderr: format!("Buildpack {} not found", bp),
                });
            }
        }

        if let Some(message) = &self.push_error {
            return Err(PlatformError::Command {
                command: format!("cf push {}", app.name),
                status: "exit status: 1".to_string(),
                stderr: message.clone(),
            });
        }

        for line in &self.push_output {
            buffer.push_line(line).await;
        }
        state.live_apps.insert(app.name.clone());
        state
            .instance_queues
            .insert(app.name.clone(), self.instance_script.iter().cloned().collect());
        Ok(())
    }

    async fn instance_states(&self, app: &str) -> Result<Vec<InstanceState>, PlatformError> {
        let mut state = self.state.lock().await;
        let queue = state
            .instance_queues
            .get_mut(app)
            .ok_or_else(|| PlatformError::NotFound(format!("app '{}'", app)))?;

        let states = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(states.unwrap_or_default())
    }

    async fn get_body(&self, app: &str, path: &str) -> Result<String, PlatformError> {
        if !self.state.lock().await.live_apps.contains(app) {
            return Err(PlatformError::NotFound(format!("app '{}'", app)));
        }
        self.bodies
            .get(path)
            .cloned()
            .ok_or_else(|| PlatformError::Status {
                status: 404,
                url: path.to_string(),
                body: String::new(),
            })
    }

    async fn stdout(&self, app: &str) -> LogBuffer {
        self.state
            .lock()
            .await
            .logs
            .entry(app.to_string())
            .or_default()
            .clone()
    }

    async fn create_or_update_buildpack(
        &self,
        name: &str,
        archive: &Path,
        stack: Option<&str>,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::CreateOrUpdateBuildpack {
            name: name.to_string(),
            archive: archive.to_path_buf(),
            stack: stack.map(str::to_string),
        });
        state.buildpacks.insert(registered_buildpack_name(name));
        match &self.register_error {
            Some(message) => Err(PlatformError::Command {
                command: "update-buildpack".to_string(),
                status: "exit status: 1".to_string(),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn delete_buildpack(&self, name: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::DeleteBuildpack(name.to_string()));
        if state.buildpacks.remove(&registered_buildpack_name(name)) {
            Ok(())
        } else {
            Err(PlatformError::NotFound(format!("buildpack '{}'", name)))
        }
    }

    async fn api_version(&self) -> Result<ApiVersion, PlatformError> {
        self.api_version
            .ok_or_else(|| PlatformError::api("CF-Unavailable", "info endpoint unavailable"))
    }

    async fn destroy(&self, app: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::Destroy(app.to_string()));
        state.live_apps.remove(app);
        state.instance_queues.remove(app);
        Ok(())
    }
}
