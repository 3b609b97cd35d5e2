//! Cloud Foundry platform client driven through the `cf` CLI.
//!
//! Mutating operations shell out to `cf` exactly as an operator would.
//! Read-only API queries go through `cf curl`, which reuses the CLI's
//! target and token. Application routes are fetched directly over HTTP.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{registered_buildpack_name, PlatformClient};
use crate::error::PlatformError;
use crate::http::BodyClient;
use crate::types::{ApiVersion, AppConfig, InstanceState, LogBuffer};

/// Lines of stdout kept in an error when a command wrote nothing to stderr.
const ERROR_TAIL_LINES: usize = 20;

/// Buildpack position used when registering a new buildpack.
const BUILDPACK_POSITION: &str = "100";

/// `cf` client configuration.
#[derive(Debug, Clone)]
pub struct CfConfig {
    /// Path to the `cf` executable.
    pub cf_path: PathBuf,

    /// Scheme used to reach application routes.
    pub app_scheme: String,

    /// Accept invalid TLS certificates on application routes.
    pub skip_tls_verify: bool,

    /// Extra environment for every `cf` invocation (e.g. `CF_HOME`).
    pub envs: BTreeMap<String, String>,
}

impl Default for CfConfig {
    fn default() -> Self {
        Self {
            cf_path: PathBuf::from("cf"),
            app_scheme: "https".to_string(),
            skip_tls_verify: false,
            envs: BTreeMap::new(),
        }
    }
}

/// Captured output of one application.
struct AppLogs {
    buffer: LogBuffer,
    tail: Option<JoinHandle<()>>,
}

impl Drop for AppLogs {
    fn drop(&mut self) {
        if let Some(tail) = self.tail.take() {
            tail.abort();
        }
    }
}

/// Platform client backed by the `cf` CLI.
pub struct CfPlatform {
    config: CfConfig,
    http: BodyClient,
    apps: Mutex<HashMap<String, AppLogs>>,
}

impl CfPlatform {
    pub fn new(config: CfConfig) -> Result<Self, PlatformError> {
        let http = BodyClient::new(config.skip_tls_verify)?;
        Ok(Self {
            config,
            http,
            apps: Mutex::new(HashMap::new()),
        })
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.cf_path);
        cmd.args(args)
            .envs(&self.config.envs)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.config.cf_path.display(), args.join(" "))
    }

    /// Run `cf` to completion and return its stdout.
    async fn run(&self, args: &[String]) -> Result<String, PlatformError> {
        let command = self.describe(args);
        debug!(command = %command, "running");

        let output = self
            .command(args)
            .output()
            .await
            .map_err(|source| PlatformError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PlatformError::Command {
                command,
                status: output.status.to_string(),
                stderr: failure_detail(&stderr, &stdout),
            })
        }
    }

    /// Run `cf` to completion, appending each stdout line to `buffer`.
    async fn run_streaming(&self, args: &[String], buffer: &LogBuffer) -> Result<(), PlatformError> {
        let command = self.describe(args);
        debug!(command = %command, "running (streaming)");

        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PlatformError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let pump = async {
            let mut tail = Vec::new();
            if let Some(out) = stdout {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    buffer.push_line(&line).await;
                    tail.push(line);
                    if tail.len() > ERROR_TAIL_LINES {
                        tail.remove(0);
                    }
                }
            }
            tail.join("\n")
        };
        let collect = async {
            let mut text = String::new();
            if let Some(mut err) = stderr {
                let _ = err.read_to_string(&mut text).await;
            }
            text
        };

        let (stdout_tail, stderr_text) = tokio::join!(pump, collect);
        let status = child.wait().await?;

        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::Command {
                command,
                status: status.to_string(),
                stderr: failure_detail(&stderr_text, &stdout_tail),
            })
        }
    }

    /// Query the Cloud Controller through `cf curl`.
    async fn curl<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let body = self.run(&args(["curl", path])).await?;
        parse_cc_response(&body, path)
    }

    async fn app_guid(&self, app: &str) -> Result<String, PlatformError> {
        let guid = self.run(&args(["app", app, "--guid"])).await?;
        let guid = guid.trim();
        if guid.is_empty() {
            return Err(PlatformError::NotFound(format!("app '{}'", app)));
        }
        Ok(guid.to_string())
    }

    async fn app_url(&self, app: &str) -> Result<String, PlatformError> {
        let guid = self.app_guid(app).await?;
        let summary: AppSummary = self.curl(&format!("/v2/apps/{}/summary", guid)).await?;
        route_url(&summary, &self.config.app_scheme)
            .ok_or_else(|| PlatformError::NotFound(format!("route for app '{}'", app)))
    }

    /// Start streaming `cf logs <app>` into the app's buffer.
    async fn start_log_tail(&self, app: &str) -> Result<(), PlatformError> {
        let command_args = args(["logs", app]);
        let command = self.describe(&command_args);

        let mut child = self
            .command(&command_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlatformError::Spawn { command, source })?;

        let buffer = self.stdout(app).await;
        let app_name = app.to_string();
        let handle = tokio::spawn(async move {
            if let Some(out) = child.stdout.take() {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    buffer.push_line(&line).await;
                }
            }
            match child.wait().await {
                Ok(status) => debug!(app = %app_name, %status, "log tail exited"),
                Err(e) => warn!(app = %app_name, error = %e, "log tail failed"),
            }
        });

        let mut apps = self.apps.lock().await;
        if let Some(entry) = apps.get_mut(app) {
            if let Some(previous) = entry.tail.replace(handle) {
                previous.abort();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for CfPlatform {
    async fn push(&self, app: &AppConfig) -> Result<(), PlatformError> {
        info!(app = %app.name, path = %app.path.display(), buildpacks = ?app.buildpacks, "pushing");
        let buffer = self.stdout(&app.name).await;

        let deferred_start = !app.env.is_empty();
        self.run_streaming(&push_args(app, deferred_start), &buffer)
            .await?;

        if deferred_start {
            for (key, value) in &app.env {
                self.run(&args(["set-env", &app.name, key, value])).await?;
            }
            self.run_streaming(&args(["start", &app.name]), &buffer)
                .await?;
        }

        self.start_log_tail(&app.name).await
    }

    async fn instance_states(&self, app: &str) -> Result<Vec<InstanceState>, PlatformError> {
        let guid = self.app_guid(app).await?;
        let instances: BTreeMap<String, InstanceEntry> =
            self.curl(&format!("/v2/apps/{}/instances", guid)).await?;
        Ok(order_instances(instances))
    }

    async fn get_body(&self, app: &str, path: &str) -> Result<String, PlatformError> {
        let base = self.app_url(app).await?;
        self.http.get_text(&BodyClient::url(&base, path)).await
    }

    async fn stdout(&self, app: &str) -> LogBuffer {
        let mut apps = self.apps.lock().await;
        apps.entry(app.to_string())
            .or_insert_with(|| AppLogs {
                buffer: LogBuffer::new(),
                tail: None,
            })
            .buffer
            .clone()
    }

    async fn create_or_update_buildpack(
        &self,
        name: &str,
        archive: &Path,
        stack: Option<&str>,
    ) -> Result<(), PlatformError> {
        let archive = archive.display().to_string();
        let name = registered_buildpack_name(name);
        let name = name.as_str();
        info!(buildpack = %name, archive = %archive, "registering buildpack");

        // Creation fails when the name is taken; the update below covers it.
        match self
            .run(&args([
                "create-buildpack",
                name,
                &archive,
                BUILDPACK_POSITION,
                "--enable",
            ]))
            .await
        {
            Ok(_) if stack.is_none() => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                debug!(buildpack = %name, error = %e, "create-buildpack failed, updating instead")
            }
        }

        let mut update = args(["update-buildpack", name, "-p", &archive]);
        if let Some(stack) = stack {
            update.extend(args(["-s", stack]));
        }
        self.run(&update).await.map(|_| ())
    }

    async fn delete_buildpack(&self, name: &str) -> Result<(), PlatformError> {
        let name = registered_buildpack_name(name);
        info!(buildpack = %name, "deleting buildpack");
        self.run(&args(["delete-buildpack", "-f", &name]))
            .await
            .map(|_| ())
    }

    async fn api_version(&self) -> Result<ApiVersion, PlatformError> {
        let info: InfoResponse = self.curl("/v2/info").await?;
        info.api_version.parse()
    }

    async fn destroy(&self, app: &str) -> Result<(), PlatformError> {
        info!(app = %app, "destroying");
        self.apps.lock().await.remove(app);
        self.run(&args(["delete", "-f", "-r", app])).await.map(|_| ())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments for `cf push`.
pub fn push_args(app: &AppConfig, no_start: bool) -> Vec<String> {
    let mut out = args(["push", &app.name, "-p"]);
    out.push(app.path.display().to_string());

    for buildpack in &app.buildpacks {
        out.extend(args(["-b", buildpack]));
    }
    if let Some(disk) = app.disk.as_deref() {
        out.extend(args(["-k", disk]));
    }
    if let Some(memory) = app.memory.as_deref() {
        out.extend(args(["-m", memory]));
    }
    if let Some(stack) = app.stack.as_deref() {
        out.extend(args(["-s", stack]));
    }
    if let Some(instances) = app.instances {
        out.push("-i".to_string());
        out.push(instances.to_string());
    }
    if no_start {
        out.push("--no-start".to_string());
    }
    out
}

fn failure_detail(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let lines: Vec<&str> = stdout.trim().lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Cloud Controller error document.
#[derive(Debug, Deserialize)]
struct CcError {
    error_code: String,
    #[serde(default)]
    description: String,
}

fn parse_cc_response<T: DeserializeOwned>(body: &str, path: &str) -> Result<T, PlatformError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PlatformError::Parse(format!("response from {}: {}", path, e)))?;

    if value.get("error_code").is_some() {
        let err: CcError = serde_json::from_value(value)
            .map_err(|e| PlatformError::Parse(format!("error from {}: {}", path, e)))?;
        return Err(PlatformError::api(err.error_code, err.description));
    }

    serde_json::from_value(value)
        .map_err(|e| PlatformError::Parse(format!("response from {}: {}", path, e)))
}

#[derive(Debug, Deserialize)]
struct InstanceEntry {
    state: String,
}

/// Order instances by numeric index; the API keys them by string.
fn order_instances(instances: BTreeMap<String, InstanceEntry>) -> Vec<InstanceState> {
    let mut indexed: Vec<(u64, InstanceState)> = instances
        .into_iter()
        .map(|(index, entry)| {
            (
                index.parse().unwrap_or(u64::MAX),
                InstanceState::from(entry.state),
            )
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, state)| state).collect()
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct AppSummary {
    #[serde(default)]
    routes: Vec<RouteSummary>,
}

#[derive(Debug, Deserialize)]
struct RouteSummary {
    #[serde(default)]
    host: String,
    domain: DomainSummary,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct DomainSummary {
    name: String,
}

fn route_url(summary: &AppSummary, scheme: &str) -> Option<String> {
    let route = summary.routes.first()?;
    let host = if route.host.is_empty() {
        route.domain.name.clone()
    } else {
        format!("{}.{}", route.host, route.domain.name)
    };
    Some(format!(
        "{}://{}{}",
        scheme,
        host,
        route.path.trim_end_matches('/')
    ))
}
