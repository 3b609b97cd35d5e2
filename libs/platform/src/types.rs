//! Value types shared by platform clients.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::PlatformError;

/// Everything a push needs to know about an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name, unique within the target space.
    pub name: String,

    /// Fixture directory uploaded as application bits.
    pub path: PathBuf,

    /// Buildpacks in detection/supply order. Empty means platform default.
    #[serde(default)]
    pub buildpacks: Vec<String>,

    /// Disk quota, e.g. `2G`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,

    /// Memory limit, e.g. `512M`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Stack to stage on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Instance count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,

    /// Environment variables set before the app starts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            buildpacks: Vec::new(),
            disk: None,
            memory: None,
            stack: None,
            instances: None,
            env: BTreeMap::new(),
        }
    }
}

/// Platform-reported lifecycle state of one application instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    Running,
    Starting,
    Crashed,
    Down,
    Other(String),
}

impl InstanceState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "RUNNING",
            Self::Starting => "STARTING",
            Self::Crashed => "CRASHED",
            Self::Down => "DOWN",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Crashed)
    }
}

impl From<&str> for InstanceState {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "STARTING" => Self::Starting,
            "CRASHED" => Self::Crashed,
            "DOWN" => Self::Down,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl From<String> for InstanceState {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<InstanceState> for String {
    fn from(state: InstanceState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a buildpack identifier will be resolved by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildpackKind {
    /// Registered by name, e.g. `nodejs_buildpack`.
    Registry,
    /// Git or archive URL, e.g. `https://github.com/org/bp#master`.
    Remote,
    /// Path on the local filesystem.
    Local,
}

impl BuildpackKind {
    pub fn classify(reference: &str) -> Self {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            Self::Remote
        } else if reference.starts_with('/')
            || reference.starts_with("./")
            || reference.starts_with("../")
        {
            Self::Local
        } else {
            Self::Registry
        }
    }
}

/// Platform API version, compared numerically component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ApiVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let mut parts = trimmed.split('.');
        let mut next = |required: bool| -> Result<u64, PlatformError> {
            match parts.next() {
                Some(part) => part
                    .parse()
                    .map_err(|_| PlatformError::Parse(format!("API version '{}'", s))),
                None if required => Err(PlatformError::Parse(format!("API version '{}'", s))),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            return Err(PlatformError::Parse(format!("API version '{}'", s)));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Accumulated stdout of one application.
///
/// Cloning shares the underlying buffer; writers append while readers take
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<RwLock<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line, terminating it with a newline.
    pub async fn push_line(&self, line: &str) {
        let mut buf = self.inner.write().await;
        buf.push_str(line);
        buf.push('\n');
    }

    /// Snapshot of everything captured so far.
    pub async fn contents(&self) -> String {
        self.inner.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
