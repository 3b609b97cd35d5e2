//! Runner configuration.
//!
//! Values come from, in increasing precedence:
//! - `config.json` in the platform config directory
//! - `BRATS_*` environment variables
//! - command-line flags

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "brats", "brats")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the `cf` executable.
    pub cf_path: PathBuf,

    /// Buildpack source checkout under test.
    pub buildpack_dir: PathBuf,

    /// Fixture apps. Defaults to `<buildpack_dir>/fixtures`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures_dir: Option<PathBuf>,

    /// The buildpack under test is a cached artifact.
    pub cached: bool,

    /// Scheme used to reach app routes.
    pub app_scheme: String,

    /// Accept self-signed certificates on app routes.
    pub skip_tls_verify: bool,

    /// Stack for buildpack registration and pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cf_path: PathBuf::from("cf"),
            buildpack_dir: PathBuf::from("."),
            fixtures_dir: None,
            cached: false,
            app_scheme: "https".to_string(),
            skip_tls_verify: false,
            stack: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from disk (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            Self::from_json(&contents)
                .with_context(|| format!("Failed to parse config from {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Override fields from `BRATS_*` variables as returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRATS_CF_PATH") {
            self.cf_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BRATS_BUILDPACK_DIR") {
            self.buildpack_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BRATS_FIXTURES_DIR") {
            self.fixtures_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("BRATS_CACHED") {
            self.cached = parse_bool("BRATS_CACHED", &v)?;
        }
        if let Some(v) = lookup("BRATS_APP_SCHEME") {
            self.app_scheme = v;
        }
        if let Some(v) = lookup("BRATS_SKIP_TLS_VERIFY") {
            self.skip_tls_verify = parse_bool("BRATS_SKIP_TLS_VERIFY", &v)?;
        }
        if let Some(v) = lookup("BRATS_STACK") {
            self.stack = Some(v);
        }
        if let Some(v) = lookup("BRATS_LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// Directory fixture names resolve against.
    pub fn fixtures_dir(&self) -> PathBuf {
        self.fixtures_dir
            .clone()
            .unwrap_or_else(|| self.buildpack_dir.join("fixtures"))
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<PathBuf> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;

        let path = dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        Ok(path)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got {:?}", key, other),
    }
}
