//! Scenario and suite errors.

use std::path::PathBuf;
use std::time::Duration;

use brats_platform::PlatformError;
use serde::Serialize;
use thiserror::Error;

use crate::verifier::Phase;

/// Failure category of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Fixture, archive, or buildpack registration problems before any push.
    Setup,
    /// The platform rejected the app or failed to stage it.
    Push,
    /// Instances never converged to running.
    Timeout,
    /// The app runs but its output is not what the scenario expects.
    Assertion,
}

/// Errors that end a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("cannot {operation} an app in phase {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("failed to register buildpack {name}: {source}")]
    Register {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("push failed: {0}")]
    Push(#[source] PlatformError),

    #[error("instances of {app} not running after {elapsed:?} (last states: {last_states:?})")]
    Timeout {
        app: String,
        elapsed: Duration,
        last_states: Vec<String>,
        last_error: Option<String>,
    },

    #[error("{what} did not match {expected}; observed: {observed}")]
    Assertion {
        what: String,
        expected: String,
        observed: String,
    },
}

impl ScenarioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup(_) | Self::InvalidPhase { .. } | Self::Register { .. } => ErrorKind::Setup,
            Self::Push(_) => ErrorKind::Push,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Assertion { .. } => ErrorKind::Assertion,
        }
    }
}

/// Errors loading or selecting scenarios. Raised before anything runs.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read suite file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid suite file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown scenario(s): {}", .0.join(", "))]
    UnknownScenario(Vec<String>),

    #[error("duplicate scenario name: {0}")]
    DuplicateScenario(String),
}
