//! Scenario definitions.
//!
//! A scenario is immutable once built: the runner reads it, never writes it.

use std::fmt;
use std::path::{Path, PathBuf};

use brats_platform::InstanceState;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::SuiteError;

/// A compiled regular expression that remembers its source.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, SuiteError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| SuiteError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.0.as_str())
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// What a response body must look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyExpectation {
    Contains(String),
    Matches(Pattern),
}

impl BodyExpectation {
    pub fn is_met(&self, body: &str) -> bool {
        match self {
            Self::Contains(needle) => body.contains(needle.as_str()),
            Self::Matches(pattern) => pattern.is_match(body),
        }
    }
}

impl fmt::Display for BodyExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(needle) => write!(f, "{:?}", needle),
            Self::Matches(pattern) => write!(f, "{}", pattern),
        }
    }
}

/// A GET request and the expectation on its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BodyCheck {
    pub path: String,
    pub expectation: BodyExpectation,
}

/// Condition evaluated before any platform side effect; unmet means skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// Platform API version must be strictly greater than this.
    ApiGreaterThan(String),
    /// The run must be against a source checkout, not a cached artifact.
    Uncached,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiGreaterThan(version) => write!(f, "API version > {}", version),
            Self::Uncached => f.write_str("uncached buildpack"),
        }
    }
}

/// A named deployment test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fixture: PathBuf,
    pub buildpacks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    /// Exact instance states required once running. Empty skips the check.
    pub expected_states: Vec<InstanceState>,
    pub log_patterns: Vec<Pattern>,
    pub body_checks: Vec<BodyCheck>,
    pub preconditions: Vec<Precondition>,
    /// Package the buildpack source tree and register it under this name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unbuilt_buildpack: Option<String>,
}

impl Scenario {
    /// A scenario pushing `fixture` with the platform's default buildpacks
    /// and expecting a single running instance.
    pub fn new(name: impl Into<String>, fixture: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fixture: fixture.into(),
            buildpacks: Vec::new(),
            disk: None,
            memory: None,
            instances: None,
            expected_states: vec![InstanceState::Running],
            log_patterns: Vec::new(),
            body_checks: Vec::new(),
            preconditions: Vec::new(),
            unbuilt_buildpack: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn buildpacks<I, S>(mut self, buildpacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buildpacks = buildpacks.into_iter().map(Into::into).collect();
        self
    }

    pub fn disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = Some(disk.into());
        self
    }

    pub fn memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    /// Set the instance count; the expected states follow it.
    pub fn instances(mut self, count: u32) -> Self {
        self.instances = Some(count);
        self.expected_states = vec![InstanceState::Running; count as usize];
        self
    }

    pub fn expect_states(mut self, states: Vec<InstanceState>) -> Self {
        self.expected_states = states;
        self
    }

    pub fn expect_log(mut self, pattern: Pattern) -> Self {
        self.log_patterns.push(pattern);
        self
    }

    pub fn expect_body(mut self, path: impl Into<String>, expectation: BodyExpectation) -> Self {
        self.body_checks.push(BodyCheck {
            path: path.into(),
            expectation,
        });
        self
    }

    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn unbuilt_buildpack(mut self, name: impl Into<String>) -> Self {
        self.unbuilt_buildpack = Some(name.into());
        self
    }

    /// Resolve a relative fixture path against `fixtures_dir`.
    pub fn resolve_fixture(mut self, fixtures_dir: &Path) -> Self {
        if self.fixture.is_relative() {
            self.fixture = fixtures_dir.join(&self.fixture);
        }
        self
    }
}
