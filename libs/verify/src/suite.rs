//! TOML suite files.
//!
//! ```toml
//! [[scenario]]
//! name = "node-version-range"
//! fixture = "brats"
//! log_patterns = ['NodeJS.*8\.\d+\.\d+.*Contributing']
//! body_contains = "Hello World!"
//!
//! [[scenario]]
//! name = "multi-buildpack"
//! fixture = "fake_supply_nodejs_app"
//! buildpacks = ["https://github.com/cloudfoundry/dotnet-core-buildpack#master", "nodejs_buildpack"]
//! disk = "2G"
//! memory = "2G"
//! requires_api_greater_than = "2.65.1"
//! body_matches = 'dotnet: \d+\.\d+\.\d+'
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SuiteError;
use crate::scenario::{BodyExpectation, Pattern, Precondition, Scenario};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteFile {
    #[serde(default)]
    scenario: Vec<ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    fixture: PathBuf,
    #[serde(default)]
    buildpacks: Vec<String>,
    #[serde(default)]
    disk: Option<String>,
    #[serde(default)]
    memory: Option<String>,
    #[serde(default)]
    instances: Option<u32>,
    #[serde(default)]
    log_patterns: Vec<String>,
    #[serde(default = "default_body_path")]
    body_path: String,
    #[serde(default)]
    body_contains: Option<String>,
    #[serde(default)]
    body_matches: Option<String>,
    #[serde(default)]
    requires_api_greater_than: Option<String>,
    #[serde(default)]
    requires_uncached: bool,
    #[serde(default)]
    unbuilt_buildpack: Option<String>,
}

fn default_body_path() -> String {
    "/".to_string()
}

impl ScenarioEntry {
    fn into_scenario(self, fixtures_dir: &Path) -> Result<Scenario, SuiteError> {
        let mut scenario = Scenario::new(self.name, self.fixture).buildpacks(self.buildpacks);
        scenario.description = self.description;
        scenario.disk = self.disk;
        scenario.memory = self.memory;
        if let Some(count) = self.instances {
            scenario = scenario.instances(count);
        }

        for pattern in &self.log_patterns {
            scenario = scenario.expect_log(Pattern::new(pattern)?);
        }
        if let Some(needle) = self.body_contains {
            scenario = scenario.expect_body(self.body_path.clone(), BodyExpectation::Contains(needle));
        }
        if let Some(pattern) = self.body_matches.as_deref() {
            scenario = scenario.expect_body(
                self.body_path.clone(),
                BodyExpectation::Matches(Pattern::new(pattern)?),
            );
        }

        if let Some(version) = self.requires_api_greater_than {
            scenario = scenario.require(Precondition::ApiGreaterThan(version));
        }
        if self.requires_uncached {
            scenario = scenario.require(Precondition::Uncached);
        }
        if let Some(name) = self.unbuilt_buildpack {
            scenario = scenario.unbuilt_buildpack(name);
        }

        Ok(scenario.resolve_fixture(fixtures_dir))
    }
}

/// Parse suite text. Relative fixtures resolve against `fixtures_dir`.
pub fn parse_suite(text: &str, fixtures_dir: &Path) -> Result<Vec<Scenario>, SuiteError> {
    let file: SuiteFile = toml::from_str(text)?;

    let mut seen = BTreeSet::new();
    let mut scenarios = Vec::with_capacity(file.scenario.len());
    for entry in file.scenario {
        if !seen.insert(entry.name.clone()) {
            return Err(SuiteError::DuplicateScenario(entry.name));
        }
        scenarios.push(entry.into_scenario(fixtures_dir)?);
    }
    Ok(scenarios)
}

/// Load a suite file from disk.
pub fn load_suite(path: &Path, fixtures_dir: &Path) -> Result<Vec<Scenario>, SuiteError> {
    let text = std::fs::read_to_string(path).map_err(|source| SuiteError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_suite(&text, fixtures_dir)
}
