//! Built-in scenarios for the Node.js buildpack.

use std::path::Path;

use brats_platform::registered_buildpack_name;

use crate::error::SuiteError;
use crate::scenario::{BodyExpectation, Pattern, Precondition, Scenario};

/// Name the source-tree buildpack is registered under.
pub const UNBUILT_BUILDPACK: &str = "unbuilt-v3-node";

/// Multi-buildpack pushes need an API newer than this.
pub const MULTI_BUILDPACK_MIN_API: &str = "2.65.1";

/// Remote supply buildpack used by the multi-buildpack scenario.
pub const DOTNET_CORE_BUILDPACK: &str = "https://github.com/cloudfoundry/dotnet-core-buildpack#master";

const NODE_CONTRIBUTING: &str = r".*NodeJS.*8\.\d+\.\d+.*:.*Contributing.*";
const NODE_MODULES: &str = "Installing node_modules";
const HELLO_WORLD: &str = "Hello World!";

/// Scenarios exercising the Node.js buildpack, with fixtures resolved
/// against `fixtures_dir`.
pub fn nodejs_scenarios(fixtures_dir: &Path) -> Result<Vec<Scenario>, SuiteError> {
    let scenarios = vec![
        Scenario::new("node-version-range", "brats")
            .describe("resolves a nodeJS version range from package.json")
            .expect_log(Pattern::new(NODE_CONTRIBUTING)?)
            .expect_log(Pattern::new(NODE_MODULES)?)
            .expect_body("/", BodyExpectation::Contains(HELLO_WORLD.to_string())),
        Scenario::new("unbuilt-buildpack", "brats")
            .describe("runs with a buildpack packaged from the source tree")
            .require(Precondition::Uncached)
            .unbuilt_buildpack(UNBUILT_BUILDPACK)
            .buildpacks([registered_buildpack_name(UNBUILT_BUILDPACK)])
            .expect_log(Pattern::new(NODE_CONTRIBUTING)?)
            .expect_body("/", BodyExpectation::Contains(HELLO_WORLD.to_string())),
        Scenario::new("multi-buildpack", "fake_supply_nodejs_app")
            .describe("installs a supplied dotnet dependency and launches with nodejs as final")
            .require(Precondition::ApiGreaterThan(MULTI_BUILDPACK_MIN_API.to_string()))
            .disk("2G")
            .memory("2G")
            .buildpacks([DOTNET_CORE_BUILDPACK, "nodejs_buildpack"])
            .expect_log(Pattern::new("Supplying Dotnet Core")?)
            .expect_body(
                "/",
                BodyExpectation::Matches(Pattern::new(r"dotnet: \d+\.\d+\.\d+")?),
            ),
    ];

    Ok(scenarios
        .into_iter()
        .map(|s| s.resolve_fixture(fixtures_dir))
        .collect())
}
