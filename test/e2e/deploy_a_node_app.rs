//! Live acceptance run of the Node.js catalog.
//!
//! Needs a logged-in `cf` CLI targeting an org and space, and a buildpack
//! checkout to package the unbuilt scenario from.
//!
//! ## Running
//!
//! ```bash
//! BRATS_BUILDPACK_DIR=~/src/nodejs-buildpack \
//!   cargo test -p brats-e2e --test deploy_a_node_app -- --ignored
//! ```
//!
//! Set `BRATS_CACHED=1` when the installed buildpack is a cached artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brats_platform::{CfConfig, CfPlatform};
use brats_verify::{nodejs_scenarios, Outcome, RunConfig, SuiteRunner, Timeouts, Verifier};
use tracing::info;

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn runner(selection: &[&str]) -> SuiteRunner {
    let platform = CfPlatform::new(CfConfig {
        cf_path: env_path("BRATS_CF_PATH", PathBuf::from("cf")),
        ..CfConfig::default()
    })
    .unwrap();

    let cached = std::env::var("BRATS_CACHED")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    SuiteRunner::new(
        Verifier::new(Arc::new(platform), Timeouts::default()),
        RunConfig {
            selection: selection.iter().map(|s| s.to_string()).collect(),
            cached,
            buildpack_dir: env_path("BRATS_BUILDPACK_DIR", PathBuf::from(".")),
            ..RunConfig::default()
        },
    )
}

async fn run_one(name: &str) -> Outcome {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let fixtures = env_path(
        "BRATS_FIXTURES_DIR",
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures"),
    );
    let scenarios = nodejs_scenarios(&fixtures).unwrap();
    let report = runner(&[name]).run(&scenarios).await.unwrap();

    let scenario = report.scenarios.into_iter().next().unwrap();
    info!(scenario = %scenario.name, outcome = ?scenario.outcome, "finished");
    scenario.outcome
}

fn assert_passed_or_skipped(outcome: Outcome) {
    assert!(
        matches!(outcome, Outcome::Passed | Outcome::Skipped { .. }),
        "unexpected outcome: {outcome:?}"
    );
}

#[tokio::test]
#[ignore = "requires a Cloud Foundry target"]
async fn resolves_node_version_range() {
    assert_eq!(run_one("node-version-range").await, Outcome::Passed);
}

#[tokio::test]
#[ignore = "requires a Cloud Foundry target"]
async fn runs_with_unbuilt_buildpack() {
    assert_passed_or_skipped(run_one("unbuilt-buildpack").await);
}

#[tokio::test]
#[ignore = "requires a Cloud Foundry target"]
async fn supplies_dotnet_core_with_nodejs_as_final() {
    assert_passed_or_skipped(run_one("multi-buildpack").await);
}
