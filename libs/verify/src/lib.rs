//! # brats-verify
//!
//! Buildpack acceptance scenarios and the machinery that runs them.
//!
//! - [`Verifier`] drives a single app through push, readiness and the
//!   checks a scenario asks for.
//! - [`Scenario`] describes one deployment: fixture, buildpacks, resources,
//!   expected logs and responses, and the conditions under which it applies.
//! - [`SuiteRunner`] executes scenarios one at a time, each with its own app,
//!   and always removes the buildpacks it registered.
//!
//! Scenarios come from the built-in [`nodejs_scenarios`] catalog or from a
//! TOML suite file via [`load_suite`].

mod catalog;
mod error;
mod package;
mod runner;
mod scenario;
mod suite;
mod verifier;

pub use catalog::{
    nodejs_scenarios, DOTNET_CORE_BUILDPACK, MULTI_BUILDPACK_MIN_API, UNBUILT_BUILDPACK,
};
pub use error::{ErrorKind, ScenarioError, SuiteError};
pub use package::BuildpackPackage;
pub use runner::{Outcome, RunConfig, ScenarioReport, SuiteReport, SuiteRunner, TeardownPolicy};
pub use scenario::{BodyCheck, BodyExpectation, Pattern, Precondition, Scenario};
pub use suite::{load_suite, parse_suite};
pub use verifier::{unique_app_name, DeployedApp, Phase, Resources, Timeouts, Verifier};
