//! # brats-platform
//!
//! Client side of the deployment platform used by acceptance runs.
//!
//! The verifier only ever talks to a [`PlatformClient`]. Two implementations
//! ship with this crate:
//!
//! - [`CfPlatform`]: a Cloud Foundry target driven through the `cf` CLI
//! - [`MockPlatform`]: a scripted in-memory platform for tests
//!
//! Application stdout is exposed as a [`LogBuffer`] that keeps growing for
//! the app's lifetime, so assertions can poll it.

mod cf;
mod client;
mod error;
mod http;
mod mock;
mod types;

pub use cf::{push_args, CfConfig, CfPlatform};
pub use client::{registered_buildpack_name, PlatformClient};
pub use error::PlatformError;
pub use http::BodyClient;
pub use mock::{MockCall, MockPlatform};
pub use types::{ApiVersion, AppConfig, BuildpackKind, InstanceState, LogBuffer};
