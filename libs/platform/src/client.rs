//! Deployment platform client interface.

use std::path::Path;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{ApiVersion, AppConfig, InstanceState, LogBuffer};

/// Operations the verifier needs from a deployment platform.
///
/// Implementations own any per-app resources (log capture tasks, cached
/// GUIDs) keyed by application name.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Push an application and start capturing its stdout.
    async fn push(&self, app: &AppConfig) -> Result<(), PlatformError>;

    /// Current state of every instance of `app`, ordered by instance index.
    async fn instance_states(&self, app: &str) -> Result<Vec<InstanceState>, PlatformError>;

    /// GET `path` on the application's first route and return the body.
    async fn get_body(&self, app: &str, path: &str) -> Result<String, PlatformError>;

    /// Stdout accumulated for `app` since it was pushed.
    ///
    /// Returns the same shared buffer on every call for the same app.
    async fn stdout(&self, app: &str) -> LogBuffer;

    /// Register a buildpack archive for `name`, replacing any existing one.
    ///
    /// The platform-visible buildpack is named by
    /// [`registered_buildpack_name`], which is what pushes must reference.
    async fn create_or_update_buildpack(
        &self,
        name: &str,
        archive: &Path,
        stack: Option<&str>,
    ) -> Result<(), PlatformError>;

    /// Remove the buildpack registered for `name`.
    async fn delete_buildpack(&self, name: &str) -> Result<(), PlatformError>;

    /// Version of the platform API.
    async fn api_version(&self) -> Result<ApiVersion, PlatformError>;

    /// Returns true if the platform API version is strictly greater than
    /// `version`.
    async fn api_greater_than(&self, version: &str) -> Result<bool, PlatformError> {
        let min: ApiVersion = version.parse()?;
        Ok(self.api_version().await? > min)
    }

    /// Delete the application and its routes, and stop capturing its logs.
    async fn destroy(&self, app: &str) -> Result<(), PlatformError>;
}

/// Platform-visible name of a buildpack registered as `name`.
pub fn registered_buildpack_name(name: &str) -> String {
    format!("{}_buildpack", name)
}
