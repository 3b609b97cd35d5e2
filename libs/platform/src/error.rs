//! Platform client errors.

use thiserror::Error;

/// Errors returned by a deployment platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A platform CLI invocation exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    /// The platform CLI could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The platform API answered with an error document.
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// Network error talking to an application route.
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Application route returned a non-success status.
    #[error("GET {url} returned {status}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Response could not be interpreted.
    #[error("failed to parse {0}")]
    Parse(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Create an API error from an error document.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call later may succeed.
    ///
    /// Instance queries fail while an app is still staging; route requests
    /// fail until the router picks up the app.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { .. } | Self::Http(_) | Self::NotFound(_) => true,
            Self::Status { status, .. } => *status == 404 || *status >= 500,
            _ => false,
        }
    }
}
