//! HTTP client for application routes.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tracing::debug;

use crate::error::PlatformError;

/// Per-request timeout for route requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches response bodies from deployed applications.
#[derive(Debug, Clone)]
pub struct BodyClient {
    client: reqwest::Client,
}

impl BodyClient {
    /// Create a new body client.
    ///
    /// `skip_tls_verify` accepts self-signed router certificates, as found on
    /// development platforms.
    pub fn new(skip_tls_verify: bool) -> Result<Self, PlatformError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()?;

        Ok(Self { client })
    }

    /// Join a base URL and a request path.
    pub fn url(base_url: &str, path: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if path.is_empty() {
            format!("{}/", base)
        } else if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Make a GET request and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, PlatformError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(PlatformError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            })
        }
    }
}
