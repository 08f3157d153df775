//! rbuild HTTP Client
//!
//! Transport for the remote build service: submitting build requests, polling
//! follow-up locations and downloading result artifacts.
//!
//! Responses are handed back as [`RawResponse`] values so that all protocol
//! interpretation happens in `rbuild_core::status`. Automatic redirect
//! following is disabled: the 303 that ends a poll loop must reach the caller.
//!
//! # Example
//!
//! ```no_run
//! use rbuild_client::{BuildService, BuildServiceClient};
//! use rbuild_core::domain::request::BuildRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BuildServiceClient::new("http://localhost:1234")?;
//!
//!     let request = BuildRequest::new("6.1.0", "x86_64")
//!         .args(["-vp4", "-e", "probe begin { exit() }"]);
//!     let response = client.submit(&request).await?;
//!
//!     println!("Submission status: {}", response.status);
//!     Ok(())
//! }
//! ```

mod artifacts;
mod builds;
pub mod error;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use rbuild_core::dto::response::RawResponse;

use async_trait::async_trait;
use rbuild_core::domain::manifest::resolve_location;
use rbuild_core::domain::request::BuildRequest;
use reqwest::Client;
use reqwest::redirect::Policy;

/// Operations the session needs from a build service
///
/// Implemented over HTTP by [`BuildServiceClient`]; tests substitute scripted
/// implementations.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Base address locations are resolved against
    fn base_url(&self) -> &str;

    /// Fetch the service root to check that it is reachable
    async fn ping(&self) -> Result<RawResponse>;

    /// Submit a build request
    async fn submit(&self, request: &BuildRequest) -> Result<RawResponse>;

    /// Poll a follow-up location without following redirects
    async fn poll(&self, location: &str) -> Result<RawResponse>;

    /// Fetch a location's body as text (used for the result manifest)
    async fn get(&self, location: &str) -> Result<RawResponse>;

    /// Download an artifact's bytes; anything but 200 is a
    /// [`ClientError::Artifact`]
    async fn download(&self, location: &str) -> Result<Vec<u8>>;
}

/// HTTP client for the build service
#[derive(Debug, Clone)]
pub struct BuildServiceClient {
    /// Base URL of the service (e.g., "http://localhost:1234")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl BuildServiceClient {
    /// Create a new build service client
    ///
    /// The underlying HTTP client never follows redirects.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the build service
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc. The
    /// supplied client must be built with `redirect(Policy::none())`, or 303
    /// poll responses will be followed before the caller can see them.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the build service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server-issued location
    fn url_for(&self, location: &str) -> String {
        resolve_location(&self.base_url, location)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Reduce a response to status, headers and body text
    async fn into_raw(response: reqwest::Response) -> Result<RawResponse> {
        let mut raw = RawResponse::new(response.status().as_u16(), String::new());
        for (name, value) in response.headers() {
            match value.to_str() {
                Ok(value) => raw.insert_header(name.as_str(), value),
                Err(_) => tracing::debug!("Ignoring non-text header {}", name),
            }
        }
        raw.body = response.text().await?;
        Ok(raw)
    }
}

#[async_trait]
impl BuildService for BuildServiceClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<RawResponse> {
        BuildServiceClient::ping(self).await
    }

    async fn submit(&self, request: &BuildRequest) -> Result<RawResponse> {
        BuildServiceClient::submit(self, request).await
    }

    async fn poll(&self, location: &str) -> Result<RawResponse> {
        BuildServiceClient::poll(self, location).await
    }

    async fn get(&self, location: &str) -> Result<RawResponse> {
        BuildServiceClient::get(self, location).await
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>> {
        BuildServiceClient::download(self, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BuildServiceClient::new("http://localhost:1234").unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BuildServiceClient::new("http://localhost:1234/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::builder().redirect(Policy::none()).build().unwrap();
        let client = BuildServiceClient::with_client("http://localhost:1234", http_client);
        assert_eq!(client.url_for("/builds/1"), "http://localhost:1234/builds/1");
    }
}
