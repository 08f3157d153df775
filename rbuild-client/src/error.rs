//! Error types for the build service client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the build service
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection or timeout failure at the network layer
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// A single artifact could not be downloaded
    #[error("failed to download {location} (status {status})")]
    Artifact {
        location: String,
        status: u16,
    },
}

impl ClientError {
    /// Check if retrying the same request may succeed
    ///
    /// Only connection and timeout failures count; any answer from the
    /// service is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(e) => e.is_connect() || e.is_timeout(),
            Self::Artifact { .. } => false,
        }
    }
}
