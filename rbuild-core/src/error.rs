//! Decode errors

use thiserror::Error;

/// Errors produced while decoding service responses
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body was not well-formed JSON
    #[error("malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    /// A mandatory manifest field was absent or empty
    #[error("manifest is missing mandatory field `{0}`")]
    MissingField(&'static str),
}
