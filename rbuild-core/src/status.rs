//! Status decoding
//!
//! The build service signals "still working" with 200 and "finished, fetch the
//! result elsewhere" with 303 plus a `Location` header. Completion is never
//! inferred from the body alone; a 200 body may be partial or empty.

use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::domain::job::{JobHandle, PollOutcome};
use crate::dto::response::RawResponse;

/// Submission rejected by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub status: u16,
    pub body: String,
}

/// Decode the response to a submission
///
/// A 2xx response with a `Location` header yields a [`JobHandle`]; the delay
/// comes from `Retry-After` or `default_delay` when that header is missing.
/// A 2xx response without `Location` has no asynchronous phase and yields
/// `Ok(None)`.
pub fn decode_submission(
    response: &RawResponse,
    default_delay: Duration,
) -> Result<Option<JobHandle>, Rejected> {
    if !response.is_success() {
        return Err(Rejected {
            status: response.status,
            body: response.body.clone(),
        });
    }

    Ok(response.location().map(|location| {
        let retry_after = response
            .retry_after()
            .map(Duration::from_secs)
            .unwrap_or(default_delay);
        JobHandle::new(location, retry_after)
    }))
}

/// Decode a single poll response
pub fn decode_poll(response: &RawResponse) -> PollOutcome {
    match response.status {
        200 => PollOutcome::Pending(parse_body(&response.body)),
        303 => match response.location() {
            Some(location) => PollOutcome::Redirect(location.to_string()),
            None => PollOutcome::Fatal(303),
        },
        other => PollOutcome::Fatal(other),
    }
}

/// Parse a poll body as JSON, returning `None` when it is malformed
pub fn parse_body(body: &str) -> Option<JsonValue> {
    serde_json::from_str(body).ok()
}
