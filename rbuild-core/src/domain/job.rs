//! Job lifecycle types

use serde_json::Value as JsonValue;
use std::time::Duration;

/// Handle returned by an accepted submission
///
/// Lives only for the duration of one poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Follow-up location to poll
    pub location: String,
    /// Server-specified minimum delay between polls
    pub retry_after: Duration,
}

impl JobHandle {
    pub fn new(location: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            location: location.into(),
            retry_after,
        }
    }
}

/// Decoded result of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still working; carries the body if it parsed as JSON
    Pending(Option<JsonValue>),
    /// Finished; the new location holds the result manifest
    Redirect(String),
    /// Any other status code
    Fatal(u16),
}

/// Poll loop state, threaded by value through each iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub location: String,
    /// Number of polls issued so far
    pub attempt: u32,
}

impl PollState {
    pub fn start(handle: &JobHandle) -> Self {
        Self {
            location: handle.location.clone(),
            attempt: 0,
        }
    }

    /// State after one more poll of the same location
    pub fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }

    /// State after the service redirected to `location`
    pub fn redirected(self, location: String) -> Self {
        Self { location, ..self }
    }
}
