//! Build poller
//!
//! Submits a build request and polls its follow-up location until the service
//! signals a terminal outcome. Each poll waits at least the delay the service
//! asked for; there is no attempt cap unless one is configured.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rbuild_client::{BuildService, ClientError};
use rbuild_core::domain::job::{JobHandle, PollOutcome, PollState};
use rbuild_core::domain::request::BuildRequest;
use rbuild_core::status::{decode_poll, decode_submission, parse_body};
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::PollConfig;

const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Terminal success states of a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResolution {
    /// The submission carried no follow-up location; nothing to fetch
    NoHandle,
    /// The result manifest is ready at this location
    Resolved(String),
}

/// Ways a job can be aborted before its result is available
#[derive(Debug, Error)]
pub enum PollFailure {
    #[error("build request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("poll returned status {0}")]
    Status(u16),

    #[error("gave up after {attempts} poll(s) over {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error("transport failure: {0}")]
    Transport(#[source] ClientError),
}

/// Drives one build from submission to a terminal poll outcome
pub struct JobPoller {
    service: Arc<dyn BuildService>,
    config: PollConfig,
}

impl JobPoller {
    /// Creates a new poller
    pub fn new(service: Arc<dyn BuildService>, config: PollConfig) -> Self {
        Self { service, config }
    }

    /// Submits `request` and waits for it to resolve
    pub async fn run(&self, request: &BuildRequest) -> Result<PollResolution, PollFailure> {
        match self.submit(request).await? {
            Some(handle) => self.wait(&handle).await.map(PollResolution::Resolved),
            None => {
                info!("Submission has no follow-up location, nothing to poll");
                Ok(PollResolution::NoHandle)
            }
        }
    }

    /// Submits a build request
    ///
    /// Returns `None` when the service completed the request without an
    /// asynchronous phase.
    pub async fn submit(&self, request: &BuildRequest) -> Result<Option<JobHandle>, PollFailure> {
        debug!("Submitting build with {} argument(s)", request.cmd_args.len());

        let response = self
            .with_retry("submit", || self.service.submit(request))
            .await?;

        let handle = decode_submission(&response, self.config.default_delay).map_err(
            |rejected| PollFailure::Rejected {
                status: rejected.status,
                body: rejected.body,
            },
        )?;

        if let Some(handle) = &handle {
            info!(
                "Build accepted at {} (retry after {:?})",
                handle.location, handle.retry_after
            );
        }

        Ok(handle)
    }

    /// Polls until the service redirects to the result
    ///
    /// Returns the redirect location on success.
    pub async fn wait(&self, handle: &JobHandle) -> Result<String, PollFailure> {
        let delay = handle.retry_after.max(self.config.min_delay);
        let started = Instant::now();
        let mut state = PollState::start(handle);

        loop {
            if let Some(failure) = self.exhausted(&state, started.elapsed(), delay) {
                warn!("{}", failure);
                return Err(failure);
            }

            debug!("Waiting {:?} before poll #{}", delay, state.attempt + 1);
            time::sleep(delay).await;

            let response = self
                .with_retry("poll", || self.service.poll(&state.location))
                .await?;
            state = state.next();

            match decode_poll(&response) {
                PollOutcome::Pending(Some(body)) => {
                    debug!("Build still running: {}", body);
                }
                PollOutcome::Pending(None) => {
                    debug!("Build still running (body is not valid JSON)");
                }
                PollOutcome::Redirect(location) => {
                    if parse_body(&response.body).is_none() {
                        debug!("Redirect body is not valid JSON");
                    }
                    let state = state.redirected(location);
                    info!(
                        "Build finished after {} poll(s), result at {}",
                        state.attempt, state.location
                    );
                    return Ok(state.location);
                }
                PollOutcome::Fatal(status) => {
                    warn!("Poll of {} returned status {}", state.location, status);
                    return Err(PollFailure::Status(status));
                }
            }
        }
    }

    /// Checks whether another poll would exceed the configured limits
    fn exhausted(&self, state: &PollState, elapsed: Duration, delay: Duration) -> Option<PollFailure> {
        let timeout = PollFailure::Timeout {
            attempts: state.attempt,
            elapsed,
        };

        if self
            .config
            .max_attempts
            .is_some_and(|max| state.attempt >= max)
        {
            return Some(timeout);
        }

        if self
            .config
            .max_wait
            .is_some_and(|max| elapsed + delay > max)
        {
            return Some(timeout);
        }

        None
    }

    /// Runs `op`, retrying transport errors with exponential backoff
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PollFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = rbuild_client::Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.config.retry_backoff;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded after {} attempt(s)", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt <= self.config.transport_retries => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what,
                        attempt,
                        self.config.transport_retries + 1,
                        e
                    );
                    time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
                Err(e) => return Err(PollFailure::Transport(e)),
            }
        }
    }
}
