//! Session configuration
//!
//! Defines the configurable parameters for a build session: where the build
//! service lives, where artifacts land, and how patient the poll loop is.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

/// What a failed download of an additional output file does to its job
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileFailurePolicy {
    /// The job is reported as failed
    Fail,
    /// The job is reported as partial and does not affect the exit code
    Partial,
}

/// Poll loop configuration
///
/// `max_attempts` and `max_wait` bound an otherwise unbounded loop; either one
/// running out ends the job with a timeout.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of polls per job
    pub max_attempts: Option<u32>,

    /// Maximum time spent polling one job
    pub max_wait: Option<Duration>,

    /// Delay used when the service sends a location without `Retry-After`
    pub default_delay: Duration,

    /// Lower bound applied to the service's delay
    pub min_delay: Duration,

    /// How many times a submission or poll is retried after a transport error
    pub transport_retries: u32,

    /// Initial backoff between transport retries, doubled each time
    pub retry_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            max_wait: None,
            default_delay: Duration::from_secs(5),
            min_delay: Duration::from_secs(1),
            transport_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Build service base URL (e.g., "http://localhost:1234")
    pub server_url: String,

    /// Where additional output files are written
    pub output_dir: PathBuf,

    /// Parent of the session's scratch directory for captured streams
    pub work_dir: PathBuf,

    /// Stop running jobs after the first failure
    pub stop_on_first_failure: bool,

    /// Jobs allowed in flight at once
    pub max_parallel: usize,

    pub file_failure_policy: FileFailurePolicy,

    pub poll: PollConfig,
}

impl SessionConfig {
    /// Creates a new configuration with defaults
    pub fn new(server_url: String) -> Self {
        Self {
            server_url,
            output_dir: PathBuf::from("."),
            work_dir: std::env::temp_dir(),
            stop_on_first_failure: true,
            max_parallel: 1,
            file_failure_policy: FileFailurePolicy::Fail,
            poll: PollConfig::default(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_url.is_empty() {
            anyhow::bail!("server_url cannot be empty");
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            anyhow::bail!("server_url must start with http:// or https://");
        }

        if self.max_parallel == 0 {
            anyhow::bail!("max_parallel must be greater than 0");
        }

        if self.poll.max_attempts == Some(0) {
            anyhow::bail!("max_poll_attempts must be greater than 0");
        }

        if self.poll.max_wait.is_some_and(|wait| wait.is_zero()) {
            anyhow::bail!("max_wait must be greater than 0");
        }

        if self.poll.min_delay.is_zero() {
            anyhow::bail!("min_delay must be greater than 0");
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("http://localhost:1234".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.stop_on_first_failure);
        assert_eq!(config.max_parallel, 1);
        assert_eq!(config.file_failure_policy, FileFailurePolicy::Fail);
        assert_eq!(config.poll.max_attempts, None);
        assert_eq!(config.poll.default_delay, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SessionConfig::default();

        config.server_url = "localhost:1234".to_string();
        assert!(config.validate().is_err());

        config.server_url = "https://builds.example.com".to_string();
        assert!(config.validate().is_ok());

        config.max_parallel = 0;
        assert!(config.validate().is_err());
        config.max_parallel = 4;

        config.poll.max_attempts = Some(0);
        assert!(config.validate().is_err());
        config.poll.max_attempts = Some(10);

        config.poll.max_wait = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.poll.max_wait = Some(Duration::from_secs(60));

        assert!(config.validate().is_ok());
    }
}
