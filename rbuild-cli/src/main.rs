//! rbuild
//!
//! Command-line client for a remote build service. Submits build requests,
//! polls them until the service redirects to a result, and retrieves the
//! captured output streams and produced files.

mod commands;
mod config;
mod scheduler;
mod service;
mod session;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use colored::*;
use commands::{Commands, handle_command};
use config::{FileFailurePolicy, PollConfig, SessionConfig};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rbuild")]
#[command(about = "Remote build service client", long_about = None)]
struct Cli {
    /// Build service URL
    #[arg(
        long,
        global = true,
        env = "RBUILD_SERVER",
        default_value = "http://localhost:1234"
    )]
    server: String,

    /// Directory receiving produced files
    #[arg(long, global = true, env = "RBUILD_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Directory for transient captures [default: system temp dir]
    #[arg(long, global = true, env = "RBUILD_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Stop the session after the first failed build
    #[arg(
        long,
        global = true,
        env = "RBUILD_STOP_ON_FIRST_FAILURE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    stop_on_first_failure: bool,

    /// Give up on a build after this many polls
    #[arg(long, global = true, env = "RBUILD_MAX_POLL_ATTEMPTS")]
    max_poll_attempts: Option<u32>,

    /// Give up on a build after polling this long
    #[arg(long, global = true, env = "RBUILD_MAX_WAIT_SECS")]
    max_wait_secs: Option<u64>,

    /// Poll delay when the service does not send Retry-After
    #[arg(
        long,
        global = true,
        env = "RBUILD_DEFAULT_DELAY_SECS",
        default_value_t = 5
    )]
    default_delay_secs: u64,

    /// Retries of a submission or poll after a connection error
    #[arg(
        long,
        global = true,
        env = "RBUILD_TRANSPORT_RETRIES",
        default_value_t = 3
    )]
    transport_retries: u32,

    /// Whether a missing output file fails its build
    #[arg(
        long,
        global = true,
        env = "RBUILD_FILE_FAILURE_POLICY",
        value_enum,
        default_value_t = FileFailurePolicy::Fail
    )]
    file_failure_policy: FileFailurePolicy,

    /// Builds allowed in flight at once
    #[arg(long, global = true, env = "RBUILD_MAX_PARALLEL", default_value_t = 1)]
    max_parallel: usize,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        let defaults = PollConfig::default();

        SessionConfig {
            server_url: self.server.clone(),
            output_dir: self.output_dir.clone(),
            work_dir: self.work_dir.clone().unwrap_or_else(std::env::temp_dir),
            stop_on_first_failure: self.stop_on_first_failure,
            max_parallel: self.max_parallel,
            file_failure_policy: self.file_failure_policy,
            poll: PollConfig {
                max_attempts: self.max_poll_attempts,
                max_wait: self.max_wait_secs.map(Duration::from_secs),
                default_delay: Duration::from_secs(self.default_delay_secs),
                transport_retries: self.transport_retries,
                ..defaults
            },
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "rbuild_cli=warn,rbuild_client=warn",
        1 => "rbuild_cli=info,rbuild_client=info",
        _ => "rbuild_cli=debug,rbuild_client=debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.session_config();
    if let Err(e) = config.validate() {
        eprintln!("{} {:#}", "Invalid configuration:".red().bold(), e);
        return ExitCode::FAILURE;
    }
    debug!("Session configuration: {:?}", config);

    match handle_command(cli.command, &config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
