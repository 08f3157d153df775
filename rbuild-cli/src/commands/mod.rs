//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod ping;
mod run;
mod selftest;

pub use run::RunArgs;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use colored::*;
use rbuild_client::BuildServiceClient;
use rbuild_core::domain::request::{BuildRequest, Distro};
use rbuild_core::domain::system::SystemInfo;

use crate::config::SessionConfig;
use crate::session::{JobStatus, SessionSummary};

/// Protocol version announced with every build request
pub const PROTOCOL_VERSION: &str = "1.0";

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that the build service answers
    Ping,
    /// Submit one build and retrieve its result
    Run(RunArgs),
    /// Run the probe, uploaded-script and capability builds in one session
    Selftest {
        #[command(flatten)]
        identity: IdentityArgs,
    },
}

/// Target identification, detected from the local system unless overridden
#[derive(Args, Debug, Clone, Default)]
pub struct IdentityArgs {
    /// Kernel release to build for
    #[arg(long)]
    pub kver: Option<String>,

    /// CPU architecture to build for
    #[arg(long)]
    pub arch: Option<String>,

    /// Distribution name
    #[arg(long)]
    pub distro_name: Option<String>,

    /// Distribution version
    #[arg(long, requires = "distro_name")]
    pub distro_version: Option<String>,

    /// Environment variable forwarded to the build (NAME=VALUE, repeatable)
    #[arg(long = "env", value_name = "NAME=VALUE")]
    pub env_vars: Vec<String>,

    /// Module signing key fingerprint (repeatable)
    #[arg(long = "mok", value_name = "FINGERPRINT")]
    pub mok_fingerprints: Vec<String>,
}

impl IdentityArgs {
    /// Builds the request skeleton shared by every job of a session
    pub fn base_request(&self) -> Result<BuildRequest> {
        self.apply(SystemInfo::detect())
    }

    fn apply(&self, mut system: SystemInfo) -> Result<BuildRequest> {
        if let Some(kver) = &self.kver {
            system.kernel_release = kver.clone();
        }
        if let Some(arch) = &self.arch {
            system.arch = arch.clone();
        }
        if let Some(name) = &self.distro_name {
            system.distro = Some(Distro {
                name: name.clone(),
                version: self.distro_version.clone(),
            });
        }

        if system.kernel_release.is_empty() || system.arch.is_empty() {
            bail!("could not detect kernel release and architecture, pass --kver and --arch");
        }

        let mut request = system.request().with_protocol_version(PROTOCOL_VERSION);
        for pair in &self.env_vars {
            let (name, value) = parse_env_var(pair)?;
            request = request.env_var(name, value);
        }
        for fingerprint in &self.mok_fingerprints {
            request = request.mok_fingerprint(fingerprint.as_str());
        }

        Ok(request)
    }
}

fn parse_env_var(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("invalid --env value '{}', expected NAME=VALUE", pair),
    }
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns the
/// process exit code.
pub async fn handle_command(command: Commands, config: &SessionConfig) -> Result<u8> {
    let client = BuildServiceClient::new(config.server_url.as_str())
        .with_context(|| format!("Failed to create client for {}", config.server_url))?;
    let client = Arc::new(client);

    match command {
        Commands::Ping => ping::ping(client.as_ref()).await,
        Commands::Run(args) => run::run(client, config, args).await,
        Commands::Selftest { identity } => selftest::selftest(client, config, &identity).await,
    }
}

/// Print one line per job to stderr
pub fn print_summary(summary: &SessionSummary) {
    eprintln!();
    for report in &summary.reports {
        let status = match &report.status {
            JobStatus::Succeeded => report.status.to_string().green(),
            JobStatus::NoResult => report.status.to_string().cyan(),
            JobStatus::Partial { .. } => report.status.to_string().yellow(),
            JobStatus::Failed(_) => report.status.to_string().red(),
            JobStatus::Skipped => report.status.to_string().dimmed(),
            JobStatus::Cancelled => report.status.to_string().yellow(),
        };
        eprintln!("  {} {}", format!("{}:", report.name).bold(), status);
    }

    let failed = summary.failed();
    if failed == 0 {
        eprintln!("{}", format!("{} build(s) done", summary.reports.len()).green().bold());
    } else {
        eprintln!(
            "{}",
            format!("{} of {} build(s) failed", failed, summary.reports.len())
                .red()
                .bold()
        );
    }
}
