//! Run command handler
//!
//! Submits a single build, optionally with one input file attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use rbuild_client::BuildService;
use rbuild_core::domain::request::Attachment;

use super::{IdentityArgs, print_summary};
use crate::config::SessionConfig;
use crate::session::{JobSpec, Session};

/// Arguments of `rbuild run`
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Input file uploaded with the request
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Arguments passed to the remote build, in order
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}

/// Run one build job
pub async fn run(service: Arc<dyn BuildService>, config: &SessionConfig, args: RunArgs) -> Result<u8> {
    let mut request = args.identity.base_request()?.args(args.args);

    if let Some(path) = &args.file {
        request = request.attach(read_attachment(path).await?);
    }

    let session = Session::new(service, config.clone());
    let summary = session.run(vec![JobSpec::new("run", request)]).await;
    print_summary(&summary);

    Ok(summary.exit_code())
}

/// Reads `path` into an attachment named after its final component
async fn read_attachment(path: &Path) -> Result<Attachment> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no usable file name", path.display());
    };

    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(Attachment::new(name, content))
}
