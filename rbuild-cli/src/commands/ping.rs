//! Ping command handler

use anyhow::{Context, Result};
use colored::*;
use rbuild_client::BuildService;
use tracing::debug;

/// Check that the build service answers its root resource
pub async fn ping(service: &dyn BuildService) -> Result<u8> {
    let response = service
        .ping()
        .await
        .with_context(|| format!("Build service at {} is unreachable", service.base_url()))?;

    debug!("Ping body: {}", response.body);

    if response.is_success() {
        eprintln!(
            "{} {} ({})",
            "Build service is up:".green().bold(),
            service.base_url(),
            response.status
        );
        Ok(0)
    } else {
        eprintln!(
            "{} {} answered with status {}",
            "Build service is unhealthy:".red().bold(),
            service.base_url(),
            response.status
        );
        Ok(1)
    }
}
