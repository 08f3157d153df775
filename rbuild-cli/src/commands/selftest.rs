//! Selftest command handler
//!
//! Exercises the build service with three independent jobs: a plain probe,
//! an uploaded script, and a capability listing.

use std::sync::Arc;

use anyhow::Result;
use rbuild_client::BuildService;
use rbuild_core::domain::request::{Attachment, BuildRequest};

use super::{IdentityArgs, print_summary};
use crate::config::SessionConfig;
use crate::session::{JobSpec, Session};

const SCRIPT_NAME: &str = "hello.stp";
const SCRIPT: &str = "probe begin { printf(\"hello from the build service\\n\"); exit() }\n";

/// Run the selftest session
pub async fn selftest(
    service: Arc<dyn BuildService>,
    config: &SessionConfig,
    identity: &IdentityArgs,
) -> Result<u8> {
    let jobs = selftest_jobs(identity.base_request()?);

    let session = Session::new(service, config.clone());
    let summary = session.run(jobs).await;
    print_summary(&summary);

    Ok(summary.exit_code())
}

/// The three selftest jobs, all sharing `base`'s identification
fn selftest_jobs(base: BuildRequest) -> Vec<JobSpec> {
    vec![
        JobSpec::new(
            "probe",
            base.clone().args(["-vp4", "-e", "probe begin { exit() }"]),
        ),
        JobSpec::new(
            "script",
            base.clone()
                .args(["-vp4", SCRIPT_NAME])
                .attach(Attachment::new(SCRIPT_NAME, SCRIPT)),
        ),
        JobSpec::new("capabilities", base.arg("--dump-probe-types")),
    ]
}
