//! Build session
//!
//! Runs one or more independent builds through submit, poll and fetch. Every
//! job gets the same poller and fetcher; jobs differ only in their request.
//! Captured streams go to the process's stderr/stdout, or to caller-supplied
//! writers.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rbuild_client::BuildService;
use rbuild_core::domain::request::BuildRequest;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{FileFailurePolicy, SessionConfig};
use crate::scheduler::{JobPoller, PollResolution};
use crate::service::{FetchReport, ResultFetcher};

/// A named build request
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub request: BuildRequest,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, request: BuildRequest) -> Self {
        Self {
            name: name.into(),
            request,
        }
    }
}

/// Final state of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    /// The service completed the request without a result to fetch
    NoResult,
    /// Streams were retrieved but some output files were not
    Partial { failed_files: Vec<String> },
    Failed(String),
    /// Not attempted because an earlier job failed
    Skipped,
    /// Submitted, then abandoned because another job failed
    Cancelled,
}

impl JobStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed(_))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::NoResult => write!(f, "completed without result"),
            JobStatus::Partial { failed_files } => {
                write!(f, "partial ({} file(s) missing)", failed_files.len())
            }
            JobStatus::Failed(reason) => write!(f, "failed: {}", reason),
            JobStatus::Skipped => write!(f, "skipped"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub name: String,
    pub status: JobStatus,
}

/// Reports for every job in a session, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub reports: Vec<JobReport>,
}

impl SessionSummary {
    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status.is_failure())
            .count()
    }

    /// Process exit code: non-zero when any job failed
    pub fn exit_code(&self) -> u8 {
        if self.failed() > 0 { 1 } else { 0 }
    }
}

/// Runs build jobs against one build service
#[derive(Clone)]
pub struct Session {
    service: Arc<dyn BuildService>,
    config: SessionConfig,
    id: Uuid,
}

impl Session {
    /// Creates a new session with its own scratch directory name
    pub fn new(service: Arc<dyn BuildService>, config: SessionConfig) -> Self {
        Self {
            service,
            config,
            id: Uuid::new_v4(),
        }
    }

    /// Scratch directory for this session's captured streams
    pub fn work_dir(&self) -> PathBuf {
        self.config.work_dir.join(format!("rbuild-{}", self.id))
    }

    /// Runs `jobs`, relaying captured streams to the process's stdout/stderr
    pub async fn run(&self, jobs: Vec<JobSpec>) -> SessionSummary {
        let mut out = tokio::io::stdout();
        let mut err = tokio::io::stderr();

        let summary = if self.config.max_parallel > 1 && jobs.len() > 1 {
            self.run_concurrent(jobs, &mut out, &mut err).await
        } else {
            self.run_sequential(jobs, &mut out, &mut err).await
        };
        self.cleanup().await;
        summary
    }

    /// Runs `jobs` one after another, relaying captured streams to `out`/`err`
    pub async fn run_sequential<O, E>(
        &self,
        jobs: Vec<JobSpec>,
        out: &mut O,
        err: &mut E,
    ) -> SessionSummary
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let mut summary = SessionSummary::default();
        let mut stopped = false;

        for spec in jobs {
            if stopped {
                summary.reports.push(JobReport {
                    name: spec.name,
                    status: JobStatus::Skipped,
                });
                continue;
            }

            let status = self.run_job(&spec, out, err).await;
            if status.is_failure() && self.config.stop_on_first_failure {
                warn!("Stopping session after failure of {}", spec.name);
                stopped = true;
            }
            summary.reports.push(JobReport {
                name: spec.name,
                status,
            });
        }

        summary
    }

    /// Runs up to `max_parallel` jobs at once
    ///
    /// Each job buffers its captured streams and writes them to `out`/`err`
    /// when it finishes, so output from different jobs never interleaves.
    async fn run_concurrent<O, E>(
        &self,
        jobs: Vec<JobSpec>,
        out: &mut O,
        err: &mut E,
    ) -> SessionSummary
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let mut tasks = JoinSet::new();
        let mut indices = HashMap::new();
        let mut started = Vec::with_capacity(jobs.len());
        let mut reports: Vec<JobReport> = jobs
            .iter()
            .map(|spec| JobReport {
                name: spec.name.clone(),
                status: JobStatus::Skipped,
            })
            .collect();

        for (index, spec) in jobs.into_iter().enumerate() {
            let session = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let flag = Arc::new(AtomicBool::new(false));
            started.push(Arc::clone(&flag));

            let handle = tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, JobStatus::Skipped, Vec::<u8>::new(), Vec::<u8>::new());
                };
                flag.store(true, Ordering::SeqCst);

                let mut out = Vec::<u8>::new();
                let mut err = Vec::<u8>::new();
                let status = session.run_job(&spec, &mut out, &mut err).await;
                (index, status, out, err)
            });
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, status, captured_out, captured_err) = match joined {
                Ok(result) => result,
                Err(e) => {
                    let Some(&index) = indices.get(&e.id()) else {
                        error!("Unknown build task ended: {}", e);
                        continue;
                    };
                    if e.is_cancelled() {
                        if started[index].load(Ordering::SeqCst) {
                            reports[index].status = JobStatus::Cancelled;
                        }
                        continue;
                    }
                    error!("Build task for {} panicked: {}", reports[index].name, e);
                    (
                        index,
                        JobStatus::Failed("build task panicked".to_string()),
                        Vec::new(),
                        Vec::new(),
                    )
                }
            };

            emit(err, &captured_err, "stderr").await;
            emit(out, &captured_out, "stdout").await;

            let failed = status.is_failure();
            reports[index].status = status;

            if failed && self.config.stop_on_first_failure {
                warn!("Stopping session after failure of {}", reports[index].name);
                tasks.abort_all();
            }
        }

        SessionSummary { reports }
    }

    /// Drives one job from submission to retrieved result
    async fn run_job<O, E>(&self, spec: &JobSpec, out: &mut O, err: &mut E) -> JobStatus
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        info!("Starting build {}", spec.name);

        let poller = JobPoller::new(Arc::clone(&self.service), self.config.poll.clone());
        let location = match poller.run(&spec.request).await {
            Ok(PollResolution::Resolved(location)) => location,
            Ok(PollResolution::NoHandle) => return JobStatus::NoResult,
            Err(e) => {
                error!("Build {} aborted: {}", spec.name, e);
                return JobStatus::Failed(e.to_string());
            }
        };

        let fetcher = ResultFetcher::new(
            Arc::clone(&self.service),
            self.work_dir(),
            self.config.output_dir.clone(),
        );
        match fetcher.fetch(&location, out, err).await {
            Ok(report) => self.judge(&spec.name, report),
            Err(e) => {
                error!("Failed to retrieve result of {}: {}", spec.name, e);
                JobStatus::Failed(e.to_string())
            }
        }
    }

    /// Turns a fetch report into a job status
    fn judge(&self, name: &str, report: FetchReport) -> JobStatus {
        if !report.streams_ok() {
            let missing: Vec<&str> = [
                (!report.stdout_ok).then_some("stdout"),
                (!report.stderr_ok).then_some("stderr"),
            ]
            .into_iter()
            .flatten()
            .collect();
            return JobStatus::Failed(format!("captured {} unavailable", missing.join(" and ")));
        }

        if report.skipped_entries > 0 {
            warn!(
                "Build {} listed {} output file(s) that could not be retrieved",
                name, report.skipped_entries
            );
        }

        if report.failed_files.is_empty() {
            info!(
                "Build {} ({}) succeeded, {} file(s) delivered",
                name,
                report.uuid,
                report.delivered.len()
            );
            return JobStatus::Succeeded;
        }

        match self.config.file_failure_policy {
            FileFailurePolicy::Fail => JobStatus::Failed(format!(
                "{} output file(s) not delivered",
                report.failed_files.len()
            )),
            FileFailurePolicy::Partial => JobStatus::Partial {
                failed_files: report.failed_files,
            },
        }
    }

    /// Removes the session scratch directory
    async fn cleanup(&self) {
        let dir = self.work_dir();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}

/// Writes one job's buffered stream and flushes it
async fn emit<W>(writer: &mut W, bytes: &[u8], stream: &str)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if bytes.is_empty() {
        return;
    }
    if let Err(e) = writer.write_all(bytes).await {
        warn!("Failed to write captured {}: {}", stream, e);
        return;
    }
    if let Err(e) = writer.flush().await {
        warn!("Failed to flush captured {}: {}", stream, e);
    }
}
