//! Result fetcher
//!
//! Retrieves a finished build's artifacts:
//! - Decodes the result manifest the poll loop resolved to
//! - Downloads the captured stdout/stderr streams into the session scratch
//!   directory, relays them to the caller and removes them
//! - Downloads additional output files into the output directory and applies
//!   their permission bits
//!
//! A failed download only affects its own artifact; the remaining ones are
//! still retrieved.

use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rbuild_client::{BuildService, ClientError};
use rbuild_core::DecodeError;
use rbuild_core::domain::manifest::{ResultManifest, file_name_of};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Errors that prevent a result from being retrieved at all
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch result manifest: {0}")]
    Request(#[source] ClientError),

    #[error("result manifest request returned status {0}")]
    Status(u16),

    #[error("invalid result manifest: {0}")]
    Decode(#[from] DecodeError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to relay captured output: {0}")]
    Output(#[source] io::Error),
}

/// What was retrieved for one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub uuid: String,
    pub stdout_ok: bool,
    pub stderr_ok: bool,
    /// Output files written, with permissions applied
    pub delivered: Vec<PathBuf>,
    /// Locations of output files that could not be delivered
    pub failed_files: Vec<String>,
    /// Manifest entries ignored because they were incomplete or unusable
    pub skipped_entries: usize,
}

impl FetchReport {
    /// Both captured streams were retrieved
    pub fn streams_ok(&self) -> bool {
        self.stdout_ok && self.stderr_ok
    }
}

/// Downloads the artifacts of finished builds
pub struct ResultFetcher {
    service: Arc<dyn BuildService>,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl ResultFetcher {
    /// Creates a new fetcher
    ///
    /// # Arguments
    /// * `work_dir` - Scratch directory for captured streams
    /// * `output_dir` - Destination for additional output files
    pub fn new(service: Arc<dyn BuildService>, work_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            service,
            work_dir,
            output_dir,
        }
    }

    /// Fetches the result at `location`
    ///
    /// Captured stderr is written to `err` and captured stdout to `out`, in
    /// that order.
    pub async fn fetch<O, E>(
        &self,
        location: &str,
        out: &mut O,
        err: &mut E,
    ) -> Result<FetchReport, FetchError>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let manifest = self.manifest(location).await?;
        info!(
            "Fetching results of build {} ({} output file(s))",
            manifest.uuid,
            manifest.files.len()
        );

        for skipped in &manifest.skipped {
            warn!(
                "Skipping files[{}] of build {}: {}",
                skipped.index, manifest.uuid, skipped.reason
            );
        }

        create_dir(&self.work_dir).await?;
        if !manifest.files.is_empty() {
            create_dir(&self.output_dir).await?;
        }

        let stdout_path = self
            .work_dir
            .join(capture_name(&manifest.uuid, &manifest.stdout_location, "stdout"));
        let mut stderr_path = self
            .work_dir
            .join(capture_name(&manifest.uuid, &manifest.stderr_location, "stderr"));
        if stderr_path == stdout_path {
            stderr_path.set_extension("stderr");
        }

        let (stdout_ok, stderr_ok) = tokio::join!(
            self.download_to(&manifest.stdout_location, &stdout_path),
            self.download_to(&manifest.stderr_location, &stderr_path),
        );

        let mut report = FetchReport {
            uuid: manifest.uuid.clone(),
            stdout_ok,
            stderr_ok,
            skipped_entries: manifest.skipped.len(),
            ..FetchReport::default()
        };

        for entry in &manifest.files {
            let Some(name) = file_name_of(&entry.location) else {
                warn!("Skipping {}: no usable file name", entry.location);
                report.skipped_entries += 1;
                continue;
            };

            let path = self.output_dir.join(name);
            if !self.download_to(&entry.location, &path).await {
                report.failed_files.push(entry.location.clone());
                continue;
            }

            match fs::set_permissions(&path, Permissions::from_mode(entry.mode)).await {
                Ok(()) => {
                    debug!("Wrote {} (mode {:o})", path.display(), entry.mode);
                    report.delivered.push(path);
                }
                Err(e) => {
                    warn!("Failed to set mode of {}: {}", path.display(), e);
                    report.failed_files.push(entry.location.clone());
                }
            }
        }

        if stderr_ok {
            relay(&stderr_path, err).await?;
        }
        if stdout_ok {
            relay(&stdout_path, out).await?;
        }

        for path in [&stderr_path, &stdout_path] {
            if let Err(e) = fs::remove_file(path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        Ok(report)
    }

    /// Fetches and decodes the result manifest
    async fn manifest(&self, location: &str) -> Result<ResultManifest, FetchError> {
        let response = self
            .service
            .get(location)
            .await
            .map_err(FetchError::Request)?;

        if response.status != 200 {
            return Err(FetchError::Status(response.status));
        }

        Ok(ResultManifest::decode(&response.body)?)
    }

    /// Downloads one artifact to `path`, logging any failure
    async fn download_to(&self, location: &str, path: &Path) -> bool {
        let bytes = match self.service.download(location).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to download {}: {}", location, e);
                return false;
            }
        };

        match fs::write(path, &bytes).await {
            Ok(()) => {
                debug!("Saved {} to {}", location, path.display());
                true
            }
            Err(e) => {
                error!("Failed to write {}: {}", path.display(), e);
                false
            }
        }
    }
}

async fn create_dir(path: &Path) -> Result<(), FetchError> {
    fs::create_dir_all(path).await.map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies a captured stream to the caller's channel
async fn relay<W>(path: &Path, writer: &mut W) -> Result<(), FetchError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = fs::read(path).await.map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(&bytes).await.map_err(FetchError::Output)?;
    writer.flush().await.map_err(FetchError::Output)
}

/// Local name for a captured stream, scoped by the build's uuid
fn capture_name(uuid: &str, location: &str, role: &str) -> String {
    let uuid: String = uuid
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", uuid, file_name_of(location).unwrap_or(role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedService;
    use rbuild_client::RawResponse;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"{
        "uuid": "42",
        "stdout_location": "/r/42/stdout",
        "stderr_location": "/r/42/stderr",
        "files": [{"location": "/r/1/mod.ko", "mode": 493}]
    }"#;

    struct Dirs {
        _root: TempDir,
        work: PathBuf,
        output: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("work");
        let output = root.path().join("out");
        Dirs {
            _root: root,
            work,
            output,
        }
    }

    fn fetcher(service: ScriptedService, dirs: &Dirs) -> (Arc<ScriptedService>, ResultFetcher) {
        let service = Arc::new(service);
        let fetcher = ResultFetcher::new(service.clone(), dirs.work.clone(), dirs.output.clone());
        (service, fetcher)
    }

    #[tokio::test]
    async fn test_fetch_relays_streams_and_applies_mode() {
        let dirs = dirs();
        let (_, fetcher) = fetcher(
            ScriptedService::new()
                .on_get("/builds/42/result", RawResponse::new(200, MANIFEST))
                .with_artifact("/r/42/stdout", b"hello\n")
                .with_artifact("/r/42/stderr", b"Pass 5: run completed\n")
                .with_artifact("/r/1/mod.ko", b"\x7fELF"),
            &dirs,
        );

        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let report = fetcher
            .fetch("/builds/42/result", &mut out, &mut err)
            .await
            .unwrap();

        assert_eq!(out, b"hello\n");
        assert_eq!(err, b"Pass 5: run completed\n");
        assert!(report.streams_ok());
        assert!(report.failed_files.is_empty());

        let module = dirs.output.join("mod.ko");
        assert_eq!(report.delivered, vec![module.clone()]);
        assert_eq!(std::fs::read(&module).unwrap(), b"\x7fELF");
        let mode = std::fs::metadata(&module).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }

    #[tokio::test]
    async fn test_captured_streams_are_removed() {
        let dirs = dirs();
        let (_, fetcher) = fetcher(
            ScriptedService::new()
                .on_get("/res", RawResponse::new(200, MANIFEST))
                .with_artifact("/r/42/stdout", b"out")
                .with_artifact("/r/42/stderr", b"err")
                .with_artifact("/r/1/mod.ko", b"ko"),
            &dirs,
        );

        fetcher
            .fetch("/res", &mut Vec::<u8>::new(), &mut Vec::<u8>::new())
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(&dirs.work).unwrap().collect();
        assert!(leftovers.is_empty());
        assert!(dirs.output.join("mod.ko").exists());
    }

    #[tokio::test]
    async fn test_failed_stream_does_not_stop_other_downloads() {
        let dirs = dirs();
        let (service, fetcher) = fetcher(
            ScriptedService::new()
                .on_get("/res", RawResponse::new(200, MANIFEST))
                .with_missing_artifact("/r/42/stdout", 500)
                .with_artifact("/r/42/stderr", b"warning\n")
                .with_artifact("/r/1/mod.ko", b"ko"),
            &dirs,
        );

        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let report = fetcher.fetch("/res", &mut out, &mut err).await.unwrap();

        assert!(!report.stdout_ok);
        assert!(report.stderr_ok);
        assert!(!report.streams_ok());
        assert!(out.is_empty());
        assert_eq!(err, b"warning\n");
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(service.downloaded.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_file_is_reported() {
        let dirs = dirs();
        let body = r#"{
            "uuid": "7",
            "stdout_location": "/r/7/stdout",
            "stderr_location": "/r/7/stderr",
            "files": [
                {"location": "/r/7/a.ko", "mode": 420},
                {"location": "/r/7/b.ko", "mode": 420}
            ]
        }"#;
        let (_, fetcher) = fetcher(
            ScriptedService::new()
                .on_get("/res", RawResponse::new(200, body))
                .with_artifact("/r/7/stdout", b"")
                .with_artifact("/r/7/stderr", b"")
                .with_missing_artifact("/r/7/a.ko", 404)
                .with_artifact("/r/7/b.ko", b"b"),
            &dirs,
        );

        let report = fetcher
            .fetch("/res", &mut Vec::<u8>::new(), &mut Vec::<u8>::new())
            .await
            .unwrap();

        assert_eq!(report.failed_files, vec!["/r/7/a.ko".to_string()]);
        assert_eq!(report.delivered, vec![dirs.output.join("b.ko")]);
    }

    #[tokio::test]
    async fn test_incomplete_entries_are_skipped() {
        let dirs = dirs();
        let body = r#"{
            "uuid": "7",
            "stdout_location": "/r/7/stdout",
            "stderr_location": "/r/7/stderr",
            "files": [{"location": "/r/7/a.ko"}, {"location": "/r/7/..", "mode": 420}]
        }"#;
        let (service, fetcher) = fetcher(
            ScriptedService::new()
                .on_get("/res", RawResponse::new(200, body))
                .with_artifact("/r/7/stdout", b"")
                .with_artifact("/r/7/stderr", b""),
            &dirs,
        );

        let report = fetcher
            .fetch("/res", &mut Vec::<u8>::new(), &mut Vec::<u8>::new())
            .await
            .unwrap();

        assert_eq!(report.skipped_entries, 2);
        assert!(report.delivered.is_empty());
        assert!(report.failed_files.is_empty());
        assert_eq!(service.downloaded.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_manifest_without_uuid_is_fatal() {
        let dirs = dirs();
        let body = r#"{"stdout_location": "/o", "stderr_location": "/e"}"#;
        let (service, fetcher) = fetcher(
            ScriptedService::new().on_get("/res", RawResponse::new(200, body)),
            &dirs,
        );

        let err = fetcher
            .fetch("/res", &mut Vec::<u8>::new(), &mut Vec::<u8>::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Decode(DecodeError::MissingField("uuid"))
        ));
        assert!(service.downloaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manifest_status_must_be_200() {
        let dirs = dirs();
        let (_, fetcher) = fetcher(ScriptedService::new(), &dirs);

        let err = fetcher
            .fetch("/missing", &mut Vec::<u8>::new(), &mut Vec::<u8>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status(404)));
    }

    #[test]
    fn test_capture_name_is_job_scoped() {
        assert_eq!(capture_name("42", "/r/42/stdout", "stdout"), "42-stdout");
        assert_eq!(capture_name("a/b", "/r/", "stderr"), "a_b-r");
        assert_eq!(capture_name("a b", "", "stderr"), "a_b-stderr");
    }
}
