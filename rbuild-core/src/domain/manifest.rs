//! Result manifest
//!
//! The manifest is parsed once from the body the terminal redirect points at,
//! and describes where each artifact of the finished job can be downloaded.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::DecodeError;

/// One additional output artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub location: String,
    /// POSIX permission bits applied after download
    pub mode: u32,
}

/// A `files` entry that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Position in the manifest's `files` array
    pub index: usize,
    pub reason: String,
}

/// Decoded result manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultManifest {
    pub uuid: String,
    pub stdout_location: String,
    pub stderr_location: String,
    pub files: Vec<FileEntry>,
    /// Entries dropped at decode time; the caller decides how loudly to report them
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    uuid: Option<String>,
    stdout_location: Option<String>,
    stderr_location: Option<String>,
    #[serde(default)]
    files: Option<Vec<JsonValue>>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DecodeError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(DecodeError::MissingField(field))
}

impl ResultManifest {
    /// Decode a manifest body
    ///
    /// `uuid`, `stdout_location` and `stderr_location` are mandatory. Malformed
    /// `files` entries are moved to [`ResultManifest::skipped`] instead of
    /// failing the decode.
    pub fn decode(body: &str) -> Result<Self, DecodeError> {
        let raw: RawManifest = serde_json::from_str(body)?;

        let uuid = required(raw.uuid, "uuid")?;
        let stdout_location = required(raw.stdout_location, "stdout_location")?;
        let stderr_location = required(raw.stderr_location, "stderr_location")?;

        let mut files = Vec::new();
        let mut skipped = Vec::new();

        for (index, entry) in raw.files.unwrap_or_default().iter().enumerate() {
            match decode_file_entry(entry) {
                Ok(file) => files.push(file),
                Err(reason) => skipped.push(SkippedEntry { index, reason }),
            }
        }

        Ok(Self {
            uuid,
            stdout_location,
            stderr_location,
            files,
            skipped,
        })
    }
}

fn decode_file_entry(entry: &JsonValue) -> Result<FileEntry, String> {
    let object = entry
        .as_object()
        .ok_or_else(|| "entry is not an object".to_string())?;

    let location = object
        .get("location")
        .and_then(JsonValue::as_str)
        .filter(|loc| !loc.trim().is_empty())
        .ok_or_else(|| "missing `location`".to_string())?;

    let mode = object
        .get("mode")
        .ok_or_else(|| "missing `mode`".to_string())
        .and_then(parse_mode)?;

    Ok(FileEntry {
        location: location.to_string(),
        mode,
    })
}

/// Permission bits from either a JSON integer or an octal string like `"0755"`
fn parse_mode(value: &JsonValue) -> Result<u32, String> {
    let mode = match value {
        JsonValue::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("invalid `mode` {}", n))?,
        JsonValue::String(s) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8).map_err(|_| format!("invalid `mode` {:?}", s))?
        }
        other => return Err(format!("invalid `mode` {}", other)),
    };

    if mode > 0o7777 {
        return Err(format!("`mode` {:o} out of range", mode));
    }
    Ok(mode)
}

/// Resolve a server-issued location against the service base address
///
/// Absolute URLs are used as-is; anything else is appended to the base.
pub fn resolve_location(base_url: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if location.starts_with('/') {
        format!("{}{}", base, location)
    } else {
        format!("{}/{}", base, location)
    }
}

/// Final path segment of a location, used as the local file name
///
/// Returns `None` for segments that cannot safely name a local file.
pub fn file_name_of(location: &str) -> Option<&str> {
    let path = location
        .split(['?', '#'])
        .next()
        .unwrap_or(location)
        .trim_end_matches('/');

    let name = path.rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name if name.contains('\\') => None,
        name => Some(name),
    }
}
