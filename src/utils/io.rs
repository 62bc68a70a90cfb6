//! File plumbing: temp artifacts, output naming and hashing

use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// File name prefix shared by every temporary artifact
pub const ARTIFACT_PREFIX: &str = ".scrubpdf-";

/// Suffix inserted before the extension of sanitized outputs
pub const OUTPUT_SUFFIX: &str = "_clean";

/// Per-run unique token used to name temporary artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken(Uuid);

impl RunToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn artifact_path(&self, dir: &Path, stage: &str) -> PathBuf {
        dir.join(format!("{ARTIFACT_PREFIX}{}-{stage}.pdf", self.0))
    }
}

impl Default for RunToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Temporary file removed when the guard is dropped
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temp artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove temp artifact"),
        }
    }
}

/// Deletes artifacts left in `dir` by earlier runs that are older than `max_age`.
///
/// Returns the number of files removed.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn reclaim_stale_artifacts(dir: &Path, max_age: Duration) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(ARTIFACT_PREFIX) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(path = %entry.path().display(), ?age, "reclaimed stale artifact");
                removed += 1;
            }
            Err(e) => warn!(path = %entry.path().display(), error = %e, "could not reclaim artifact"),
        }
    }
    Ok(removed)
}

/// Destination for the sanitized copy of `input`: `name_clean.ext`, next to
/// the input or inside `output_dir`. Never the input itself.
pub fn output_path_for(input: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| Error::NotADocument(input.to_path_buf()))?
        .to_string_lossy();
    let file_name = match input.extension() {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let output = dir.join(file_name);
    if same_file(&output, input) {
        return Err(Error::ConfigError(format!(
            "refusing to overwrite input {}",
            input.display()
        )));
    }
    Ok(output)
}

/// Comparable form of an output path: its directory canonicalized when it
/// already exists.
pub fn destination_key(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (dir.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
