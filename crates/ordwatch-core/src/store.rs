//! The flat directory of pending inscription artifacts.
//!
//! Every artifact is a pair of files keyed by txid:
//! - `<txid>.<ext>`, the raw payload;
//! - `<txid>.<ext>.json`, the metadata sidecar.
//!
//! There is no locking. Writes never replace a non-empty file and deletes
//! treat "already gone" as success, so a listener worker and the block
//! reconciler may touch the same txid in either order.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, trace};

use crate::error::CoreError;

const METADATA_SUFFIX: &str = ".json";

/// Which halves of an artifact a `write` call actually produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    pub payload_written: bool,
    pub metadata_written: bool,
}

impl WriteOutcome {
    pub fn wrote_both(&self) -> bool {
        self.payload_written && self.metadata_written
    }
}

/// Paths of one artifact's two files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub payload: PathBuf,
    pub metadata: PathBuf,
}

pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    /// Open the store, creating the directory if it does not exist yet.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, txid: &str, extension: &str) -> ArtifactPaths {
        let payload = self.dir.join(format!("{txid}.{extension}"));
        let metadata = self.dir.join(format!("{txid}.{extension}{METADATA_SUFFIX}"));
        ArtifactPaths { payload, metadata }
    }

    /// Write the payload and its metadata, skipping any file that already
    /// exists with content.
    pub async fn write(
        &self,
        txid: &str,
        extension: &str,
        payload: &[u8],
        metadata: &[u8],
    ) -> Result<WriteOutcome, CoreError> {
        let paths = self.paths(txid, extension);
        let outcome = WriteOutcome {
            payload_written: write_if_vacant(&paths.payload, payload).await?,
            metadata_written: write_if_vacant(&paths.metadata, metadata).await?,
        };
        debug!(
            txid,
            payload_written = outcome.payload_written,
            metadata_written = outcome.metadata_written,
            "artifact write"
        );
        Ok(outcome)
    }

    /// Remove every file whose name starts with `prefix`. Returns the paths
    /// that were actually removed by this call.
    pub async fn delete(&self, prefix: &str) -> Result<Vec<PathBuf>, CoreError> {
        let mut removed = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(prefix) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => removed.push(path),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    trace!(path = %path.display(), "already removed");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(removed)
    }

    /// Txids that currently have a metadata sidecar on disk.
    pub async fn persisted_ids(&self) -> Result<HashSet<String>, CoreError> {
        let mut ids = HashSet::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(METADATA_SUFFIX) {
                continue;
            }
            if let Some(id) = name.split('.').next().filter(|id| !id.is_empty()) {
                ids.insert(id.to_owned());
            }
        }
        Ok(ids)
    }
}

/// File extension for a payload of `content_type`: the media subtype,
/// except that SVG drops its `+xml` structured-syntax suffix.
pub fn extension_for(content_type: &str) -> &str {
    match content_type {
        "image/svg+xml" => "svg",
        other => other.rsplit('/').next().unwrap_or(other),
    }
}

async fn write_if_vacant(path: &Path, contents: &[u8]) -> Result<bool, CoreError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => return Ok(false),
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    fs::write(path, contents).await?;
    Ok(true)
}
