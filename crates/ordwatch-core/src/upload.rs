//! Handing freshly written artifacts to whatever publishes them.

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::store::ArtifactPaths;

/// Receives each artifact pair right after a worker wrote both files.
///
/// Implementations must not block: the call happens on the worker task, and
/// the worker does not wait for the hand-off to finish.
pub trait Uploader: Send + Sync {
    fn upload(&self, txid: &str, artifact: &ArtifactPaths);
}

/// Keeps artifacts local.
pub struct NoopUploader;

impl Uploader for NoopUploader {
    fn upload(&self, txid: &str, _artifact: &ArtifactPaths) {
        debug!(txid, "no upload command configured");
    }
}

/// Runs `<program> <args...> <payload> <metadata>` for every artifact.
/// The child is not retried; its exit status is only logged.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    program: String,
    args: Vec<String>,
}

impl CommandUploader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Uploader for CommandUploader {
    fn upload(&self, txid: &str, artifact: &ArtifactPaths) {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&artifact.payload)
            .arg(&artifact.metadata);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(txid, program = %self.program, error = %err, "failed to start upload");
                return;
            }
        };

        let txid = txid.to_owned();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!(txid = %txid, "upload finished"),
                Ok(status) => warn!(txid = %txid, %status, "upload exited unsuccessfully"),
                Err(err) => error!(txid = %txid, error = %err, "upload process lost"),
            }
        });
    }
}
