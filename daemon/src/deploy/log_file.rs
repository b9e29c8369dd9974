//! Deployment log lifecycle
//!
//! One live `current.log` per application, append-only. On completion the
//! live file is renamed to a timestamped permanent path; the in-memory
//! transcript is handed back to the caller. Retention runs before a new
//! run's live file is opened, so a run can never delete its own log.

use std::path::PathBuf;

use tokio::fs::{File as FsFile, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::QuayError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::utils::iso_timestamp;

/// Name of the live log file
pub const LIVE_LOG_NAME: &str = "current.log";

struct Inner {
    file: Option<FsFile>,
    transcript: String,
}

/// Live deployment log for one run
pub struct DeployLog {
    logs_dir: PathBuf,
    live_path: PathBuf,
    inner: Mutex<Inner>,
}

impl DeployLog {
    /// Open the live log in append mode, creating the logs directory first
    pub async fn open(logs_dir: &Dir) -> Result<Self, QuayError> {
        logs_dir.create().await?;
        let live_path = logs_dir.path().join(LIVE_LOG_NAME);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&live_path)
            .await?;

        Ok(Self {
            logs_dir: logs_dir.path().to_path_buf(),
            live_path,
            inner: Mutex::new(Inner {
                file: Some(file),
                transcript: String::new(),
            }),
        })
    }

    /// Path of the live log file
    pub fn live_path(&self) -> &PathBuf {
        &self.live_path
    }

    /// Write a structural line, prefixed with an ISO-8601 timestamp
    pub async fn write_line(&self, line: &str) -> Result<(), QuayError> {
        self.append(&format!("[{}] {}\n", iso_timestamp(), line)).await
    }

    /// Write a command line (`> cmd`)
    pub async fn write_command(&self, command: &str) -> Result<(), QuayError> {
        self.write_line(&format!("> {}", command)).await
    }

    /// Append raw text (subprocess stdout/stderr chunks)
    pub async fn append(&self, text: &str) -> Result<(), QuayError> {
        let mut inner = self.inner.lock().await;
        let file = inner
            .file
            .as_mut()
            .ok_or_else(|| QuayError::FilesystemError("log already finalized".to_string()))?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        inner.transcript.push_str(text);
        Ok(())
    }

    /// Rename the live file to a timestamped permanent path and return that
    /// path plus the full transcript. The only legal transition out of "live".
    pub async fn finalize(&self) -> Result<(PathBuf, String), QuayError> {
        let mut inner = self.inner.lock().await;
        let file = inner
            .file
            .take()
            .ok_or_else(|| QuayError::FilesystemError("log already finalized".to_string()))?;
        file.sync_all().await?;
        drop(file);

        let final_name = format!(
            "deploy-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f")
        );
        let final_path = self.logs_dir.join(final_name);
        File::new(&self.live_path).rename(&final_path).await?;

        debug!("Finalized deployment log: {}", final_path.display());
        Ok((final_path, std::mem::take(&mut inner.transcript)))
    }
}

/// Delete all but the newest `keep` finalized logs in `logs_dir`, sorted by
/// modification time descending. Returns the deleted paths so the record
/// store can prune matching references. Missing files are not an error.
pub async fn cleanup_finalized(logs_dir: &Dir, keep: usize) -> Result<Vec<PathBuf>, QuayError> {
    if !logs_dir.exists().await {
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = logs_dir
        .list_files_with_mtime()
        .await?
        .into_iter()
        .filter(|(path, _)| {
            path.file_name()
                .map(|n| n != LIVE_LOG_NAME)
                .unwrap_or(false)
        })
        .collect();

    // Newest first
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut deleted = Vec::new();
    for (path, _) in files.into_iter().skip(keep) {
        match File::new(&path).delete().await {
            Ok(()) => deleted.push(path),
            Err(e) => warn!("Failed to delete old log {}: {}", path.display(), e),
        }
    }

    Ok(deleted)
}
