//! Repository initialization
//!
//! Shallow multi-branch clone into the code directory, then checkout of the
//! target branch. Only runs when the code directory does not yet exist.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::deploy::command::run_streaming;
use crate::deploy::log_file::DeployLog;
use crate::errors::QuayError;

/// Clone `repo_url` into `code_dir` and check out `branch`, streaming git
/// output into the deployment log
pub async fn clone_repository(
    repo_url: &str,
    branch: &str,
    code_dir: &Path,
    log: &Arc<DeployLog>,
) -> Result<(), QuayError> {
    info!("Cloning {} (branch: {}) into {}", repo_url, branch, code_dir.display());

    let parent = code_dir
        .parent()
        .ok_or_else(|| QuayError::FilesystemError("code directory has no parent".to_string()))?;

    let clone_cmd = format!(
        "git clone --depth 1 --no-single-branch '{}' '{}'",
        repo_url,
        code_dir.display()
    );
    log.write_command(&clone_cmd).await?;
    run_streaming(&clone_cmd, parent, log).await?;

    let checkout_cmd = format!("git checkout '{}'", branch);
    log.write_command(&checkout_cmd).await?;
    run_streaming(&checkout_cmd, code_dir, log).await?;

    Ok(())
}
