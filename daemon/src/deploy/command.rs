//! Shared subprocess invocation
//!
//! Every subprocess in the daemon goes through here: shell execution so
//! stored command strings may use pipes and redirection, an explicit working
//! directory, and a minimized environment (`HOME`, `PATH`, `USER` only) so
//! `.env` files loaded by the invoked command stay authoritative.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::deploy::log_file::DeployLog;
use crate::errors::QuayError;

/// Environment variables passed through to child processes
const KEPT_ENV: [&str; 3] = ["HOME", "PATH", "USER"];

/// Clear the child environment and pass through only `HOME`, `PATH`, `USER`
pub fn apply_minimized_env(cmd: &mut Command) {
    cmd.env_clear();
    for key in KEPT_ENV {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }
}

/// Build a shell command with explicit cwd and minimized environment
pub fn shell(command: &str, cwd: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(cwd);
    apply_minimized_env(&mut cmd);
    cmd
}

/// Run a program with discrete arguments, no shell involved, and capture
/// combined output. For callers whose arguments carry external input and
/// need no pipes or redirection.
pub async fn run_args(program: &str, args: &[&str], cwd: &Path) -> Result<String, QuayError> {
    debug!("Running {} {:?} in {}", program, args, cwd.display());

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(cwd);
    apply_minimized_env(&mut cmd);

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| QuayError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            detail: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(QuayError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            detail: combined,
        });
    }

    Ok(combined)
}

/// Run a command and capture combined output. Non-zero exit fails with the
/// command and its output in the error detail.
pub async fn run_sync(command: &str, cwd: &Path) -> Result<String, QuayError> {
    debug!("Running command in {}: {}", cwd.display(), command);

    let output = shell(command, cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| QuayError::CommandFailed {
            command: command.to_string(),
            detail: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(QuayError::CommandFailed {
            command: command.to_string(),
            detail: combined,
        });
    }

    Ok(combined)
}

/// Run a command, streaming stdout/stderr chunks into the deployment log as
/// they arrive. Resolves on exit code.
pub async fn run_streaming(
    command: &str,
    cwd: &Path,
    log: &Arc<DeployLog>,
) -> Result<(), QuayError> {
    debug!("Streaming command in {}: {}", cwd.display(), command);

    let mut child = shell(command, cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| QuayError::CommandFailed {
            command: command.to_string(),
            detail: e.to_string(),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = stdout.map(|s| tokio::spawn(pipe_to_log(s, log.clone())));
    let err_task = stderr.map(|s| tokio::spawn(pipe_to_log(s, log.clone())));

    let status = child.wait().await.map_err(|e| QuayError::CommandFailed {
        command: command.to_string(),
        detail: e.to_string(),
    })?;

    if let Some(task) = out_task {
        let _ = task.await;
    }
    if let Some(task) = err_task {
        let _ = task.await;
    }

    if !status.success() {
        return Err(QuayError::CommandFailed {
            command: command.to_string(),
            detail: format!("exit status {}", status.code().unwrap_or(-1)),
        });
    }

    Ok(())
}

async fn pipe_to_log(mut reader: impl AsyncReadExt + Unpin, log: Arc<DeployLog>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                let _ = log.append(&chunk).await;
            }
        }
    }
}
