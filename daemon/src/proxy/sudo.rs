//! Privilege-escalation sessions
//!
//! In-memory, process-lifetime session cache with a sliding 15-minute TTL.
//! Passwords are handed to `sudo -S` on stdin and never appear in a command
//! string or process list.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::deploy::command::apply_minimized_env;
use crate::errors::QuayError;

/// Sliding session lifetime
pub const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

struct SudoSession {
    password: SecretString,
    expires_at: Instant,
}

/// Mutex-protected sudo session store
pub struct SudoStore {
    sessions: Mutex<HashMap<String, SudoSession>>,
    ttl: Duration,
}

impl SudoStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Validate a password by running an elevated no-op
    pub async fn authenticate(&self, password: &SecretString) -> Result<(), QuayError> {
        let status = run_sudo(password, &["true"], None).await?;
        if !status.success() {
            return Err(QuayError::AuthError("sudo authentication failed".to_string()));
        }
        Ok(())
    }

    /// Cache a password under `id` with a fresh TTL
    pub async fn store(&self, id: &str, password: SecretString) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            id.to_string(),
            SudoSession {
                password,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Get a session password; expired entries are evicted, hits slide the
    /// expiry forward
    pub async fn get(&self, id: &str) -> Option<SecretString> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        sessions.retain(|_, s| s.expires_at > now);

        let session = sessions.get_mut(id)?;
        session.expires_at = now + self.ttl;
        Some(session.password.clone())
    }

    /// Remove a session
    pub async fn remove(&self, id: &str) {
        self.sessions.lock().await.remove(id);
    }

    /// Run a shell command elevated, using the cached session password.
    /// Fails with a distinct error when the session is absent or expired.
    pub async fn execute_elevated(
        &self,
        command: &str,
        cwd: Option<&std::path::Path>,
        session_id: &str,
    ) -> Result<String, QuayError> {
        let password = self.get(session_id).await.ok_or_else(|| {
            QuayError::AuthError("sudo session expired or not found".to_string())
        })?;

        debug!("Executing elevated command: {}", command);
        let output = run_sudo_output(&password, &["sh", "-c", command], cwd).await?;

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
}

impl Default for SudoStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sudo_command(args: &[&str], cwd: Option<&std::path::Path>) -> Command {
    let mut cmd = Command::new("sudo");
    // -k: do not reuse cached credentials; -S: read password from stdin
    cmd.args(["-k", "-S", "-p", ""]).args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    apply_minimized_env(&mut cmd);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

async fn spawn_with_password(
    password: &SecretString,
    args: &[&str],
    cwd: Option<&std::path::Path>,
) -> Result<tokio::process::Child, QuayError> {
    let mut child = sudo_command(args, cwd)
        .spawn()
        .map_err(|e| QuayError::PermissionError(format!("failed to spawn sudo: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(format!("{}\n", password.expose_secret()).as_bytes())
            .await?;
        drop(stdin);
    }

    Ok(child)
}

async fn run_sudo(
    password: &SecretString,
    args: &[&str],
    cwd: Option<&std::path::Path>,
) -> Result<std::process::ExitStatus, QuayError> {
    let output = run_sudo_output(password, args, cwd).await?;
    Ok(output.status)
}

async fn run_sudo_output(
    password: &SecretString,
    args: &[&str],
    cwd: Option<&std::path::Path>,
) -> Result<std::process::Output, QuayError> {
    let child = spawn_with_password(password, args, cwd).await?;
    let output = child
        .wait_with_output()
        .await
        .map_err(|e| QuayError::PermissionError(format!("sudo wait failed: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_session_is_distinct_error() {
        let store = SudoStore::new();
        let err = store.execute_elevated("true", None, "nope").await.unwrap_err();
        match err {
            QuayError::AuthError(msg) => assert!(msg.contains("session")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_session_evicted() {
        let store = SudoStore::with_ttl(Duration::from_millis(10));
        store.store("s1", SecretString::from("pw")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_get_slides_expiry() {
        let store = SudoStore::with_ttl(Duration::from_millis(80));
        store.store("s1", SecretString::from("pw")).await;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(store.get("s1").await.is_some(), "session should slide forward");
        }
    }
}
