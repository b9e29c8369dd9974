//! Process-supervisor controller
//!
//! Shells out to a pm2-compatible CLI by symbolic process name. Status comes
//! from the supervisor's machine-readable `jlist` output; an unreachable
//! supervisor reports `stopped`/empty instead of failing. The `self`
//! pseudo-name addresses the daemon's own supervisor entry.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::deploy::command::run_args;
use crate::errors::QuayError;
use crate::storage::settings::SupervisorSettings;

/// Supervisor lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    Start,
    Stop,
    Restart,
    Reload,
    Delete,
}

impl SupervisorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorAction::Start => "start",
            SupervisorAction::Stop => "stop",
            SupervisorAction::Restart => "restart",
            SupervisorAction::Reload => "reload",
            SupervisorAction::Delete => "delete",
        }
    }
}

impl std::str::FromStr for SupervisorAction {
    type Err = QuayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(SupervisorAction::Start),
            "stop" => Ok(SupervisorAction::Stop),
            "restart" => Ok(SupervisorAction::Restart),
            "reload" => Ok(SupervisorAction::Reload),
            "delete" => Ok(SupervisorAction::Delete),
            _ => Err(QuayError::ValidationError(format!(
                "unknown supervisor action: {}",
                s
            ))),
        }
    }
}

/// Status of one supervised process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    pub name: String,
    pub status: String,
    pub pid: Option<u32>,
    pub cpu: f64,
    pub memory: u64,
    pub uptime_ms: u64,
    pub restarts: u64,
}

impl ProcessStatus {
    fn stopped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: "stopped".to_string(),
            pid: None,
            cpu: 0.0,
            memory: 0,
            uptime_ms: 0,
            restarts: 0,
        }
    }
}

/// Controller for the process supervisor CLI
pub struct SupervisorController {
    settings: SupervisorSettings,
    cwd: std::path::PathBuf,
}

impl SupervisorController {
    pub fn new(settings: SupervisorSettings, cwd: std::path::PathBuf) -> Self {
        Self { settings, cwd }
    }

    /// Resolve the `self` pseudo-name to the daemon's own entry name
    fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        if name == "self" {
            &self.settings.self_name
        } else {
            name
        }
    }

    /// Run a lifecycle action against a named process. The name comes from
    /// the HTTP path, so it is passed as a discrete argument and never goes
    /// through a shell.
    pub async fn run_action(
        &self,
        name: &str,
        action: SupervisorAction,
    ) -> Result<String, QuayError> {
        let name = self.resolve_name(name);
        info!("Supervisor: {} {}", action.as_str(), name);
        run_args(&self.settings.bin, &[action.as_str(), name], &self.cwd).await
    }

    /// Query the status of one process; an unreachable supervisor or an
    /// unknown name reports `stopped` rather than an error
    pub async fn describe(&self, name: &str) -> ProcessStatus {
        let name = self.resolve_name(name);

        let output = match run_args(&self.settings.bin, &["jlist"], &self.cwd).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Supervisor unreachable: {}", e);
                return ProcessStatus::stopped(name);
            }
        };

        parse_jlist(&output, name).unwrap_or_else(|| ProcessStatus::stopped(name))
    }
}

/// Extract one process entry from the supervisor's JSON list output
fn parse_jlist(output: &str, name: &str) -> Option<ProcessStatus> {
    // The CLI may print banner lines before the JSON array
    let json_start = output.find('[')?;
    let entries: Vec<Value> = serde_json::from_str(output[json_start..].trim()).ok()?;

    let entry = entries
        .iter()
        .find(|e| e.get("name").and_then(Value::as_str) == Some(name))?;

    let env = entry.get("pm2_env");
    let monit = entry.get("monit");

    let status = env
        .and_then(|e| e.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("stopped")
        .to_string();

    let uptime_ms = env
        .and_then(|e| e.get("pm_uptime"))
        .and_then(Value::as_u64)
        .map(|started| {
            let now = chrono::Utc::now().timestamp_millis() as u64;
            now.saturating_sub(started)
        })
        .unwrap_or(0);

    Some(ProcessStatus {
        name: name.to_string(),
        status,
        pid: entry.get("pid").and_then(Value::as_u64).map(|p| p as u32),
        cpu: monit
            .and_then(|m| m.get("cpu"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        memory: monit
            .and_then(|m| m.get("memory"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        uptime_ms,
        restarts: env
            .and_then(|e| e.get("restart_time"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const JLIST: &str = r#"[
        {
            "pid": 4242,
            "name": "demo",
            "pm2_env": {"status": "online", "pm_uptime": 1, "restart_time": 3},
            "monit": {"memory": 52428800, "cpu": 1.5}
        },
        {
            "pid": 0,
            "name": "other",
            "pm2_env": {"status": "stopped", "restart_time": 0},
            "monit": {"memory": 0, "cpu": 0}
        }
    ]"#;

    #[test]
    fn test_parse_jlist_known_process() {
        let status = parse_jlist(JLIST, "demo").unwrap();
        assert_eq!(status.status, "online");
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.memory, 52428800);
        assert_eq!(status.restarts, 3);
        assert!(status.uptime_ms > 0);
    }

    #[test]
    fn test_parse_jlist_unknown_process() {
        assert!(parse_jlist(JLIST, "missing").is_none());
    }

    #[test]
    fn test_parse_jlist_with_banner_noise() {
        let noisy = format!("pm2 launched\n{}", JLIST);
        assert!(parse_jlist(&noisy, "demo").is_some());
    }

    #[test]
    fn test_parse_jlist_garbage() {
        assert!(parse_jlist("not json at all", "demo").is_none());
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("restart".parse::<SupervisorAction>().unwrap(), SupervisorAction::Restart);
        assert!("explode".parse::<SupervisorAction>().is_err());
    }

    #[tokio::test]
    async fn test_run_action_passes_name_verbatim_no_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pwned");

        // With `echo` as the supervisor binary the name is just printed. A
        // shell would honor the quote break-out and run the embedded touch.
        let settings = SupervisorSettings {
            bin: "echo".to_string(),
            self_name: "quayd".to_string(),
        };
        let controller = SupervisorController::new(settings, dir.path().to_path_buf());

        let name = format!("x'; touch {} #", marker.display());
        let output = controller
            .run_action(&name, SupervisorAction::Start)
            .await
            .unwrap();

        assert!(!marker.exists());
        assert!(output.contains(&name));
    }
}
