//! Deployment record store
//!
//! Persisted state machine per run: pending -> running -> success | failed.
//! Terminal records are never mutated again; records are pruned only when log
//! retention deletes their log file or the owning application is removed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::QuayError;
use crate::filesys::file::File;

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl DeploymentStatus {
    /// Whether a transition to `next` is legal
    pub fn can_transition(&self, next: DeploymentStatus) -> bool {
        matches!(
            (self, next),
            (DeploymentStatus::Pending, DeploymentStatus::Running)
                | (DeploymentStatus::Running, DeploymentStatus::Success)
                | (DeploymentStatus::Running, DeploymentStatus::Failed)
        )
    }

    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

/// What triggered a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTrigger {
    Webhook,
    Manual,
    Cli,
    Initial,
}

/// One deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Unique deployment ID
    pub id: String,

    /// Owning application ID
    pub app_id: String,

    /// Owning application name
    pub app_name: String,

    /// Current status
    pub status: DeploymentStatus,

    /// What triggered this run
    pub trigger: DeploymentTrigger,

    /// Who or what triggered it (webhook repo, username, "cli")
    pub triggered_by: String,

    /// Branch being deployed
    pub branch: String,

    /// When the record was created
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Exit code of the run (0 on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Path to the live or finalized log file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// First fatal error message, set on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DeploymentRecord {
    /// Create a new pending record
    pub fn new(
        app_id: &str,
        app_name: &str,
        branch: &str,
        trigger: DeploymentTrigger,
        triggered_by: &str,
    ) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            app_id: app_id.to_string(),
            app_name: app_name.to_string(),
            status: DeploymentStatus::Pending,
            trigger,
            triggered_by: triggered_by.to_string(),
            branch: branch.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            exit_code: None,
            log_file: None,
            error_message: None,
        }
    }

    fn transition(&mut self, next: DeploymentStatus) -> Result<(), QuayError> {
        if !self.status.can_transition(next) {
            return Err(QuayError::ValidationError(format!(
                "invalid deployment transition: {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Deployment record store backed by `deployments.json`
pub struct RecordStore {
    file: File,
    records: Mutex<Vec<DeploymentRecord>>,
}

impl RecordStore {
    /// Load the store; a missing file yields an empty store
    pub async fn load(file: File) -> Result<Self, QuayError> {
        let records = if file.exists().await {
            file.read_json::<Vec<DeploymentRecord>>().await?
        } else {
            Vec::new()
        };
        Ok(Self {
            file,
            records: Mutex::new(records),
        })
    }

    /// Insert a new pending record and persist
    pub async fn create(&self, record: DeploymentRecord) -> Result<(), QuayError> {
        let mut records = self.records.lock().await;
        records.push(record);
        self.persist(&records).await
    }

    /// Move a record to running and attach its live log path
    pub async fn mark_running(&self, id: &str, log_file: &Path) -> Result<(), QuayError> {
        self.update(id, |rec| {
            rec.transition(DeploymentStatus::Running)?;
            rec.log_file = Some(log_file.to_path_buf());
            Ok(())
        })
        .await
    }

    /// Move a record to a terminal state
    pub async fn mark_finished(
        &self,
        id: &str,
        success: bool,
        log_file: &Path,
        error_message: Option<String>,
    ) -> Result<(), QuayError> {
        self.update(id, |rec| {
            rec.transition(if success {
                DeploymentStatus::Success
            } else {
                DeploymentStatus::Failed
            })?;
            rec.completed_at = Some(Utc::now());
            rec.exit_code = Some(if success { 0 } else { 1 });
            rec.log_file = Some(log_file.to_path_buf());
            rec.error_message = error_message;
            Ok(())
        })
        .await
    }

    async fn update<F>(&self, id: &str, f: F) -> Result<(), QuayError>
    where
        F: FnOnce(&mut DeploymentRecord) -> Result<(), QuayError>,
    {
        let mut records = self.records.lock().await;
        let rec = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| QuayError::NotFound(format!("deployment {}", id)))?;
        f(rec)?;
        self.persist(&records).await
    }

    /// Remove records whose log file was deleted by retention
    pub async fn prune_logs(&self, deleted: &[PathBuf]) -> Result<(), QuayError> {
        if deleted.is_empty() {
            return Ok(());
        }
        let mut records = self.records.lock().await;
        records.retain(|r| match &r.log_file {
            Some(path) => !deleted.contains(path),
            None => true,
        });
        self.persist(&records).await
    }

    /// Remove all records for one application
    pub async fn prune_app(&self, app_id: &str) -> Result<(), QuayError> {
        let mut records = self.records.lock().await;
        records.retain(|r| r.app_id != app_id);
        self.persist(&records).await
    }

    /// Get one record by id
    pub async fn get(&self, id: &str) -> Option<DeploymentRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }

    /// List records for one application, newest first
    pub async fn list_for_app(&self, app_id: &str) -> Vec<DeploymentRecord> {
        let records = self.records.lock().await;
        let mut out: Vec<_> = records.iter().filter(|r| r.app_id == app_id).cloned().collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out
    }

    async fn persist(&self, records: &[DeploymentRecord]) -> Result<(), QuayError> {
        self.file.write_json(&records.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use DeploymentStatus::*;
        assert!(Pending.can_transition(Running));
        assert!(Running.can_transition(Success));
        assert!(Running.can_transition(Failed));
        assert!(!Pending.can_transition(Success));
        assert!(!Success.can_transition(Running));
        assert!(!Failed.can_transition(Running));
        assert!(!Success.can_transition(Failed));
    }

    #[test]
    fn test_terminal_records_reject_mutation() {
        let mut rec = DeploymentRecord::new("1", "demo", "main", DeploymentTrigger::Manual, "tester");
        rec.transition(DeploymentStatus::Running).unwrap();
        rec.transition(DeploymentStatus::Success).unwrap();
        assert!(rec.status.is_terminal());
        assert!(rec.transition(DeploymentStatus::Failed).is_err());
    }

    #[test]
    fn test_new_record_is_pending() {
        let rec = DeploymentRecord::new("1", "demo", "main", DeploymentTrigger::Webhook, "push");
        assert_eq!(rec.status, DeploymentStatus::Pending);
        assert!(rec.completed_at.is_none());
        assert!(rec.log_file.is_none());
    }
}
