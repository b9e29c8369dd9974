//! Deployment worker
//!
//! One detached tokio task per triggered deployment. The trigger path returns
//! as soon as the record exists and the task is dispatched. A per-application
//! run lock rejects a second trigger while a run is in flight; two concurrent
//! runs would share one live log and one code directory. There is no
//! cancellation and no per-command timeout; a hung command blocks its run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::app::state::AppState;
use crate::deploy::context::DeploymentContext;
use crate::deploy::log_file::{cleanup_finalized, DeployLog};
use crate::deploy::pipeline::Pipeline;
use crate::errors::QuayError;
use crate::storage::apps::AppRecord;
use crate::storage::records::{DeploymentRecord, DeploymentTrigger};

/// In-memory registry of applications with a run in flight
pub struct RunRegistry {
    running: Mutex<HashSet<String>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Whether an application currently has a run in flight
    pub fn is_running(&self, app_id: &str) -> bool {
        self.running.lock().unwrap().contains(app_id)
    }

    /// Claim the run slot for an application; `None` when already claimed
    pub fn try_acquire(self: &Arc<Self>, app_id: &str) -> Option<RunGuard> {
        let mut running = self.running.lock().unwrap();
        if !running.insert(app_id.to_string()) {
            return None;
        }
        Some(RunGuard {
            registry: self.clone(),
            app_id: app_id.to_string(),
        })
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the run slot on drop
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    app_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.running.lock().unwrap().remove(&self.app_id);
    }
}

/// Create the deployment record, open the live log, and dispatch the pipeline
/// on a detached task. Returns the record id once the task is running.
pub async fn spawn_deployment(
    state: Arc<AppState>,
    app: AppRecord,
    trigger: DeploymentTrigger,
    triggered_by: &str,
) -> Result<String, QuayError> {
    let guard = state.registry.try_acquire(&app.id).ok_or_else(|| {
        QuayError::ValidationError(format!("deployment already in progress for {}", app.name))
    })?;

    // Retention runs before the live file is opened so this run's own log can
    // never fall to the retention pass
    let logs_dir = state.layout.app_logs_dir(&app.name);
    match cleanup_finalized(&logs_dir, state.settings.keep_logs).await {
        Ok(deleted) => {
            if let Err(e) = state.records.prune_logs(&deleted).await {
                warn!("Failed to prune deployment records: {}", e);
            }
        }
        Err(e) => warn!("Log retention failed for {}: {}", app.name, e),
    }

    let record = DeploymentRecord::new(&app.id, &app.name, &app.branch, trigger, triggered_by);
    let record_id = record.id.clone();
    state.records.create(record).await?;

    // No log file means no observable run; this failure is fatal
    let log = Arc::new(DeployLog::open(&logs_dir).await?);
    let live_path = log.live_path().clone();
    state.records.mark_running(&record_id, &live_path).await?;

    info!("Dispatching deployment {} for {}", record_id, app.name);

    let task_state = state.clone();
    let task_record_id = record_id.clone();
    tokio::spawn(async move {
        let _guard = guard;
        run_deployment(task_state, app, task_record_id, log, live_path).await;
    });

    Ok(record_id)
}

async fn run_deployment(
    state: Arc<AppState>,
    app: AppRecord,
    record_id: String,
    log: Arc<DeployLog>,
    live_path: std::path::PathBuf,
) {
    let ctx = DeploymentContext::from_app(&app, &state.layout);
    let pipeline = Pipeline::new(ctx.clone(), log);

    match pipeline.run().await {
        Ok(outcome) => {
            if let Err(e) = state
                .records
                .mark_finished(&record_id, outcome.success, &outcome.log_file, outcome.error.clone())
                .await
            {
                error!("Failed to update deployment record {}: {}", record_id, e);
            }

            if outcome.success {
                info!("Deployment {} for {} succeeded", record_id, app.name);
                refresh_routing(&state, &app, &ctx).await;
            } else {
                error!(
                    "Deployment {} for {} failed: {}",
                    record_id,
                    app.name,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Err(e) => {
            // Finalize itself failed; the live path is the best log we have
            error!("Deployment {} for {} aborted: {}", record_id, app.name, e);
            if let Err(e) = state
                .records
                .mark_finished(&record_id, false, &live_path, Some(e.to_string()))
                .await
            {
                error!("Failed to update deployment record {}: {}", record_id, e);
            }
        }
    }
}

/// Best-effort site refresh after a successful run: write and enable the
/// interpolated site config, then reload the proxy. Failures here are
/// warnings; the deployment itself already succeeded.
async fn refresh_routing(state: &AppState, app: &AppRecord, ctx: &DeploymentContext) {
    let Some(template) = &app.nginx_template else {
        return;
    };

    let rendered = ctx.interpolate(template);
    if let Err(e) = state.nginx.write_site(&app.name, &rendered).await {
        warn!("Failed to write site config for {}: {}", app.name, e);
        return;
    }

    match state.nginx.enable_site(&app.name, None).await {
        Ok(true) => info!("Enabled site for {}", app.name),
        Ok(false) => {}
        Err(e) => warn!("Failed to enable site for {}: {}", app.name, e),
    }

    if !state.nginx.reload(None).await {
        warn!("Proxy reload failed after deploying {}", app.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_second_acquire() {
        let registry = Arc::new(RunRegistry::new());
        let guard = registry.try_acquire("app-1").unwrap();
        assert!(registry.try_acquire("app-1").is_none());
        assert!(registry.is_running("app-1"));
        drop(guard);
        assert!(!registry.is_running("app-1"));
        assert!(registry.try_acquire("app-1").is_some());
    }

    #[test]
    fn test_registry_isolated_per_app() {
        let registry = Arc::new(RunRegistry::new());
        let _a = registry.try_acquire("app-1").unwrap();
        assert!(registry.try_acquire("app-2").is_some());
    }
}
