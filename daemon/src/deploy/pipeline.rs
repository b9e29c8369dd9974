//! Phased pipeline executor
//!
//! Phases run strictly in order: initialize -> prebuild -> env-file write ->
//! release-folder ensure -> build -> file transfers -> deployment -> launch.
//! Launch runs in the release directory; every other phase runs in the code
//! directory. A failing file transfer is a logged warning and the loop
//! continues; any other command failure aborts the run. The executor owns the
//! log lifecycle for the run but never touches the deployment record.

use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::command::{run_streaming, run_sync};
use crate::deploy::context::DeploymentContext;
use crate::deploy::git::clone_repository;
use crate::deploy::log_file::DeployLog;
use crate::errors::QuayError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::storage::apps::TransferOp;

/// Result of one pipeline run
#[derive(Debug)]
pub struct PipelineOutcome {
    pub success: bool,
    /// Full textual transcript of the run
    pub output: String,
    /// Finalized log file path
    pub log_file: std::path::PathBuf,
    pub error: Option<String>,
}

/// Pipeline executor for one deployment run
pub struct Pipeline {
    ctx: DeploymentContext,
    log: Arc<DeployLog>,
}

impl Pipeline {
    pub fn new(ctx: DeploymentContext, log: Arc<DeployLog>) -> Self {
        Self { ctx, log }
    }

    /// Run all phases, finalize the log either way, and report the outcome
    pub async fn run(self) -> Result<PipelineOutcome, QuayError> {
        let result = self.run_phases().await;

        let error = match &result {
            Ok(()) => None,
            Err(e) => {
                // The failure line is part of the transcript
                let _ = self.log.write_line(&format!("ERROR: {}", e)).await;
                Some(e.to_string())
            }
        };

        let (log_file, output) = self.log.finalize().await?;

        Ok(PipelineOutcome {
            success: error.is_none(),
            output,
            log_file,
            error,
        })
    }

    async fn run_phases(&self) -> Result<(), QuayError> {
        let ctx = &self.ctx;
        self.log
            .write_line(&format!(
                "Starting deployment of {} ({})",
                ctx.app_name, ctx.branch
            ))
            .await?;

        self.initialize().await?;
        self.run_commands("prebuild", &ctx.prebuild, &ctx.code_dir).await?;
        self.write_env_file().await?;
        self.ensure_release_dir().await?;
        self.run_commands("build", &ctx.build, &ctx.code_dir).await?;
        self.run_transfers().await?;
        self.run_commands("deployment", &ctx.deployment, &ctx.code_dir).await?;
        self.run_commands("launch", &ctx.launch, &ctx.release_dir).await?;

        self.log.write_line("Deployment completed successfully").await?;
        Ok(())
    }

    /// Create directories and clone the repository, only when the code
    /// directory does not yet exist
    async fn initialize(&self) -> Result<(), QuayError> {
        let code_dir = Dir::new(&self.ctx.code_dir);
        if code_dir.exists().await {
            return Ok(());
        }

        self.log.write_line("Initializing application directories").await?;
        Dir::new(&self.ctx.release_dir).create().await?;
        Dir::new(&self.ctx.logs_dir).create().await?;
        if let Some(parent) = self.ctx.code_dir.parent() {
            Dir::new(parent).create().await?;
        }

        clone_repository(&self.ctx.repo_url, &self.ctx.branch, &self.ctx.code_dir, &self.log).await
    }

    /// Run one phase's command list in `cwd`; empty list skips the phase
    async fn run_commands(
        &self,
        phase: &str,
        commands: &[String],
        cwd: &std::path::Path,
    ) -> Result<(), QuayError> {
        if commands.is_empty() {
            return Ok(());
        }

        info!("Running {} phase for {}", phase, self.ctx.app_name);
        self.log.write_line(&format!("Phase: {}", phase)).await?;

        for command in commands {
            let command = self.ctx.interpolate(command);
            self.log.write_command(&command).await?;
            run_streaming(&command, cwd, &self.log).await?;
        }

        Ok(())
    }

    /// Interpolate and write the environment file into the code directory
    async fn write_env_file(&self) -> Result<(), QuayError> {
        let Some(env_file) = &self.ctx.env_file else {
            return Ok(());
        };

        let content = self.ctx.interpolate(&env_file.content);
        let target = self.ctx.code_dir.join(&env_file.path);
        File::new(&target).write_string(&content).await?;
        self.log
            .write_line(&format!("Wrote environment file: {}", env_file.path))
            .await?;
        Ok(())
    }

    async fn ensure_release_dir(&self) -> Result<(), QuayError> {
        let release_dir = Dir::new(&self.ctx.release_dir);
        if release_dir.exists().await {
            self.log.write_line("Release directory already exists").await?;
        } else {
            release_dir.create().await?;
            self.log.write_line("Created release directory").await?;
        }
        Ok(())
    }

    /// Execute file transfers; a failing transfer is a warning, not an abort
    async fn run_transfers(&self) -> Result<(), QuayError> {
        if self.ctx.transfers.is_empty() {
            return Ok(());
        }

        self.log.write_line("Phase: file transfers").await?;

        for transfer in &self.ctx.transfers {
            let src = self.ctx.interpolate(&transfer.src);
            let dest = self.ctx.interpolate(&transfer.dest);
            let command = match transfer.op {
                TransferOp::Cp => format!("cp -rf {} {}", src, dest),
                TransferOp::Mv => format!("mv -f {} {}", src, dest),
                TransferOp::Ln => format!("ln -sf {} {}", src, dest),
                TransferOp::Rm => format!("rm -rf {}", src),
            };

            self.log.write_command(&command).await?;
            match run_sync(&command, &self.ctx.code_dir).await {
                Ok(output) => {
                    if !output.is_empty() {
                        self.log.append(&output).await?;
                    }
                }
                Err(e) => {
                    warn!("File transfer failed for {}: {}", self.ctx.app_name, e);
                    self.log
                        .write_line(&format!("WARN: file transfer failed: {}", e))
                        .await?;
                }
            }
        }

        Ok(())
    }
}
