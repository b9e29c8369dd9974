//! Deployment context and variable interpolation
//!
//! One context per pipeline run, owned by the executor for the duration of
//! the run. Templates reference context values through a fixed `$token$` set;
//! anything outside that set passes through verbatim.

use std::path::PathBuf;

use crate::storage::apps::{AppRecord, EnvFile, FileTransfer};
use crate::storage::layout::Layout;

/// Context for one deployment run
#[derive(Debug, Clone)]
pub struct DeploymentContext {
    pub app_id: String,
    pub app_name: String,
    pub branch: String,
    pub repo_url: String,
    pub port: u16,
    pub domain: String,
    pub subdomain: String,
    pub connection_string: String,

    /// Resolved directories for this application
    pub code_dir: PathBuf,
    pub release_dir: PathBuf,
    pub certs_dir: PathBuf,
    pub domain_certs_dir: PathBuf,
    pub logs_dir: PathBuf,

    /// Ordered command lists per phase
    pub prebuild: Vec<String>,
    pub build: Vec<String>,
    pub deployment: Vec<String>,
    pub launch: Vec<String>,

    pub transfers: Vec<FileTransfer>,
    pub env_file: Option<EnvFile>,
}

impl DeploymentContext {
    /// Build a context from a registered application and the directory layout
    pub fn from_app(app: &AppRecord, layout: &Layout) -> Self {
        Self {
            app_id: app.id.clone(),
            app_name: app.name.clone(),
            branch: app.branch.clone(),
            repo_url: app.repo_url.clone(),
            port: app.port,
            domain: app.domain.clone(),
            subdomain: app.subdomain.clone(),
            connection_string: app.connection_string.clone(),
            code_dir: layout.code_dir(&app.name).path().to_path_buf(),
            release_dir: layout.release_dir(&app.name).path().to_path_buf(),
            certs_dir: layout.certs_dir().path().to_path_buf(),
            domain_certs_dir: layout.domain_certs_dir(&app.domain).path().to_path_buf(),
            logs_dir: layout.app_logs_dir(&app.name).path().to_path_buf(),
            prebuild: app.prebuild.clone(),
            build: app.build.clone(),
            deployment: app.deployment.clone(),
            launch: app.launch.clone(),
            transfers: app.transfers.clone(),
            env_file: app.env_file.clone(),
        }
    }

    /// Replace every `$token$` from the fixed set with its context value.
    ///
    /// Absent values substitute as the empty string; unknown `$...$` text is
    /// left untouched. Values are trusted configuration, so substitution is
    /// plain text replacement.
    pub fn interpolate(&self, template: &str) -> String {
        let port = self.port.to_string();
        let cf = self.code_dir.to_string_lossy();
        let rf = self.release_dir.to_string_lossy();
        let certf = self.certs_dir.to_string_lossy();
        let dcertf = self.domain_certs_dir.to_string_lossy();
        let lf = self.logs_dir.to_string_lossy();
        let tokens: [(&str, &str); 12] = [
            ("$cf$", cf.as_ref()),
            ("$rf$", rf.as_ref()),
            ("$certf$", certf.as_ref()),
            ("$dcertf$", dcertf.as_ref()),
            ("$lf$", lf.as_ref()),
            ("$branch$", &self.branch),
            ("$app$", &self.app_name),
            ("$appid$", &self.app_id),
            ("$port$", &port),
            ("$subdomain$", &self.subdomain),
            ("$domain$", &self.domain),
            ("$dburi$", &self.connection_string),
        ];

        let mut out = template.to_string();
        for (token, value) in tokens {
            if out.contains(token) {
                out = out.replace(token, value);
            }
        }
        out
    }
}
