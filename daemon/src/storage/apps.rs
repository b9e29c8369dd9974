//! Application registry
//!
//! Read-only inputs to the deployment engine: one record per registered
//! application, loaded from `apps.json` under the home directory. The daemon
//! never mutates these; the registry is maintained by the operator or an
//! external management surface.

use serde::{Deserialize, Serialize};

use crate::errors::QuayError;
use crate::filesys::file::File;

/// File transfer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOp {
    Cp,
    Mv,
    Ln,
    Rm,
}

/// One file transfer step; `src` and `dest` are interpolation templates.
/// `rm` ignores `dest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransfer {
    pub src: String,
    #[serde(default)]
    pub dest: String,
    pub op: TransferOp,
}

/// Environment file payload written into the code directory before the build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvFile {
    /// `KEY=VALUE` lines; interpolated before writing
    pub content: String,

    /// Target path relative to the code directory
    #[serde(default = "default_env_path")]
    pub path: String,
}

fn default_env_path() -> String {
    ".env".to_string()
}

/// A registered application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    /// Unique application ID
    pub id: String,

    /// Application name; also names the code/release/log directories and the
    /// nginx site config
    pub name: String,

    /// Git repository URL
    pub repo_url: String,

    /// Target branch; `*` accepts pushes to any branch
    pub branch: String,

    /// Port the application listens on
    pub port: u16,

    /// Domain served by the reverse proxy
    #[serde(default)]
    pub domain: String,

    /// Subdomain served by the reverse proxy
    #[serde(default)]
    pub subdomain: String,

    /// Opaque per-app connection string (e.g. a database URI)
    #[serde(default)]
    pub connection_string: String,

    /// Ordered command lists for the pipeline phases
    #[serde(default)]
    pub prebuild: Vec<String>,
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub deployment: Vec<String>,
    #[serde(default)]
    pub launch: Vec<String>,

    /// File transfers executed between build and deployment
    #[serde(default)]
    pub transfers: Vec<FileTransfer>,

    /// Optional environment file payload
    #[serde(default)]
    pub env_file: Option<EnvFile>,

    /// Optional nginx site template, interpolated per run
    #[serde(default)]
    pub nginx_template: Option<String>,
}

/// Application registry backed by `apps.json`
pub struct AppStore {
    file: File,
    apps: Vec<AppRecord>,
}

impl AppStore {
    /// Load the registry; a missing file yields an empty registry
    pub async fn load(file: File) -> Result<Self, QuayError> {
        let apps = if file.exists().await {
            file.read_json::<Vec<AppRecord>>().await?
        } else {
            Vec::new()
        };
        Ok(Self { file, apps })
    }

    /// Get the backing file path
    pub fn file(&self) -> &File {
        &self.file
    }

    /// All registered applications
    pub fn all(&self) -> &[AppRecord] {
        &self.apps
    }

    /// Find an application by name
    pub fn find_by_name(&self, name: &str) -> Option<&AppRecord> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Find an application by repository name, matching the trailing path
    /// segment of the configured repo URL (with `.git` stripped)
    pub fn find_by_repo(&self, repo_name: &str) -> Option<&AppRecord> {
        self.apps.iter().find(|a| {
            a.repo_url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .map(|seg| seg.trim_end_matches(".git") == repo_name)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, repo_url: &str) -> AppRecord {
        AppRecord {
            id: "1".into(),
            name: name.into(),
            repo_url: repo_url.into(),
            branch: "main".into(),
            port: 3000,
            domain: String::new(),
            subdomain: String::new(),
            connection_string: String::new(),
            prebuild: vec![],
            build: vec![],
            deployment: vec![],
            launch: vec![],
            transfers: vec![],
            env_file: None,
            nginx_template: None,
        }
    }

    #[test]
    fn test_find_by_repo_strips_git_suffix() {
        let store = AppStore {
            file: File::new("/tmp/apps.json"),
            apps: vec![app("demo", "https://github.com/acme/demo.git")],
        };
        assert!(store.find_by_repo("demo").is_some());
        assert!(store.find_by_repo("other").is_none());
    }

    #[test]
    fn test_find_by_repo_without_git_suffix() {
        let store = AppStore {
            file: File::new("/tmp/apps.json"),
            apps: vec![app("demo", "git@gitlab.com:acme/demo")],
        };
        assert!(store.find_by_repo("demo").is_some());
    }
}
