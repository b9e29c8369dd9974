//! Directory layout derived from the configured home directory
//!
//! All paths are fixed-name joins off a single `home` directory; the getters
//! perform no I/O. Directory creation happens in [`Layout::setup`] with
//! `mkdir -p` semantics.

use std::path::PathBuf;

use crate::errors::QuayError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Directory layout for the daemon
#[derive(Debug, Clone)]
pub struct Layout {
    /// Base directory for all managed state
    pub home: PathBuf,
}

impl Layout {
    /// Create a new layout rooted at `home`
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.home.join("settings.json"))
    }

    /// Get the application registry file path
    pub fn apps_file(&self) -> File {
        File::new(self.home.join("apps.json"))
    }

    /// Get the deployment records file path
    pub fn records_file(&self) -> File {
        File::new(self.home.join("deployments.json"))
    }

    /// Get the code checkouts directory
    pub fn code_dir_root(&self) -> Dir {
        Dir::new(self.home.join("code"))
    }

    /// Get the release artifacts directory
    pub fn release_dir_root(&self) -> Dir {
        Dir::new(self.home.join("releases"))
    }

    /// Get the certificates directory
    pub fn certs_dir(&self) -> Dir {
        Dir::new(self.home.join("certs"))
    }

    /// Get the per-domain certificate directory
    pub fn domain_certs_dir(&self, domain: &str) -> Dir {
        self.certs_dir().subdir(domain)
    }

    /// Get the deployment logs directory
    pub fn logs_dir_root(&self) -> Dir {
        Dir::new(self.home.join("logs"))
    }

    /// Get the nginx "available" site configs directory
    pub fn sites_available_dir(&self) -> Dir {
        Dir::new(self.home.join("nginx").join("sites-available"))
    }

    /// Get the nginx "enabled" site configs directory
    pub fn sites_enabled_dir(&self) -> Dir {
        Dir::new(self.home.join("nginx").join("sites-enabled"))
    }

    /// Code checkout directory for one application
    pub fn code_dir(&self, app_name: &str) -> Dir {
        self.code_dir_root().subdir(app_name)
    }

    /// Release directory for one application
    pub fn release_dir(&self, app_name: &str) -> Dir {
        self.release_dir_root().subdir(app_name)
    }

    /// Deployment logs directory for one application
    pub fn app_logs_dir(&self, app_name: &str) -> Dir {
        self.logs_dir_root().subdir(app_name)
    }

    /// The "available" site config for one application
    pub fn site_available(&self, app_name: &str) -> File {
        self.sites_available_dir().file(&format!("{}.conf", app_name))
    }

    /// The "enabled" site config for one application
    pub fn site_enabled(&self, app_name: &str) -> File {
        self.sites_enabled_dir().file(&format!("{}.conf", app_name))
    }

    /// Setup the layout (create directories)
    pub async fn setup(&self) -> Result<(), QuayError> {
        self.code_dir_root().create().await?;
        self.release_dir_root().create().await?;
        self.certs_dir().create().await?;
        self.logs_dir_root().create().await?;
        self.sites_available_dir().create().await?;
        self.sites_enabled_dir().create().await?;
        Ok(())
    }
}

impl Default for Layout {
    fn default() -> Self {
        // Use /var/lib/quayd on Linux, or the user home directory elsewhere
        #[cfg(target_os = "linux")]
        let home = PathBuf::from("/var/lib/quayd");

        #[cfg(not(target_os = "linux"))]
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".quayd");

        Self::new(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_fixed_joins() {
        let layout = Layout::new("/srv/quay");
        assert_eq!(layout.code_dir("demo").path(), PathBuf::from("/srv/quay/code/demo"));
        assert_eq!(
            layout.release_dir("demo").path(),
            PathBuf::from("/srv/quay/releases/demo")
        );
        assert_eq!(
            layout.app_logs_dir("demo").path(),
            PathBuf::from("/srv/quay/logs/demo")
        );
        assert_eq!(
            layout.site_available("demo").path(),
            PathBuf::from("/srv/quay/nginx/sites-available/demo.conf")
        );
        assert_eq!(
            layout.site_enabled("demo").path(),
            PathBuf::from("/srv/quay/nginx/sites-enabled/demo.conf")
        );
    }

    #[test]
    fn test_domain_certs_nested_under_certs() {
        let layout = Layout::new("/srv/quay");
        assert_eq!(
            layout.domain_certs_dir("example.com").path(),
            PathBuf::from("/srv/quay/certs/example.com")
        );
    }
}
