//! Reverse-proxy site bindings
//!
//! One config file per application: written to the "available" directory and
//! copied into the "enabled" directory to go live. Existence of the enabled
//! copy is the authoritative signal that the route is served. Enable/disable/
//! reload are serialized per application name. A permission failure gets
//! exactly one elevation retry through the sudo session store.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::deploy::command::run_sync;
use crate::errors::QuayError;
use crate::proxy::sudo::SudoStore;
use crate::storage::layout::Layout;

/// Result of an nginx config test
#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfigCheck {
    pub valid: bool,
    pub output: String,
}

/// Controller for nginx site files and reloads
pub struct NginxController {
    layout: Layout,
    sudo: Arc<SudoStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NginxController {
    pub fn new(layout: Layout, sudo: Arc<SudoStore>) -> Self {
        Self {
            layout,
            sudo,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Write rendered site config to the "available" directory
    pub async fn write_site(&self, name: &str, rendered: &str) -> Result<(), QuayError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        self.layout.site_available(name).write_string(rendered).await?;
        info!("Wrote site config for {}", name);
        Ok(())
    }

    /// Copy available -> enabled. Returns `true` when the binding changed,
    /// `false` when the site was already enabled.
    pub async fn enable_site(
        &self,
        name: &str,
        session_id: Option<&str>,
    ) -> Result<bool, QuayError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let available = self.layout.site_available(name);
        let enabled = self.layout.site_enabled(name);

        if !available.exists().await {
            return Err(QuayError::NotFound(format!("site config for {}", name)));
        }
        if enabled.exists().await {
            return Ok(false);
        }

        match tokio::fs::copy(available.path(), enabled.path()).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                self.elevated(
                    &format!(
                        "cp '{}' '{}'",
                        available.path().display(),
                        enabled.path().display()
                    ),
                    session_id,
                    "enable site",
                )
                .await?;
            }
            Err(e) => return Err(e.into()),
        }

        info!("Enabled site {}", name);
        Ok(true)
    }

    /// Remove the enabled copy. Returns `true` when the binding changed.
    pub async fn disable_site(
        &self,
        name: &str,
        session_id: Option<&str>,
    ) -> Result<bool, QuayError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let enabled = self.layout.site_enabled(name);
        if !enabled.exists().await {
            return Ok(false);
        }

        match tokio::fs::remove_file(enabled.path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                self.elevated(
                    &format!("rm -f '{}'", enabled.path().display()),
                    session_id,
                    "disable site",
                )
                .await?;
            }
            Err(e) => return Err(e.into()),
        }

        info!("Disabled site {}", name);
        Ok(true)
    }

    /// Best-effort reload: unprivileged first, then elevated if a session is
    /// available. Failure is a warning, never a hard abort; returns whether
    /// the reload succeeded.
    pub async fn reload(&self, session_id: Option<&str>) -> bool {
        match run_sync("nginx -s reload", &self.layout.home).await {
            Ok(_) => return true,
            Err(e) => {
                if let Some(id) = session_id {
                    if self.sudo.execute_elevated("nginx -s reload", None, id).await.is_ok() {
                        return true;
                    }
                }
                warn!("nginx reload failed: {}", e);
                false
            }
        }
    }

    /// Test the proxy configuration; returns a structured result rather than
    /// an error
    pub async fn test_config(&self, session_id: Option<&str>) -> ProxyConfigCheck {
        match run_sync("nginx -t", &self.layout.home).await {
            Ok(output) => ProxyConfigCheck { valid: true, output },
            Err(first) => {
                if first.is_permission_denied() {
                    if let Some(id) = session_id {
                        match self.sudo.execute_elevated("nginx -t", None, id).await {
                            Ok(output) => return ProxyConfigCheck { valid: true, output },
                            Err(e) => {
                                return ProxyConfigCheck {
                                    valid: false,
                                    output: e.to_string(),
                                }
                            }
                        }
                    }
                }
                ProxyConfigCheck {
                    valid: false,
                    output: first.to_string(),
                }
            }
        }
    }

    /// One elevation retry; a missing session surfaces as a clear permission
    /// error, not an interactive prompt
    async fn elevated(
        &self,
        command: &str,
        session_id: Option<&str>,
        what: &str,
    ) -> Result<(), QuayError> {
        let Some(id) = session_id else {
            return Err(QuayError::PermissionError(format!(
                "{} requires elevation and no sudo session was provided",
                what
            )));
        };
        self.sudo.execute_elevated(command, None, id).await?;
        Ok(())
    }
}
