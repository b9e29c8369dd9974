//! Settings file management

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Daemon settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Webhook configuration
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Number of finalized deployment logs kept per application
    #[serde(default = "default_keep_logs")]
    pub keep_logs: usize,

    /// Process supervisor configuration
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

fn default_keep_logs() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerSettings::default(),
            webhook: WebhookSettings::default(),
            keep_logs: default_keep_logs(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9100
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Webhook settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Shared secret for HMAC signatures and GitLab tokens
    #[serde(default = "default_secret")]
    pub secret: SecretString,
}

fn default_secret() -> SecretString {
    SecretString::from("")
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: default_secret(),
        }
    }
}

/// Process supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Supervisor CLI binary
    #[serde(default = "default_supervisor_bin")]
    pub bin: String,

    /// Supervisor entry name for the daemon's own process; the `self`
    /// pseudo-name resolves to this
    #[serde(default = "default_self_name")]
    pub self_name: String,
}

fn default_supervisor_bin() -> String {
    "pm2".to_string()
}

fn default_self_name() -> String {
    "quayd".to_string()
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            bin: default_supervisor_bin(),
            self_name: default_self_name(),
        }
    }
}
