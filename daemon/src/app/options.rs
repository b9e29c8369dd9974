//! Application configuration options

use std::time::Duration;

use crate::storage::layout::Layout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Directory layout rooted at the configured home
    pub layout: Layout,

    /// Settings loaded from `settings.json`
    pub settings: Settings,

    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,
}

impl AppOptions {
    pub fn new(layout: Layout, settings: Settings) -> Self {
        Self {
            layout,
            settings,
            lifecycle: LifecycleOptions::default(),
        }
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
