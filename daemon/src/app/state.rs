//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::errors::QuayError;
use crate::proxy::nginx::NginxController;
use crate::proxy::sudo::SudoStore;
use crate::proxy::supervisor::SupervisorController;
use crate::storage::apps::AppStore;
use crate::storage::layout::Layout;
use crate::storage::records::RecordStore;
use crate::storage::settings::Settings;
use crate::workers::deployer::RunRegistry;

/// Main application state, shared across HTTP handlers and workers
pub struct AppState {
    /// Directory layout
    pub layout: Layout,

    /// Daemon settings
    pub settings: Settings,

    /// Application registry (read-only input)
    pub apps: AppStore,

    /// Deployment record store
    pub records: RecordStore,

    /// Per-application run locks
    pub registry: Arc<RunRegistry>,

    /// Sudo session store
    pub sudo: Arc<SudoStore>,

    /// Reverse-proxy controller
    pub nginx: NginxController,

    /// Process-supervisor controller
    pub supervisor: SupervisorController,
}

impl AppState {
    /// Initialize application state
    pub async fn init(layout: Layout, settings: Settings) -> Result<Self, QuayError> {
        info!("Initializing application state...");

        layout.setup().await?;

        let apps = AppStore::load(layout.apps_file()).await?;
        let records = RecordStore::load(layout.records_file()).await?;
        let sudo = Arc::new(SudoStore::new());
        let nginx = NginxController::new(layout.clone(), sudo.clone());
        let supervisor =
            SupervisorController::new(settings.supervisor.clone(), layout.home.clone());

        info!("Loaded {} registered application(s)", apps.all().len());

        Ok(Self {
            layout,
            settings,
            apps,
            records,
            registry: Arc::new(RunRegistry::new()),
            sudo,
            nginx,
            supervisor,
        })
    }
}
