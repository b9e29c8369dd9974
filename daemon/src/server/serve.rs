//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::state::AppState;
use crate::errors::QuayError;
use crate::server::handlers::{
    app_status_handler, deploy_handler, deployment_log_handler, disable_site_handler,
    enable_site_handler, get_deployment_handler, health_handler, list_deployments_handler,
    metrics_handler, proxy_reload_handler, proxy_test_handler, sudo_session_handler,
    supervisor_action_handler, version_handler, webhook_handler,
};
use crate::storage::settings::ServerSettings;

/// Build the daemon router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Telemetry
        .route("/telemetry/metrics", get(metrics_handler))
        // Webhook ingestion
        .route("/api/webhook", post(webhook_handler))
        // Deployments
        .route("/api/apps/{name}/deploy", post(deploy_handler))
        .route("/api/apps/{name}/deployments", get(list_deployments_handler))
        .route("/api/deployments/{id}", get(get_deployment_handler))
        .route("/api/deployments/{id}/log", get(deployment_log_handler))
        // Supervisor
        .route("/api/apps/{name}/status", get(app_status_handler))
        .route(
            "/api/apps/{name}/supervisor/{action}",
            post(supervisor_action_handler),
        )
        // Elevation and proxy lifecycle
        .route("/api/sudo/session", post(sudo_session_handler))
        .route("/api/apps/{name}/site/enable", post(enable_site_handler))
        .route("/api/apps/{name}/site/disable", post(disable_site_handler))
        .route("/api/proxy/reload", post(proxy_reload_handler))
        .route("/api/proxy/test", get(proxy_test_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), QuayError>>, QuayError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| QuayError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| QuayError::ServerError(e.to_string()))
    });

    Ok(handle)
}
