//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::app::state::AppState;
use crate::errors::QuayError;
use crate::filesys::file::File;
use crate::proxy::supervisor::SupervisorAction;
use crate::storage::records::DeploymentTrigger;
use crate::telemetry::collect_metrics;
use crate::utils::{generate_uuid, version_info};
use crate::webhook::payload::{branch_matches, parse_payload};
use crate::webhook::verify::{verify_request, SIGNATURE_HEADER, TOKEN_HEADER};
use crate::workers::deployer::spawn_deployment;

/// Sudo session header for elevated proxy operations
pub const SUDO_SESSION_HEADER: &str = "x-sudo-session";

/// Error payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: QuayError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        QuayError::ValidationError(_) => StatusCode::BAD_REQUEST,
        QuayError::AuthError(_) => StatusCode::UNAUTHORIZED,
        QuayError::NotFound(_) => StatusCode::NOT_FOUND,
        QuayError::PermissionError(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

fn sudo_session<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    headers.get(SUDO_SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "quayd".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Metrics handler
pub async fn metrics_handler() -> impl IntoResponse {
    Json(collect_metrics())
}

/// Webhook response; sent before the pipeline runs
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

/// Webhook ingestion handler: verify, resolve, filter, ack, detach
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let secret = &state.settings.webhook.secret;
    if secret.expose_secret().is_empty() {
        return Err(error_response(QuayError::AuthError(
            "webhook secret not configured".to_string(),
        )));
    }

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    verify_request(signature, token, &body, secret).map_err(error_response)?;

    let event = parse_payload(&body).map_err(error_response)?;

    let app = state
        .apps
        .find_by_repo(&event.repo_name)
        .cloned()
        .ok_or_else(|| {
            error_response(QuayError::NotFound(format!(
                "no application registered for repository {}",
                event.repo_name
            )))
        })?;

    // Non-matching branches are acknowledged, never an error
    if !branch_matches(&app.branch, &event.branch) {
        return Ok(Json(WebhookResponse {
            received: true,
            skipped: Some(true),
            repository: Some(event.repo_name),
            branch: Some(event.branch),
            deployment_id: None,
        }));
    }

    let deployment_id =
        spawn_deployment(state.clone(), app, DeploymentTrigger::Webhook, &event.repo_name)
            .await
            .map_err(|e| match e {
                QuayError::ValidationError(msg) => (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse { error: msg }),
                ),
                other => error_response(other),
            })?;

    Ok(Json(WebhookResponse {
        received: true,
        skipped: Some(false),
        repository: Some(event.repo_name),
        branch: Some(event.branch),
        deployment_id: Some(deployment_id),
    }))
}

/// Manual deploy response
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub deployment_id: String,
}

/// Manual deployment trigger
pub async fn deploy_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let app = state
        .apps
        .find_by_name(&name)
        .cloned()
        .ok_or_else(|| error_response(QuayError::NotFound(format!("application {}", name))))?;

    let deployment_id = spawn_deployment(state.clone(), app, DeploymentTrigger::Manual, "api")
        .await
        .map_err(|e| match e {
            QuayError::ValidationError(msg) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { error: msg }))
            }
            other => error_response(other),
        })?;

    Ok((StatusCode::ACCEPTED, Json(DeployResponse { deployment_id })))
}

/// List deployments for an application, newest first
pub async fn list_deployments_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let app = state
        .apps
        .find_by_name(&name)
        .ok_or_else(|| error_response(QuayError::NotFound(format!("application {}", name))))?;

    Ok(Json(state.records.list_for_app(&app.id).await))
}

/// Get one deployment record
pub async fn get_deployment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let record = state
        .records
        .get(&id)
        .await
        .ok_or_else(|| error_response(QuayError::NotFound(format!("deployment {}", id))))?;
    Ok(Json(record))
}

/// Get the live or finalized log content for a deployment
pub async fn deployment_log_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let record = state
        .records
        .get(&id)
        .await
        .ok_or_else(|| error_response(QuayError::NotFound(format!("deployment {}", id))))?;

    let log_file = record
        .log_file
        .ok_or_else(|| error_response(QuayError::NotFound(format!("log for deployment {}", id))))?;

    let content = File::new(&log_file)
        .read_string()
        .await
        .map_err(|_| error_response(QuayError::NotFound(format!("log for deployment {}", id))))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], content))
}

/// Supervisor status for an application (or `self`)
pub async fn app_status_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.supervisor.describe(&name).await)
}

/// Supervisor action response
#[derive(Debug, Serialize)]
pub struct SupervisorResponse {
    pub output: String,
}

/// Run a supervisor lifecycle action
pub async fn supervisor_action_handler(
    State(state): State<Arc<AppState>>,
    Path((name, action)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let action: SupervisorAction = action.parse().map_err(error_response)?;
    let output = state
        .supervisor
        .run_action(&name, action)
        .await
        .map_err(error_response)?;
    Ok(Json(SupervisorResponse { output }))
}

/// Sudo session request
#[derive(Debug, Deserialize)]
pub struct SudoSessionRequest {
    pub password: SecretString,
}

/// Sudo session response
#[derive(Debug, Serialize)]
pub struct SudoSessionResponse {
    pub session_id: String,
}

/// Authenticate and open a sudo session
pub async fn sudo_session_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SudoSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    state
        .sudo
        .authenticate(&request.password)
        .await
        .map_err(error_response)?;

    let session_id = generate_uuid();
    state.sudo.store(&session_id, request.password).await;
    Ok(Json(SudoSessionResponse { session_id }))
}

/// Site binding response
#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub changed: bool,
}

/// Enable the nginx site for an application
pub async fn enable_site_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let changed = state
        .nginx
        .enable_site(&name, sudo_session(&headers))
        .await
        .map_err(error_response)?;
    Ok(Json(SiteResponse { changed }))
}

/// Disable the nginx site for an application
pub async fn disable_site_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let changed = state
        .nginx
        .disable_site(&name, sudo_session(&headers))
        .await
        .map_err(error_response)?;
    Ok(Json(SiteResponse { changed }))
}

/// Proxy reload response
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
}

/// Best-effort proxy reload
pub async fn proxy_reload_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let reloaded = state.nginx.reload(sudo_session(&headers)).await;
    Json(ReloadResponse { reloaded })
}

/// Proxy configuration test
pub async fn proxy_test_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    Json(state.nginx.test_config(sudo_session(&headers)).await)
}
