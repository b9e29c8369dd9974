//! Provider payload resolution
//!
//! GitHub and GitLab push payloads differ in field names; both resolve into
//! one tagged [`PushEvent`]. The branch comes from the `ref` with the
//! `refs/heads/` prefix stripped.

use serde::Serialize;
use serde_json::Value;

use crate::errors::QuayError;

/// Webhook provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
}

/// A resolved push event
#[derive(Debug, Clone, Serialize)]
pub struct PushEvent {
    pub provider: Provider,
    pub repo_name: String,
    pub branch: String,
}

/// Resolve a raw JSON payload into a push event
pub fn parse_payload(body: &[u8]) -> Result<PushEvent, QuayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| QuayError::ValidationError(format!("invalid webhook payload: {}", e)))?;

    let git_ref = value
        .get("ref")
        .and_then(Value::as_str)
        .ok_or_else(|| QuayError::ValidationError("webhook payload missing ref".to_string()))?;
    let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref).to_string();

    // GitLab payloads carry a "project" object; GitHub a "repository" object
    if let Some(name) = value
        .get("project")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    {
        return Ok(PushEvent {
            provider: Provider::GitLab,
            repo_name: name.to_string(),
            branch,
        });
    }

    if let Some(name) = value
        .get("repository")
        .and_then(|r| r.get("name"))
        .and_then(Value::as_str)
    {
        return Ok(PushEvent {
            provider: Provider::GitHub,
            repo_name: name.to_string(),
            branch,
        });
    }

    Err(QuayError::ValidationError(
        "webhook payload missing repository name".to_string(),
    ))
}

/// Branch filter: `*` passes every branch, anything else is an exact match
pub fn branch_matches(configured: &str, incoming: &str) -> bool {
    configured == "*" || configured == incoming
}
