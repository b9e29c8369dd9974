//! End-to-end deployment worker tests
//!
//! Dispatches real runs through the worker against a temporary home
//! directory and follows the deployment record to its terminal state. The
//! code directory is pre-created so no clone happens.

use std::sync::Arc;
use std::time::Duration;

use quayd::app::state::AppState;
use quayd::storage::apps::AppRecord;
use quayd::storage::layout::Layout;
use quayd::storage::records::{DeploymentRecord, DeploymentStatus, DeploymentTrigger};
use quayd::storage::settings::Settings;
use quayd::workers::deployer::spawn_deployment;
use tempfile::{tempdir, TempDir};

fn test_app() -> AppRecord {
    AppRecord {
        id: "app-1".into(),
        name: "demo".into(),
        repo_url: "https://github.com/acme/demo.git".into(),
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

async fn test_state(dir: &TempDir, app: &AppRecord) -> Arc<AppState> {
    test_state_with(dir, app, Settings::default()).await
}

async fn test_state_with(dir: &TempDir, app: &AppRecord, settings: Settings) -> Arc<AppState> {
    let layout = Layout::new(dir.path());
    layout
        .apps_file()
        .write_json(&vec![app.clone()])
        .await
        .unwrap();

    let state = Arc::new(AppState::init(layout.clone(), settings).await.unwrap());
    layout.code_dir(&app.name).create().await.unwrap();
    state
}

async fn wait_terminal(state: &Arc<AppState>, id: &str) -> DeploymentRecord {
    for _ in 0..200 {
        if let Some(rec) = state.records.get(id).await {
            if rec.status.is_terminal() {
                return rec;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("deployment {} did not reach a terminal state", id);
}

#[tokio::test]
async fn test_successful_run_reaches_success() {
    let dir = tempdir().unwrap();
    let mut app = test_app();
    app.prebuild = vec!["echo a".into()];
    app.build = vec!["echo b".into()];
    app.deployment = vec!["echo c".into()];
    app.launch = vec!["echo d".into()];
    let state = test_state(&dir, &app).await;

    let id = spawn_deployment(state.clone(), app, DeploymentTrigger::Manual, "tester")
        .await
        .unwrap();

    let rec = wait_terminal(&state, &id).await;
    assert_eq!(rec.status, DeploymentStatus::Success);
    assert_eq!(rec.exit_code, Some(0));
    assert!(rec.completed_at.is_some());
    assert!(rec.error_message.is_none());

    // Finalized log with all four command lines, in order
    let log = std::fs::read_to_string(rec.log_file.unwrap()).unwrap();
    let commands: Vec<&str> = log.lines().filter(|l| l.contains("] > ")).collect();
    assert_eq!(commands.len(), 4);
    assert!(commands[0].ends_with("> echo a"));
    assert!(commands[1].ends_with("> echo b"));
    assert!(commands[2].ends_with("> echo c"));
    assert!(commands[3].ends_with("> echo d"));
}

#[tokio::test]
async fn test_failing_build_reaches_failed() {
    let dir = tempdir().unwrap();
    let mut app = test_app();
    app.build = vec!["false".into()];
    app.deployment = vec!["touch never.txt".into()];
    let state = test_state(&dir, &app).await;

    let id = spawn_deployment(state.clone(), app, DeploymentTrigger::Webhook, "push")
        .await
        .unwrap();

    let rec = wait_terminal(&state, &id).await;
    assert_eq!(rec.status, DeploymentStatus::Failed);
    assert_eq!(rec.exit_code, Some(1));
    assert!(rec.error_message.unwrap().contains("false"));

    // Later phases never ran; the log survives the failure
    assert!(!state.layout.code_dir("demo").path().join("never.txt").exists());
    let log = std::fs::read_to_string(rec.log_file.unwrap()).unwrap();
    assert!(log.contains("ERROR:"));
}

#[tokio::test]
async fn test_concurrent_trigger_rejected() {
    let dir = tempdir().unwrap();
    let mut app = test_app();
    app.build = vec!["sleep 2".into()];
    let state = test_state(&dir, &app).await;

    let first = spawn_deployment(state.clone(), app.clone(), DeploymentTrigger::Manual, "one")
        .await
        .unwrap();

    // Second trigger for the same application while the first is in flight
    let second = spawn_deployment(state.clone(), app, DeploymentTrigger::Manual, "two").await;
    assert!(second.is_err());
    assert!(second.unwrap_err().to_string().contains("already in progress"));

    let rec = wait_terminal(&state, &first).await;
    assert_eq!(rec.status, DeploymentStatus::Success);
}

#[tokio::test]
async fn test_retention_prunes_records_of_deleted_logs() {
    let dir = tempdir().unwrap();
    let app = test_app();
    let mut settings = Settings::default();
    settings.keep_logs = 2;
    let state = test_state_with(&dir, &app, settings).await;

    // Four finished runs leave four finalized logs, two past the keep limit
    let mut ids = Vec::new();
    for n in 0..4 {
        let id = spawn_deployment(
            state.clone(),
            app.clone(),
            DeploymentTrigger::Manual,
            &format!("run-{}", n),
        )
        .await
        .unwrap();
        wait_terminal(&state, &id).await;
        ids.push(id);
    }

    // The next trigger runs retention before opening its own live log
    let fifth = spawn_deployment(state.clone(), app.clone(), DeploymentTrigger::Manual, "run-4")
        .await
        .unwrap();
    wait_terminal(&state, &fifth).await;

    // The two oldest logs are gone and their records pruned with them
    assert!(state.records.get(&ids[0]).await.is_none());
    assert!(state.records.get(&ids[1]).await.is_none());
    assert!(state.records.get(&ids[2]).await.is_some());
    assert!(state.records.get(&ids[3]).await.is_some());

    let listed = state.records.list_for_app(&app.id).await;
    assert_eq!(listed.len(), 3);
    for rec in &listed {
        assert!(rec.log_file.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn test_records_persisted_and_listed_newest_first() {
    let dir = tempdir().unwrap();
    let app = test_app();
    let state = test_state(&dir, &app).await;

    let first = spawn_deployment(state.clone(), app.clone(), DeploymentTrigger::Manual, "one")
        .await
        .unwrap();
    wait_terminal(&state, &first).await;

    let second = spawn_deployment(state.clone(), app.clone(), DeploymentTrigger::Manual, "two")
        .await
        .unwrap();
    wait_terminal(&state, &second).await;

    let listed = state.records.list_for_app(&app.id).await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second);

    // The records file is readable by a fresh store
    let reloaded = quayd::storage::records::RecordStore::load(state.layout.records_file())
        .await
        .unwrap();
    assert!(reloaded.get(&first).await.is_some());
}
