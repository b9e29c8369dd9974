//! Pipeline executor tests
//!
//! These run real shell commands (echo, touch, false) against a temporary
//! directory layout. The code directory is pre-created so no clone happens.

use std::path::Path;
use std::sync::Arc;

use quayd::deploy::context::DeploymentContext;
use quayd::deploy::log_file::DeployLog;
use quayd::deploy::pipeline::Pipeline;
use quayd::filesys::dir::Dir;
use quayd::storage::apps::{AppRecord, EnvFile, FileTransfer, TransferOp};
use quayd::storage::layout::Layout;
use tempfile::tempdir;

fn test_app(name: &str) -> AppRecord {
    AppRecord {
        id: "test-app-1".into(),
        name: name.into(),
        repo_url: "https://github.com/acme/demo.git".into(),
        branch: "main".into(),
        port: 3000,
        domain: "example.com".into(),
        subdomain: "app".into(),
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

async fn setup(home: &Path, app: &AppRecord) -> DeploymentContext {
    let layout = Layout::new(home);
    let ctx = DeploymentContext::from_app(app, &layout);
    // Existing code directory skips the clone
    Dir::new(&ctx.code_dir).create().await.unwrap();
    Dir::new(&ctx.release_dir).create().await.unwrap();
    ctx
}

async fn run_pipeline(ctx: DeploymentContext) -> quayd::deploy::pipeline::PipelineOutcome {
    let log = Arc::new(DeployLog::open(&Dir::new(&ctx.logs_dir)).await.unwrap());
    Pipeline::new(ctx, log).run().await.unwrap()
}

#[tokio::test]
async fn test_successful_run_executes_all_phases() {
    let dir = tempdir().unwrap();
    let mut app = test_app("demo");
    app.prebuild = vec!["echo preparing $app$".into()];
    app.build = vec!["touch built.txt".into()];
    app.deployment = vec!["touch deployed.txt".into()];
    app.launch = vec!["touch launched.txt".into()];
    let ctx = setup(dir.path(), &app).await;

    let outcome = run_pipeline(ctx.clone()).await;

    assert!(outcome.success);
    assert!(outcome.error.is_none());

    // Build and deployment run in the code dir, launch in the release dir
    assert!(ctx.code_dir.join("built.txt").exists());
    assert!(ctx.code_dir.join("deployed.txt").exists());
    assert!(ctx.release_dir.join("launched.txt").exists());
    assert!(!ctx.code_dir.join("launched.txt").exists());

    // Interpolation applied to commands; transcript records every phase
    assert!(outcome.output.contains("preparing demo"));
    assert!(outcome.output.contains("Phase: prebuild"));
    assert!(outcome.output.contains("Phase: launch"));
    assert!(outcome.output.contains("Deployment completed successfully"));

    // Log finalized either way
    assert!(outcome.log_file.exists());
    assert!(!ctx.logs_dir.join("current.log").exists());
}

#[tokio::test]
async fn test_failing_phase_aborts_later_phases() {
    let dir = tempdir().unwrap();
    let mut app = test_app("demo");
    app.build = vec!["false".into()];
    app.deployment = vec!["touch should-not-exist.txt".into()];
    let ctx = setup(dir.path(), &app).await;

    let outcome = run_pipeline(ctx.clone()).await;

    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert!(!ctx.code_dir.join("should-not-exist.txt").exists());

    // The failure is part of the finalized transcript
    assert!(outcome.output.contains("ERROR:"));
    assert!(outcome.log_file.exists());
    let contents = std::fs::read_to_string(&outcome.log_file).unwrap();
    assert_eq!(contents, outcome.output);
}

#[tokio::test]
async fn test_failed_transfer_is_warning_not_abort() {
    let dir = tempdir().unwrap();
    let mut app = test_app("demo");
    app.transfers = vec![
        FileTransfer {
            src: "$cf$/missing-file.txt".into(),
            dest: "$rf$/".into(),
            op: TransferOp::Mv,
        },
        FileTransfer {
            src: "$cf$/real.txt".into(),
            dest: "$rf$/real.txt".into(),
            op: TransferOp::Cp,
        },
    ];
    app.deployment = vec!["touch after-transfers.txt".into()];
    let ctx = setup(dir.path(), &app).await;
    tokio::fs::write(ctx.code_dir.join("real.txt"), "data").await.unwrap();

    let outcome = run_pipeline(ctx.clone()).await;

    // The failed mv is logged and skipped; later transfers and phases run
    assert!(outcome.success);
    assert!(outcome.output.contains("WARN: file transfer failed"));
    assert!(ctx.release_dir.join("real.txt").exists());
    assert!(ctx.code_dir.join("after-transfers.txt").exists());
}

#[tokio::test]
async fn test_env_file_written_with_interpolation() {
    let dir = tempdir().unwrap();
    let mut app = test_app("demo");
    app.env_file = Some(EnvFile {
        content: "PORT=$port$\nHOST=$subdomain$.$domain$\n".into(),
        path: ".env".into(),
    });
    let ctx = setup(dir.path(), &app).await;

    let outcome = run_pipeline(ctx.clone()).await;

    assert!(outcome.success);
    let env = std::fs::read_to_string(ctx.code_dir.join(".env")).unwrap();
    assert!(env.contains("PORT=3000"));
    assert!(env.contains("HOST=app.example.com"));
}

#[tokio::test]
async fn test_empty_phases_are_skipped() {
    let dir = tempdir().unwrap();
    let app = test_app("demo");
    let ctx = setup(dir.path(), &app).await;

    let outcome = run_pipeline(ctx).await;

    assert!(outcome.success);
    assert!(!outcome.output.contains("Phase:"));
}

#[tokio::test]
async fn test_minimized_command_environment() {
    let dir = tempdir().unwrap();
    let mut app = test_app("demo");
    // HOME and PATH pass through, everything else is stripped
    app.build = vec!["env > captured-env.txt".into()];
    let ctx = setup(dir.path(), &app).await;

    let outcome = run_pipeline(ctx.clone()).await;

    assert!(outcome.success);
    let env = std::fs::read_to_string(ctx.code_dir.join("captured-env.txt")).unwrap();
    assert!(env.contains("PATH="));
    // Cargo sets this in the test process; the child must not inherit it
    assert!(!env.contains("CARGO_MANIFEST_DIR="));
}
