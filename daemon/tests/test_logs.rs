//! Deployment log lifecycle tests

use std::time::Duration;

use quayd::deploy::log_file::{cleanup_finalized, DeployLog, LIVE_LOG_NAME};
use quayd::filesys::dir::Dir;
use tempfile::tempdir;

#[tokio::test]
async fn test_live_log_written_and_finalized() {
    let dir = tempdir().unwrap();
    let logs_dir = Dir::new(dir.path().join("logs"));

    let log = DeployLog::open(&logs_dir).await.unwrap();
    assert!(log.live_path().ends_with(LIVE_LOG_NAME));

    log.write_line("Starting deployment").await.unwrap();
    log.write_command("echo hello").await.unwrap();
    log.append("hello\n").await.unwrap();

    let live = std::fs::read_to_string(log.live_path()).unwrap();
    assert!(live.contains("Starting deployment"));
    assert!(live.contains("> echo hello"));

    let (final_path, transcript) = log.finalize().await.unwrap();

    // Live file renamed, not copied
    assert!(!log.live_path().exists());
    assert!(final_path.exists());
    let name = final_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("deploy-"));
    assert!(name.ends_with(".log"));

    // Transcript matches the file contents
    let contents = std::fs::read_to_string(&final_path).unwrap();
    assert_eq!(contents, transcript);
    assert!(transcript.contains("hello\n"));
}

#[tokio::test]
async fn test_finalized_log_rejects_further_writes() {
    let dir = tempdir().unwrap();
    let logs_dir = Dir::new(dir.path().join("logs"));

    let log = DeployLog::open(&logs_dir).await.unwrap();
    log.write_line("one line").await.unwrap();
    log.finalize().await.unwrap();

    assert!(log.append("late").await.is_err());
    assert!(log.write_line("late").await.is_err());
    assert!(log.finalize().await.is_err());
}

#[tokio::test]
async fn test_structural_lines_are_timestamped() {
    let dir = tempdir().unwrap();
    let logs_dir = Dir::new(dir.path().join("logs"));

    let log = DeployLog::open(&logs_dir).await.unwrap();
    log.write_line("marker").await.unwrap();
    let (_, transcript) = log.finalize().await.unwrap();

    // [ISO-8601] prefix on structural lines
    let line = transcript.lines().find(|l| l.contains("marker")).unwrap();
    assert!(line.starts_with('['));
    assert!(line.contains("] marker"));
}

#[tokio::test]
async fn test_cleanup_keeps_newest_and_live_log() {
    let dir = tempdir().unwrap();
    let logs_dir = Dir::new(dir.path().join("logs"));
    logs_dir.create().await.unwrap();

    // Five finalized logs, oldest first; ext4 mtimes are fine-grained but
    // leave a little room anyway
    for i in 0..5 {
        let name = format!("deploy-2026010{}-000000.000.log", i);
        tokio::fs::write(logs_dir.path().join(&name), format!("run {}", i))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::fs::write(logs_dir.path().join(LIVE_LOG_NAME), "live")
        .await
        .unwrap();

    let deleted = cleanup_finalized(&logs_dir, 3).await.unwrap();

    // The two oldest go, the live log is never a candidate
    assert_eq!(deleted.len(), 2);
    for path in &deleted {
        assert!(!path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name == "deploy-20260100-000000.000.log" || name == "deploy-20260101-000000.000.log");
    }
    assert!(logs_dir.path().join(LIVE_LOG_NAME).exists());

    let survivors = logs_dir.list_files_with_mtime().await.unwrap();
    assert_eq!(survivors.len(), 4); // 3 finalized + current.log
}

#[tokio::test]
async fn test_cleanup_under_limit_is_noop() {
    let dir = tempdir().unwrap();
    let logs_dir = Dir::new(dir.path().join("logs"));
    logs_dir.create().await.unwrap();

    tokio::fs::write(logs_dir.path().join("deploy-20260101-000000.000.log"), "run")
        .await
        .unwrap();

    let deleted = cleanup_finalized(&logs_dir, 3).await.unwrap();
    assert!(deleted.is_empty());
}

#[tokio::test]
async fn test_cleanup_missing_dir_is_noop() {
    let dir = tempdir().unwrap();
    let logs_dir = Dir::new(dir.path().join("never-created"));

    let deleted = cleanup_finalized(&logs_dir, 3).await.unwrap();
    assert!(deleted.is_empty());
}
