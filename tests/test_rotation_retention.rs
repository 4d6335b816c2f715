//! Tests for file retention and archival through the engine's rotation pass.

use agentlog::entry::{Category, LogSource};
use agentlog::{TelemetryConfig, TelemetryLogger};
use serde_json::json;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn backdate(path: &Path, secs: u64) {
    let target = SystemTime::now() - Duration::from_secs(secs);
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(target).unwrap();
}

#[tokio::test]
async fn test_rotation_enforces_file_count() {
    let tmp = TempDir::new().unwrap();
    let logger = TelemetryLogger::new(TelemetryConfig {
        log_root: tmp.path().to_path_buf(),
        max_files: 2,
        ..Default::default()
    })
    .unwrap();

    let dir = logger.store().category_dir(Category::Agents);
    for (i, day) in ["2026-08-20", "2026-08-21", "2026-08-22", "2026-08-23"]
        .iter()
        .enumerate()
    {
        let path = dir.join(format!("agents-{day}.jsonl"));
        std::fs::write(&path, "{}\n").unwrap();
        backdate(&path, (10 - i as u64) * 60);
    }

    logger.rotate_now().await;

    let mut remaining: Vec<String> = logger
        .store()
        .log_files(Category::Agents)
        .unwrap()
        .into_iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec!["agents-2026-08-22.jsonl", "agents-2026-08-23.jsonl"]
    );
}

#[tokio::test]
async fn test_oversized_file_archived_and_appends_resume_fresh() {
    let tmp = TempDir::new().unwrap();
    let logger = TelemetryLogger::new(TelemetryConfig {
        log_root: tmp.path().to_path_buf(),
        max_file_size: 64,
        ..Default::default()
    })
    .unwrap();

    // Grow today's file past the limit, then rotate
    for i in 0..10 {
        logger
            .info(
                LogSource::General("sys".to_string()),
                &format!("padding entry number {i}"),
                json!({}),
            )
            .await;
    }
    logger.flush().await;
    let live = logger.store().current_file(Category::General);
    assert!(std::fs::metadata(&live).unwrap().len() > 64);

    logger.rotate_now().await;
    assert!(!live.exists());

    let archived: Vec<String> = logger
        .store()
        .log_files(Category::General)
        .unwrap()
        .into_iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].contains(".archive."));

    // New appends create a fresh current file
    logger
        .info(LogSource::General("sys".to_string()), "fresh", json!({}))
        .await;
    logger.flush().await;
    assert!(live.exists());
    assert_eq!(std::fs::read_to_string(&live).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn test_rotation_failure_is_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let logger = TelemetryLogger::new(TelemetryConfig {
        log_root: tmp.path().to_path_buf(),
        ..Default::default()
    })
    .unwrap();

    // Remove a category directory out from under the engine
    std::fs::remove_dir_all(logger.store().category_dir(Category::Workflows)).unwrap();

    // The pass is abandoned with a warning entry; the process survives
    logger.rotate_now().await;
    assert!(logger.pending().await >= 1);
}

#[tokio::test]
async fn test_archived_files_remain_queryable() {
    let tmp = TempDir::new().unwrap();
    let logger = TelemetryLogger::new(TelemetryConfig {
        log_root: tmp.path().to_path_buf(),
        max_file_size: 1,
        ..Default::default()
    })
    .unwrap();

    logger
        .warn(LogSource::Coordination, "before rotation", json!({}))
        .await;
    logger.flush().await;
    logger.rotate_now().await;

    let results = logger
        .query(&agentlog::QueryCriteria::new().message_contains("before rotation"))
        .await;
    assert_eq!(results.len(), 1);
}
