//! Integration tests for the shared frequency guard state file.

use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;
use third_api_core::third_api::{FrequencyGuard, GUARD_WINDOW, GuardError, MAX_GUARD_ENTRIES};

fn guard_in(dir: &TempDir) -> FrequencyGuard {
    FrequencyGuard::new(dir.path().join("frequency_guard.json"))
}

#[test]
fn test_concurrent_callers_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    let guard = guard_in(&dir);
    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let guard = guard.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                guard.check_at("ns-api-https://a.example/1", 50_000)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1, "results: {results:?}");
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, GuardError::TooFrequent { .. }))
    );
}

#[tokio::test]
async fn test_concurrent_async_callers_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    let guard = guard_in(&dir);

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let guard = guard.clone();
            tokio::spawn(async move { guard.check_async("ns-api-b".to_string()).await })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}

#[test]
fn test_separate_instances_share_state() {
    let dir = TempDir::new().unwrap();
    guard_in(&dir).check_at("k", 1_000).unwrap();

    let err = guard_in(&dir).check_at("k", 1_001).unwrap_err();
    assert_eq!(
        err,
        GuardError::TooFrequent {
            key: "k".to_string(),
            retry_in_secs: GUARD_WINDOW.as_secs() - 1,
        }
    );
}

#[test]
fn test_cooldown_expires_after_window() {
    let dir = TempDir::new().unwrap();
    let guard = guard_in(&dir);
    let window = GUARD_WINDOW.as_secs();

    guard.check_at("k", 10_000).unwrap();
    assert!(guard.check_at("k", 10_000 + window - 1).is_err());
    guard.check_at("k", 10_000 + window).unwrap();
    assert_eq!(guard.records()["k"], 10_000 + window);
}

#[test]
fn test_state_written_by_another_tool_is_honored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frequency_guard.json");
    std::fs::write(&path, r#"{"third_api-default-https://x.example/v": 5000}"#).unwrap();

    let guard = FrequencyGuard::new(&path);
    assert!(
        guard
            .check_at("third_api-default-https://x.example/v", 5_100)
            .is_err()
    );
    guard.check_at("third_api-default-https://y.example/v", 5_100).unwrap();
    assert_eq!(guard.records().len(), 2);
}

#[test]
fn test_full_state_resets_before_recording() {
    let dir = TempDir::new().unwrap();
    let guard = guard_in(&dir);
    for i in 0..MAX_GUARD_ENTRIES {
        guard.check_at(&format!("key-{i}"), 1_000).unwrap();
    }
    assert_eq!(guard.records().len(), MAX_GUARD_ENTRIES);

    guard.check_at("one-more", 1_000).unwrap();
    let records = guard.records();
    assert_eq!(records.len(), 1);
    assert!(records.contains_key("one-more"));
}

#[test]
fn test_corrupt_state_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frequency_guard.json");
    std::fs::write(&path, "{not json").unwrap();

    let guard = FrequencyGuard::new(&path);
    guard.check_at("k", 1_000).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["k"], 1_000);
}
