//! Store, retention and export working together on one keyspace

use std::sync::Arc;

use logbox::config::{ByteSize, RetentionConfig};
use logbox::model::{DeleteScope, FilterCriteria, LogRecord, Severity, SortOrder};
use logbox::observability::Metrics;
use logbox::store::{LogStore, RetentionManager, StoreError, export};
use tempfile::TempDir;

const DAY: f64 = 86_400.0;
const NOW: f64 = 1_717_200_000.0;

fn record(session: &str, ts: f64, severity: Severity, message: &str) -> LogRecord {
    LogRecord::builder()
        .message(message)
        .severity(severity)
        .session_id(session)
        .session_start_time(ts.floor())
        .timestamp(ts)
        .source_file("app/src/worker.rs")
        .line(7)
        .function("poll")
        .build()
}

#[test]
fn test_three_errors_among_ten() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path().join("store")).unwrap();

    let records: Vec<_> = (0..10)
        .map(|i| {
            let severity = if i % 3 == 0 && i > 0 {
                Severity::Error
            } else {
                Severity::Info
            };
            record("s1", NOW + i as f64, severity, &format!("event {}", i))
        })
        .collect();
    assert_eq!(store.insert_batch(&records).unwrap(), 10);

    let errors = FilterCriteria::new().with_severities([Severity::Error]);
    let found = store.query(&errors, SortOrder::TimestampDesc, 100, 0).unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(store.count(&errors).unwrap(), 3);
    assert!(found.iter().all(|r| r.severity == Severity::Error));
}

#[test]
fn test_records_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");
    {
        let store = LogStore::open(&path).unwrap();
        store
            .insert_batch(&[record("s1", NOW, Severity::Warning, "kept")])
            .unwrap();
        store.persist().unwrap();
    }

    let store = LogStore::open(&path).unwrap();
    let all = store
        .query(&FilterCriteria::default(), SortOrder::TimestampDesc, 10, 0)
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].message, "kept");
    assert_eq!(all[0].source_file_name, "worker.rs");
}

#[test]
fn test_cleanup_then_export_remaining() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path().join("store")).unwrap();
    store
        .insert_batch(&[
            record("old", NOW - 45.0 * DAY, Severity::Info, "stale"),
            record("old", NOW - 31.0 * DAY, Severity::Error, "also stale"),
            record("new", NOW - 2.0 * DAY, Severity::Info, "fresh"),
            record("new", NOW - DAY, Severity::Error, "fresher"),
        ])
        .unwrap();

    let metrics = Arc::new(Metrics::new());
    let config = RetentionConfig {
        max_size: ByteSize::mib(100),
        max_retention_days: 30,
        check_interval_secs: 3600,
    };
    let retention = RetentionManager::new(store.clone(), &config, metrics.clone());

    let stats = retention.cleanup_at(NOW).unwrap();
    assert_eq!(stats.records_pruned, 2);
    assert_eq!(metrics.snapshot().records_pruned, 2);
    assert_eq!(retention.last_cleanup().unwrap(), Some(NOW));

    // second pass has nothing left to remove
    assert_eq!(retention.cleanup_at(NOW).unwrap().records_pruned, 0);

    let mut out = Vec::new();
    let written = export::export_lines(&store, &FilterCriteria::default(), 1, &mut out).unwrap();
    assert_eq!(written, 2);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(" - fresher"));
    assert!(lines[0].contains("ERROR"));
    assert!(lines[0].contains("worker.rs:7 poll"));
    assert!(lines[1].ends_with(" - fresh"));

    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "new");
}

#[test]
fn test_delete_on_locked_store_is_retryable() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path().join("store")).unwrap();
    store
        .insert_batch(&[record("s1", NOW, Severity::Info, "x")])
        .unwrap();

    store.suspend();
    let err = store.delete(&DeleteScope::Session("s1".into())).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, StoreError::Unavailable(_)));

    store.resume();
    assert_eq!(store.delete(&DeleteScope::Session("s1".into())).unwrap(), 1);
}
