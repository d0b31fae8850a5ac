//! Size- and age-based retention for the log store

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::RetentionConfig;
use crate::model::{DeleteScope, now_secs};
use crate::observability::Metrics;

use super::error::Result;
use super::store::LogStore;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Metadata keys for pruning state
const META_LAST_ROTATION: &str = "last_rotation";
const META_LAST_CLEANUP: &str = "last_cleanup";

/// Outcome of one retention pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PruneStats {
    /// Storage size observed before pruning
    pub size_before: u64,
    pub records_pruned: usize,
    /// Whether the age cutoff was applied at all
    pub applied: bool,
}

/// Applies the retention policy through the store's bulk delete
#[derive(Clone)]
pub struct RetentionManager {
    store: LogStore,
    max_size_bytes: u64,
    max_retention_days: u32,
    metrics: Arc<Metrics>,
}

impl RetentionManager {
    pub fn new(store: LogStore, config: &RetentionConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            max_size_bytes: config.max_size.as_u64(),
            max_retention_days: config.max_retention_days,
            metrics,
        }
    }

    /// Oldest timestamp that survives the age cutoff at `now`
    pub fn cutoff(&self, now: f64) -> f64 {
        now - self.max_retention_days as f64 * SECONDS_PER_DAY
    }

    /// Apply the age cutoff only when the store has outgrown its size budget
    pub fn rotate_if_needed(&self) -> Result<PruneStats> {
        self.rotate_at(now_secs())
    }

    pub fn rotate_at(&self, now: f64) -> Result<PruneStats> {
        let size_before = self.store.storage_size()?;
        if size_before <= self.max_size_bytes {
            debug!(
                size_before,
                max_size = self.max_size_bytes,
                "Storage within budget, rotation skipped"
            );
            return Ok(PruneStats {
                size_before,
                ..PruneStats::default()
            });
        }

        info!(
            size_before,
            max_size = self.max_size_bytes,
            "Storage over budget, rotating"
        );
        let records_pruned = self.prune_before(self.cutoff(now))?;
        self.store.set_meta(META_LAST_ROTATION, &now.to_string())?;

        Ok(PruneStats {
            size_before,
            records_pruned,
            applied: true,
        })
    }

    /// Apply the age cutoff regardless of storage size
    pub fn cleanup_expired(&self) -> Result<PruneStats> {
        self.cleanup_at(now_secs())
    }

    pub fn cleanup_at(&self, now: f64) -> Result<PruneStats> {
        let size_before = self.store.storage_size()?;
        let records_pruned = self.prune_before(self.cutoff(now))?;
        self.store.set_meta(META_LAST_CLEANUP, &now.to_string())?;

        Ok(PruneStats {
            size_before,
            records_pruned,
            applied: true,
        })
    }

    fn prune_before(&self, cutoff: f64) -> Result<usize> {
        let pruned = self.store.delete(&DeleteScope::Before(cutoff))?;
        self.metrics.records_pruned(pruned);
        info!("Pruned {} records older than {}", pruned, cutoff);
        Ok(pruned)
    }

    /// Seconds-since-epoch of the last rotation that actually pruned, if any
    pub fn last_rotation(&self) -> Result<Option<f64>> {
        Ok(self
            .store
            .get_meta(META_LAST_ROTATION)?
            .and_then(|v| v.parse().ok()))
    }

    pub fn last_cleanup(&self) -> Result<Option<f64>> {
        Ok(self
            .store
            .get_meta(META_LAST_CLEANUP)?
            .and_then(|v| v.parse().ok()))
    }

    /// Run `rotate_if_needed` every `interval` until the handle is aborted
    pub fn spawn_periodic(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // first tick completes immediately; startup already rotated
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let manager = self.clone();
                match tokio::task::spawn_blocking(move || manager.rotate_if_needed()).await {
                    Ok(Ok(stats)) => debug!(?stats, "Periodic rotation finished"),
                    Ok(Err(e)) => error!(error = %e, "Periodic rotation failed"),
                    Err(e) => error!(error = %e, "Periodic rotation task panicked"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;
    use crate::model::{FilterCriteria, LogRecord};
    use tempfile::TempDir;

    const NOW: f64 = 1_714_559_400.0;

    fn setup(max_size: u64) -> (LogStore, RetentionManager, Arc<Metrics>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::open(temp_dir.path().join("retention")).unwrap();
        let config = RetentionConfig {
            max_size: ByteSize(max_size),
            max_retention_days: 30,
            check_interval_secs: 3600,
        };
        let metrics = Arc::new(Metrics::new());
        let manager = RetentionManager::new(store.clone(), &config, metrics.clone());
        (store, manager, metrics, temp_dir)
    }

    fn aged(id: &str, days_old: f64) -> LogRecord {
        LogRecord::builder()
            .id(id)
            .timestamp(NOW - days_old * SECONDS_PER_DAY)
            .message("aged")
            .session_id("s")
            .session_start_time(0.0)
            .build()
    }

    #[test]
    fn test_cutoff() {
        let (_store, manager, _metrics, _temp) = setup(1024);
        assert_eq!(manager.cutoff(NOW), NOW - 30.0 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let (store, manager, metrics, _temp) = setup(100 * 1024 * 1024);
        store
            .insert_batch(&[aged("old", 45.0), aged("edge", 29.0), aged("new", 1.0)])
            .unwrap();

        let stats = manager.cleanup_at(NOW).unwrap();
        assert_eq!(stats.records_pruned, 1);
        assert_eq!(store.count(&FilterCriteria::new()).unwrap(), 2);
        assert_eq!(metrics.snapshot().records_pruned, 1);
        assert_eq!(manager.last_cleanup().unwrap(), Some(NOW));

        // idempotent
        let again = manager.cleanup_at(NOW).unwrap();
        assert_eq!(again.records_pruned, 0);
    }

    #[test]
    fn test_rotation_skipped_within_budget() {
        let (store, manager, _metrics, _temp) = setup(u64::MAX);
        store.insert_batch(&[aged("old", 45.0)]).unwrap();

        let stats = manager.rotate_at(NOW).unwrap();
        assert!(!stats.applied);
        assert_eq!(stats.records_pruned, 0);
        assert_eq!(store.count(&FilterCriteria::new()).unwrap(), 1);
        assert_eq!(manager.last_rotation().unwrap(), None);
    }

    #[test]
    fn test_rotation_prunes_when_over_budget() {
        let (store, manager, _metrics, _temp) = setup(0);
        store
            .insert_batch(&[aged("old", 45.0), aged("new", 1.0)])
            .unwrap();
        store.persist().unwrap();

        let stats = manager.rotate_at(NOW).unwrap();
        assert!(stats.size_before > 0);
        assert!(stats.applied);
        assert_eq!(stats.records_pruned, 1);
        assert_eq!(store.count(&FilterCriteria::new()).unwrap(), 1);
        assert_eq!(manager.last_rotation().unwrap(), Some(NOW));
    }
}
