//! Tracing setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global fmt subscriber. `RUST_LOG` overrides the configured filter.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    // A subscriber may already be installed (tests, embedding hosts)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    records_submitted: AtomicU64,
    records_persisted: AtomicU64,
    records_dropped: AtomicU64,
    flushes: AtomicU64,
    flushes_failed: AtomicU64,
    records_pruned: AtomicU64,
    searches_started: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.records_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush_succeeded(&self, count: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_persisted
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::trace!(counter = "records_persisted", count, "Metric incremented");
    }

    pub fn flush_failed(&self, dropped: usize) {
        self.flushes_failed.fetch_add(1, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
        tracing::debug!(counter = "records_dropped", dropped, "Metric incremented");
    }

    /// Record rejected because the buffer already shut down
    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_pruned(&self, count: usize) {
        self.records_pruned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn search_started(&self) {
        self.searches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_submitted: self.records_submitted.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
            records_pruned: self.records_pruned.load(Ordering::Relaxed),
            searches_started: self.searches_started.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub records_submitted: u64,
    pub records_persisted: u64,
    pub records_dropped: u64,
    pub flushes: u64,
    pub flushes_failed: u64,
    pub records_pruned: u64,
    pub searches_started: u64,
}
