use crate::humanize::ByteSize;
use crate::model::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Persisted store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/logbox")
}

/// Ingestion buffer triggers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Pending records that force a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Quiet period after the last submit before a flush
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Severities that flush the pending batch right away
    #[serde(default = "default_immediate_severities")]
    pub immediate_severities: BTreeSet<Severity>,
}

impl BufferConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            debounce_ms: default_debounce_ms(),
            immediate_severities: default_immediate_severities(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_immediate_severities() -> BTreeSet<Severity> {
    [Severity::Warning, Severity::Error].into_iter().collect()
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_size")]
    pub max_size: ByteSize,
    #[serde(default = "default_max_retention_days")]
    pub max_retention_days: u32,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_retention_days: default_max_retention_days(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

fn default_max_size() -> ByteSize {
    ByteSize(100 * 1024 * 1024) // 100 MB
}

fn default_max_retention_days() -> u32 {
    30
}

fn default_check_interval_secs() -> u64 {
    3600
}

/// Deep search tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Most recent sessions searched in the preview phase
    #[serde(default = "default_preview_session_count")]
    pub preview_session_count: usize,
    /// Estimated events per full-search batch
    #[serde(default = "default_target_batch_size")]
    pub target_batch_size: u64,
    /// Match count above which a search stops with `TooManyResults`
    #[serde(default = "default_results_limit")]
    pub results_limit: usize,
    /// Distinct messages kept in the message category
    #[serde(default = "default_top_messages")]
    pub top_messages: usize,
    #[serde(default = "default_typing_debounce_ms")]
    pub typing_debounce_ms: u64,
}

impl SearchConfig {
    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            preview_session_count: default_preview_session_count(),
            target_batch_size: default_target_batch_size(),
            results_limit: default_results_limit(),
            top_messages: default_top_messages(),
            typing_debounce_ms: default_typing_debounce_ms(),
        }
    }
}

fn default_preview_session_count() -> usize {
    3
}

fn default_target_batch_size() -> u64 {
    2000
}

fn default_results_limit() -> usize {
    5000
}

fn default_top_messages() -> usize {
    10
}

fn default_typing_debounce_ms() -> u64 {
    300
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
