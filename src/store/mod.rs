//! Fjall-based persistence and query layer for log records
//!
//! This module provides durable storage for every record the ingestion
//! buffer flushes. It uses Fjall (an embedded LSM key-value store) to keep:
//!
//! - Records, keyed by timestamp so range scans come back in time order
//! - Secondary index entries (session, severity, function, file name,
//!   context, thread, date-hour bucket)
//! - Metadata (last rotation / cleanup timestamps)
//!
//! ## Retention
//!
//! [`RetentionManager`] deletes records older than the configured retention
//! window, either unconditionally (`cleanup_expired`) or only when the
//! keyspace has outgrown its size budget (`rotate_if_needed`).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use logbox::store::LogStore;
//!
//! let store = LogStore::open("data/logbox")?;
//! store.insert_batch(&records)?;
//! let errors = store.count(&FilterCriteria::new().with_severities([Severity::Error]))?;
//! ```

pub mod error;
pub mod export;
pub mod keys;
pub mod query;
pub mod retention;
pub mod store;

pub use error::{Result, StoreError};
pub use retention::{PruneStats, RetentionManager};
pub use store::{LogStore, StoreStats};
