use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::model::{FilterCriteria, LogRecord, SessionInfo, SortOrder};
use crate::store::{LogStore, Result, StoreError};

/// Read side of the store as seen by the search engine
#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>>;

    async fn count(&self, criteria: &FilterCriteria) -> Result<u64>;

    /// Newest-first matches, at most `limit`
    async fn query(&self, criteria: &FilterCriteria, limit: usize) -> Result<Vec<LogRecord>>;
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
}

#[async_trait]
impl SearchSource for LogStore {
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let store = self.clone();
        blocking(move || store.list_sessions()).await
    }

    async fn count(&self, criteria: &FilterCriteria) -> Result<u64> {
        let store = self.clone();
        let criteria = criteria.clone();
        blocking(move || store.count(&criteria)).await
    }

    async fn query(&self, criteria: &FilterCriteria, limit: usize) -> Result<Vec<LogRecord>> {
        let store = self.clone();
        let criteria = criteria.clone();
        blocking(move || store.query(&criteria, SortOrder::TimestampDesc, limit.max(1), 0)).await
    }
}

/// In-memory source for tests and demos.
///
/// Queries can be held back with [`MemorySource::gated`] and released one at
/// a time with [`MemorySource::release`].
#[derive(Clone, Default)]
pub struct MemorySource {
    records: Arc<Vec<LogRecord>>,
    gate: Option<Arc<Semaphore>>,
    failing: Arc<AtomicBool>,
}

impl MemorySource {
    pub fn new(mut records: Vec<LogRecord>) -> Self {
        records.sort_by(|a, b| {
            b.timestamp
                .total_cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        Self {
            records: Arc::new(records),
            gate: None,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every query waits for a [`release`](Self::release) first
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, queries: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(queries);
        }
    }

    /// Make every later call fail as if the store were locked
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("storage medium is locked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchSource for MemorySource {
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.check()?;
        let mut sessions: Vec<SessionInfo> = Vec::new();
        for record in self.records.iter() {
            match sessions.iter_mut().find(|s| s.id == record.session_id) {
                Some(session) => session.event_count += 1,
                None => sessions.push(SessionInfo {
                    id: record.session_id.clone(),
                    start_time: record.session_start_time,
                    event_count: 1,
                }),
            }
        }
        Ok(sessions)
    }

    async fn count(&self, criteria: &FilterCriteria) -> Result<u64> {
        self.check()?;
        Ok(self.records.iter().filter(|r| criteria.matches(r)).count() as u64)
    }

    async fn query(&self, criteria: &FilterCriteria, limit: usize) -> Result<Vec<LogRecord>> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            permit.forget();
        }
        self.check()?;
        Ok(self
            .records
            .iter()
            .filter(|r| criteria.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }
}
