use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use crate::model::{DeleteScope, DistinctField, FilterCriteria, LogRecord, SessionInfo, SortOrder};

use super::error::{Result, StoreError};
use super::keys::{
    TAG_SESSION, decode_index_key, encode_bucket_prefix, encode_index_prefix, encode_meta_key,
    encode_record_key, encode_tag_prefix, encode_time_bound, index_entries, micros_of, tag_for,
};
use super::query::{QueryPlan, Source};

/// Fjall-backed persistent storage for log records and their secondary indexes
///
/// Every bulk write (insert or delete) goes through a single Fjall batch, so
/// readers never observe half of one.
#[derive(Clone)]
pub struct LogStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    index: PartitionHandle,
    metadata: PartitionHandle,
    suspended: Arc<AtomicBool>,
}

impl LogStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening log store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let index = keyspace.open_partition("index", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Log store opened successfully");
        Ok(Self {
            keyspace,
            records,
            index,
            metadata,
            suspended: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Mark the storage medium as locked; every operation fails with
    /// [`StoreError::Unavailable`] until [`LogStore::resume`] is called
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        info!("Log store suspended");
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
        info!("Log store resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_suspended() {
            return Err(StoreError::Unavailable("storage medium is locked".into()));
        }
        Ok(())
    }

    /// Append records and their index entries in one atomic batch
    pub fn insert_batch(&self, records: &[LogRecord]) -> Result<usize> {
        self.ensure_available()?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut batch = self.keyspace.batch();
        for record in records {
            let key = encode_record_key(record.timestamp, &record.id);
            let value = serde_json::to_vec(record)?;
            for (index_key, index_value) in index_entries(record, &key) {
                batch.insert(&self.index, index_key, index_value);
            }
            batch.insert(&self.records, key, value);
        }
        batch.commit()?;

        debug!(count = records.len(), "Inserted record batch");
        Ok(records.len())
    }

    /// Fetch one page of matching records.
    ///
    /// With no concurrent writes, consecutive pages `(0, n)`, `(n, n)`, ...
    /// partition the matching set. Ties on timestamp are broken by record id.
    pub fn query(
        &self,
        criteria: &FilterCriteria,
        order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogRecord>> {
        self.ensure_available()?;
        criteria.validate()?;
        if limit == 0 {
            return Err(StoreError::Malformed("limit must be positive".into()));
        }

        let plan = QueryPlan::new(criteria);
        let mut results = Vec::new();
        self.visit_matches(&plan, order, offset, |record| {
            results.push(record);
            results.len() < limit
        })?;
        Ok(results)
    }

    /// Cursor-style page in newest-first order; an empty result ends the stream
    pub fn query_batch(
        &self,
        criteria: &FilterCriteria,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<LogRecord>> {
        self.query(criteria, SortOrder::TimestampDesc, batch_size, offset)
    }

    /// Count matching records. Criteria resolvable from one index category
    /// (plus an optional time range) are counted from keys without decoding.
    pub fn count(&self, criteria: &FilterCriteria) -> Result<u64> {
        self.ensure_available()?;
        criteria.validate()?;

        let plan = QueryPlan::new(criteria);
        if plan.is_key_only() {
            return match &plan.source {
                Source::Index { tag, values } => {
                    Ok(self.index_candidates(&plan, *tag, values)?.len() as u64)
                }
                Source::Scan => {
                    let mut total = 0u64;
                    for item in self.records.range(plan.record_range()) {
                        item?;
                        total += 1;
                    }
                    Ok(total)
                }
            };
        }

        let mut total = 0u64;
        self.visit_matches(&plan, SortOrder::TimestampDesc, 0, |_| {
            total += 1;
            true
        })?;
        Ok(total)
    }

    /// Sorted distinct non-empty values of a field across all records
    pub fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>> {
        self.ensure_available()?;
        let mut values = BTreeSet::new();
        for item in self.index.prefix(encode_tag_prefix(tag_for(field))) {
            let (key, _) = item?;
            if let Some((value, _)) = decode_index_key(&key) {
                if !value.is_empty() {
                    values.insert(value);
                }
            }
        }
        Ok(values.into_iter().collect())
    }

    /// Group records by session, newest session first
    pub fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.ensure_available()?;
        let mut sessions: HashMap<String, (f64, u64)> = HashMap::new();

        for item in self.index.prefix(encode_tag_prefix(TAG_SESSION)) {
            let (key, value) = item?;
            let Some((session_id, _)) = decode_index_key(&key) else {
                continue;
            };
            let start_time = std::str::from_utf8(&value)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);

            let entry = sessions.entry(session_id).or_insert((start_time, 0));
            entry.0 = entry.0.max(start_time);
            entry.1 += 1;
        }

        let mut infos: Vec<SessionInfo> = sessions
            .into_iter()
            .map(|(id, (start_time, event_count))| SessionInfo {
                id,
                start_time,
                event_count,
            })
            .collect();
        infos.sort_by(|a, b| {
            b.start_time
                .total_cmp(&a.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(infos)
    }

    /// Remove every record in `scope` together with its index entries.
    ///
    /// Either all matching records are removed or, on failure, none are.
    pub fn delete(&self, scope: &DeleteScope) -> Result<usize> {
        self.ensure_available()?;
        let deleted = self
            .delete_inner(scope)
            .map_err(|e| StoreError::DeleteFailed {
                scope: scope.to_string(),
                reason: e.to_string(),
            })?;
        info!(deleted, scope = %scope, "Deleted records");
        Ok(deleted)
    }

    fn delete_inner(&self, scope: &DeleteScope) -> Result<usize> {
        let keys = self.keys_for_scope(scope)?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut batch = self.keyspace.batch();
        let mut deleted = 0;
        for key in keys {
            let Some(value) = self.records.get(&key)? else {
                continue;
            };
            match serde_json::from_slice::<LogRecord>(&value) {
                Ok(record) => {
                    for (index_key, _) in index_entries(&record, &key) {
                        batch.remove(&self.index, index_key);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Undecodable record, removing without index cleanup");
                }
            }
            batch.remove(&self.records, key);
            deleted += 1;
        }
        batch.commit()?;
        Ok(deleted)
    }

    fn keys_for_scope(&self, scope: &DeleteScope) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        match scope {
            DeleteScope::Session(id) => {
                self.collect_index_keys(encode_index_prefix(TAG_SESSION, id), &mut keys)?;
            }
            DeleteScope::Sessions(ids) => {
                for id in ids {
                    self.collect_index_keys(encode_index_prefix(TAG_SESSION, id), &mut keys)?;
                }
            }
            DeleteScope::DateBucket { date, hour } => {
                self.collect_index_keys(encode_bucket_prefix(*date, *hour), &mut keys)?;
            }
            DeleteScope::Before(cutoff) => {
                for item in self.records.range(..encode_time_bound(micros_of(*cutoff))) {
                    let (key, _) = item?;
                    keys.push(key.to_vec());
                }
            }
            DeleteScope::All => {
                for item in self.records.iter() {
                    let (key, _) = item?;
                    keys.push(key.to_vec());
                }
            }
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    fn collect_index_keys(&self, prefix: Vec<u8>, keys: &mut Vec<Vec<u8>>) -> Result<()> {
        for item in self.index.prefix(prefix) {
            let (key, _) = item?;
            if let Some((_, record_key)) = decode_index_key(&key) {
                keys.push(record_key.to_vec());
            }
        }
        Ok(())
    }

    /// Record keys for an index source, time-filtered and in ascending key order
    fn index_candidates(
        &self,
        plan: &QueryPlan,
        tag: u8,
        values: &[String],
    ) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for value in values {
            for item in self.index.prefix(encode_index_prefix(tag, value)) {
                let (key, _) = item?;
                if let Some((_, record_key)) = decode_index_key(&key) {
                    if plan.key_in_range(record_key) {
                        keys.push(record_key.to_vec());
                    }
                }
            }
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// Feed matching records to `visit` in `order`, skipping the first
    /// `offset` matches. Stops early once `visit` returns false.
    fn visit_matches(
        &self,
        plan: &QueryPlan,
        order: SortOrder,
        offset: usize,
        mut visit: impl FnMut(LogRecord) -> bool,
    ) -> Result<()> {
        match &plan.source {
            Source::Index { tag, values } => {
                let mut skipped = 0usize;
                let mut keys = self.index_candidates(plan, *tag, values)?;
                if order == SortOrder::TimestampDesc {
                    keys.reverse();
                }

                let key_only = plan.is_key_only();
                for key in keys {
                    if key_only && skipped < offset {
                        skipped += 1;
                        continue;
                    }
                    let Some(value) = self.records.get(&key)? else {
                        continue;
                    };
                    let record: LogRecord = serde_json::from_slice(&value)?;
                    if !plan.residual.matches(&record) {
                        continue;
                    }
                    if skipped < offset {
                        skipped += 1;
                        continue;
                    }
                    if !visit(record) {
                        break;
                    }
                }
            }
            Source::Scan => {
                let range = self.records.range(plan.record_range());
                match order {
                    SortOrder::TimestampDesc => {
                        scan_matches(range.rev(), plan, offset, &mut visit)?
                    }
                    SortOrder::TimestampAsc => scan_matches(range, plan, offset, &mut visit)?,
                }
            }
        }
        Ok(())
    }

    /// Bytes used on disk by the whole keyspace
    pub fn storage_size(&self) -> Result<u64> {
        self.ensure_available()?;
        Ok(self.keyspace.disk_space())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        Ok(self
            .metadata
            .get(encode_meta_key(key))?
            .map(|value| String::from_utf8_lossy(&value).to_string()))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        self.metadata.insert(encode_meta_key(key), value.as_bytes())?;
        Ok(())
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        self.ensure_available()?;
        let mut record_count = 0;
        for item in self.records.iter() {
            item?;
            record_count += 1;
        }

        Ok(StoreStats {
            record_count,
            session_count: self.list_sessions()?.len(),
            disk_bytes: self.keyspace.disk_space(),
        })
    }
}

fn scan_matches<I, K, V>(
    mut iter: I,
    plan: &QueryPlan,
    offset: usize,
    visit: &mut impl FnMut(LogRecord) -> bool,
) -> Result<()>
where
    I: Iterator<Item = fjall::Result<(K, V)>>,
    V: AsRef<[u8]>,
{
    let mut skipped = 0usize;
    // Without a residual every entry matches, so the offset is skipped undecoded
    if plan.is_key_only() {
        while skipped < offset && iter.next().transpose()?.is_some() {
            skipped += 1;
        }
    }
    for item in iter {
        let (_, value) = item?;
        let record: LogRecord = serde_json::from_slice(value.as_ref())?;
        if !plan.residual.matches(&record) {
            continue;
        }
        if skipped < offset {
            skipped += 1;
            continue;
        }
        if !visit(record) {
            break;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub record_count: usize,
    pub session_count: usize,
    pub disk_bytes: u64,
}
