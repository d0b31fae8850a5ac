//! Query planning: pick the narrowest candidate source for a [`FilterCriteria`]
//! and the residual predicate that still has to be checked per record.

use std::ops::Bound;

use crate::model::FilterCriteria;

use super::keys::{
    TAG_CONTEXT, TAG_FILE_NAME, TAG_FUNCTION, TAG_SESSION, TAG_SEVERITY, TAG_THREAD,
    encode_time_bound, micros_of, record_key_micros,
};

/// Where candidate record keys come from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Union of index prefixes for one category
    Index { tag: u8, values: Vec<String> },
    /// Range scan over the `records` partition
    Scan,
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub source: Source,
    /// Criteria left to evaluate after the source and the time range are applied
    pub residual: FilterCriteria,
    lower: Option<u64>,
    upper: Option<u64>,
}

impl QueryPlan {
    pub fn new(criteria: &FilterCriteria) -> Self {
        let mut residual = criteria.clone();
        residual.since = None;
        residual.until = None;

        // Most selective categories first: sessions partition the store,
        // severities rarely narrow it much.
        let source = if !residual.session_ids.is_empty() {
            take_index(TAG_SESSION, &mut residual.session_ids)
        } else if !residual.functions.is_empty() {
            take_index(TAG_FUNCTION, &mut residual.functions)
        } else if !residual.file_names.is_empty() {
            take_index(TAG_FILE_NAME, &mut residual.file_names)
        } else if !residual.contexts.is_empty() {
            take_index(TAG_CONTEXT, &mut residual.contexts)
        } else if !residual.threads.is_empty() {
            take_index(TAG_THREAD, &mut residual.threads)
        } else if !residual.severities.is_empty() {
            let values = residual
                .severities
                .iter()
                .map(|s| s.as_str().to_string())
                .collect();
            residual.severities.clear();
            Source::Index {
                tag: TAG_SEVERITY,
                values,
            }
        } else {
            Source::Scan
        };

        Self {
            source,
            residual,
            lower: criteria.since.map(micros_of),
            upper: criteria.until.map(micros_of),
        }
    }

    /// True when index keys alone decide membership
    pub fn is_key_only(&self) -> bool {
        self.residual == FilterCriteria::default()
    }

    /// Whether a record key falls inside the requested time range
    pub fn key_in_range(&self, record_key: &[u8]) -> bool {
        let Some(micros) = record_key_micros(record_key) else {
            return false;
        };
        self.lower.is_none_or(|lo| micros >= lo) && self.upper.is_none_or(|hi| micros < hi)
    }

    /// Key range over the `records` partition
    pub fn record_range(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let lower = match self.lower {
            Some(micros) => Bound::Included(encode_time_bound(micros)),
            None => Bound::Unbounded,
        };
        let upper = match self.upper {
            Some(micros) => Bound::Excluded(encode_time_bound(micros)),
            None => Bound::Unbounded,
        };
        (lower, upper)
    }
}

fn take_index(tag: u8, set: &mut std::collections::BTreeSet<String>) -> Source {
    let values = std::mem::take(set).into_iter().collect();
    Source::Index { tag, values }
}
