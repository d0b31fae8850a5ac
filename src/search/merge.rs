use std::cmp::Ordering;

use crate::model::LogRecord;

/// Newest-first ordering with the record id as tie-breaker
fn newer_first(a: &LogRecord, b: &LogRecord) -> Ordering {
    b.timestamp
        .total_cmp(&a.timestamp)
        .then_with(|| b.id.cmp(&a.id))
}

/// Merge two newest-first sequences into one newest-first sequence
pub fn merge_time_desc(left: &[LogRecord], right: &[LogRecord]) -> Vec<LogRecord> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        if newer_first(&left[i], &right[j]) != Ordering::Greater {
            merged.push(left[i].clone());
            i += 1;
        } else {
            merged.push(right[j].clone());
            j += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}
