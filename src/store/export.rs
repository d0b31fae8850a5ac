//! Streaming export of matching records as rendered text lines.
//!
//! Pages are pulled with [`LogStore::query_batch`] until an empty page comes
//! back, so memory stays bounded by the batch size.

use std::io::Write;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::model::{FilterCriteria, LogRecord};

use super::error::Result;
use super::store::LogStore;

pub const DEFAULT_EXPORT_BATCH: usize = 500;

/// `<timestamp> <SEVERITY> [<context>] <file>:<line> <function>`
pub fn format_prefix(record: &LogRecord) -> String {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    );
    let secs = record.timestamp.floor();
    let subsec = ((record.timestamp - secs) * 1_000_000_000.0).round() as i128;
    let nanos = secs as i128 * 1_000_000_000 + subsec;
    let when = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| record.timestamp.to_string());

    let mut prefix = format!("{} {}", when, record.severity.label());
    if !record.context.is_empty() {
        prefix.push_str(&format!(" [{}]", record.context));
    }
    if !record.source_file_name.is_empty() {
        prefix.push_str(&format!(" {}:{}", record.source_file_name, record.line));
    }
    if !record.function.is_empty() {
        prefix.push_str(&format!(" {}", record.function));
    }
    prefix
}

/// One exported line: `<formatted prefix> - <message>`
pub fn format_line(record: &LogRecord) -> String {
    format!("{} - {}", format_prefix(record), record.message)
}

/// Write every matching record, newest first, one line each. Returns the line count.
pub fn export_lines<W: Write>(
    store: &LogStore,
    criteria: &FilterCriteria,
    batch_size: usize,
    out: &mut W,
) -> Result<usize> {
    let mut offset = 0;
    loop {
        let page = store.query_batch(criteria, offset, batch_size)?;
        if page.is_empty() {
            break;
        }
        for record in &page {
            writeln!(out, "{}", format_line(record))?;
        }
        offset += page.len();
        tracing::debug!(exported = offset, "Export page written");
    }
    out.flush()?;
    Ok(offset)
}
