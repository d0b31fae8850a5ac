//! Key layout and encoding utilities for Fjall partitions
//!
//! Partition structure:
//! - `records`: {micros:020}:{record_id} -> LogRecord (JSON)
//! - `index`: {tag}\0{value}\0{record_key} -> session start time for `s`, empty otherwise
//! - `metadata`: meta:{key} -> value (string)
//!
//! Record keys sort lexically in timestamp order, so a reverse scan of
//! `records` yields newest-first.

use chrono::{DateTime, NaiveDate};

use crate::model::{DistinctField, LogRecord};

pub const TAG_SESSION: u8 = b's';
pub const TAG_SEVERITY: u8 = b'v';
pub const TAG_FUNCTION: u8 = b'f';
pub const TAG_FILE_NAME: u8 = b'n';
pub const TAG_CONTEXT: u8 = b'c';
pub const TAG_THREAD: u8 = b't';
pub const TAG_BUCKET: u8 = b'b';

const SEP: u8 = 0;

/// Timestamp (float seconds) to whole microseconds; negative values clamp to zero
pub fn micros_of(timestamp: f64) -> u64 {
    if timestamp <= 0.0 || !timestamp.is_finite() {
        return 0;
    }
    (timestamp * 1_000_000.0).round() as u64
}

/// Encode a record key: {micros:020}:{id}
pub fn encode_record_key(timestamp: f64, id: &str) -> Vec<u8> {
    format!("{:020}:{}", micros_of(timestamp), id).into_bytes()
}

/// Key bound for all records at or after `micros`
pub fn encode_time_bound(micros: u64) -> Vec<u8> {
    format!("{:020}", micros).into_bytes()
}

/// Decode the timestamp prefix of a record key
pub fn record_key_micros(key: &[u8]) -> Option<u64> {
    let digits = key.get(..20)?;
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn sanitize(value: &str) -> String {
    value.replace('\0', "")
}

/// Encode an index key: {tag}\0{value}\0{record_key}
pub fn encode_index_key(tag: u8, value: &str, record_key: &[u8]) -> Vec<u8> {
    let mut key = encode_index_prefix(tag, value);
    key.extend_from_slice(record_key);
    key
}

/// Encode the prefix matching every record with `value` under `tag`: {tag}\0{value}\0
pub fn encode_index_prefix(tag: u8, value: &str) -> Vec<u8> {
    let mut key = encode_tag_prefix(tag);
    key.extend_from_slice(sanitize(value).as_bytes());
    key.push(SEP);
    key
}

/// Encode the prefix matching every entry under `tag`: {tag}\0
pub fn encode_tag_prefix(tag: u8) -> Vec<u8> {
    vec![tag, SEP]
}

/// Decode an index key into (value, record_key)
pub fn decode_index_key(key: &[u8]) -> Option<(String, &[u8])> {
    let rest = key.get(2..)?;
    let split = rest.iter().position(|b| *b == SEP)?;
    let value = std::str::from_utf8(&rest[..split]).ok()?.to_string();
    Some((value, &rest[split + 1..]))
}

/// Date-hour bucket of a timestamp (UTC): YYYY-MM-DDTHH
pub fn bucket_of(timestamp: f64) -> String {
    let micros = micros_of(timestamp) as i64;
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.format("%Y-%m-%dT%H").to_string())
        .unwrap_or_default()
}

/// Prefix selecting a whole day, or a single hour of it
pub fn encode_bucket_prefix(date: NaiveDate, hour: Option<u32>) -> Vec<u8> {
    match hour {
        Some(hour) => encode_index_prefix(TAG_BUCKET, &format!("{}T{:02}", date, hour)),
        None => {
            let mut key = encode_tag_prefix(TAG_BUCKET);
            key.extend_from_slice(format!("{}T", date).as_bytes());
            key
        }
    }
}

/// All secondary index entries for one record
pub fn index_entries(record: &LogRecord, record_key: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let session_value = record.session_start_time.to_string().into_bytes();
    vec![
        (
            encode_index_key(TAG_SESSION, &record.session_id, record_key),
            session_value,
        ),
        (
            encode_index_key(TAG_SEVERITY, record.severity.as_str(), record_key),
            Vec::new(),
        ),
        (
            encode_index_key(TAG_FUNCTION, &record.function, record_key),
            Vec::new(),
        ),
        (
            encode_index_key(TAG_FILE_NAME, &record.source_file_name, record_key),
            Vec::new(),
        ),
        (
            encode_index_key(TAG_CONTEXT, &record.context, record_key),
            Vec::new(),
        ),
        (
            encode_index_key(TAG_THREAD, &record.thread, record_key),
            Vec::new(),
        ),
        (
            encode_index_key(TAG_BUCKET, &bucket_of(record.timestamp), record_key),
            Vec::new(),
        ),
    ]
}

pub fn tag_for(field: DistinctField) -> u8 {
    match field {
        DistinctField::Severity => TAG_SEVERITY,
        DistinctField::Function => TAG_FUNCTION,
        DistinctField::FileName => TAG_FILE_NAME,
        DistinctField::Context => TAG_CONTEXT,
        DistinctField::Thread => TAG_THREAD,
        DistinctField::SessionId => TAG_SESSION,
    }
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
