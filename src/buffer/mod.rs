//! Ingestion buffer
//!
//! Callers hand records to a [`BufferHandle`] without waiting on storage.
//! A single background task batches them and writes each batch to a
//! [`LogSink`] in one bulk operation.

mod ingest;
mod sink;

pub use ingest::{BufferHandle, IngestBuffer};
pub use sink::{LogSink, MemorySink};
