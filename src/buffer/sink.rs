use std::sync::{Arc, Mutex};

use crate::model::{LogRecord, Severity};
use crate::store::{LogStore, StoreError};

/// Destination of flushed batches
#[derive(Clone)]
pub enum LogSink {
    /// Durable store; the only sink queries and searches can see
    Store(LogStore),
    /// In-process capture of every flushed batch
    Memory(MemorySink),
    /// Render through `tracing` under the `logbox::console` target
    Console,
}

impl LogSink {
    /// Write one batch as a single bulk operation
    pub async fn write(&self, batch: Vec<LogRecord>) -> Result<usize, StoreError> {
        match self {
            LogSink::Store(store) => {
                let store = store.clone();
                tokio::task::spawn_blocking(move || store.insert_batch(&batch))
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("flush task failed: {}", e)))?
            }
            LogSink::Memory(memory) => Ok(memory.push(batch)),
            LogSink::Console => {
                let count = batch.len();
                for record in &batch {
                    render(record);
                }
                Ok(count)
            }
        }
    }
}

fn render(record: &LogRecord) {
    let file = record.source_file_name.as_str();
    let line = record.line;
    let session = record.session_id.as_str();
    let msg = record.message.as_str();
    match record.severity {
        Severity::Verbose => {
            tracing::trace!(target: "logbox::console", file, line, session, "{}", msg)
        }
        Severity::Debug => {
            tracing::debug!(target: "logbox::console", file, line, session, "{}", msg)
        }
        Severity::Info => {
            tracing::info!(target: "logbox::console", file, line, session, "{}", msg)
        }
        Severity::Warning => {
            tracing::warn!(target: "logbox::console", file, line, session, "{}", msg)
        }
        Severity::Error | Severity::Critical | Severity::Fault => tracing::error!(
            target: "logbox::console",
            file,
            line,
            session,
            severity = %record.severity,
            "{}",
            msg
        ),
    }
}

/// Shared capture buffer for [`LogSink::Memory`]
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<LogRecord>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, batch: Vec<LogRecord>) -> usize {
        let count = batch.len();
        self.lock().push(batch);
        count
    }

    /// Every batch written so far, in flush order
    pub fn batches(&self) -> Vec<Vec<LogRecord>> {
        self.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().iter().map(Vec::len).collect()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().iter().flatten().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<LogRecord>>> {
        self.batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
