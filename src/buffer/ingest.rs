use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::buffer::sink::LogSink;
use crate::config::BufferConfig;
use crate::model::LogRecord;
use crate::observability::Metrics;

enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Immediate,
    BatchFull,
    Debounce,
    Manual,
    Shutdown,
}

/// Cheap handle for submitting records from any thread
///
/// `submit` never blocks and never fails from the caller's point of view.
#[derive(Clone)]
pub struct BufferHandle {
    tx: mpsc::UnboundedSender<Command>,
    metrics: Arc<Metrics>,
}

impl BufferHandle {
    pub fn submit(&self, record: LogRecord) {
        self.metrics.record_submitted();
        if self.tx.send(Command::Record(record)).is_err() {
            debug!("Ingest buffer closed, record dropped");
            self.metrics.record_dropped();
        }
    }

    /// Persist everything pending now and wait for the write to finish
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

/// Ingestion buffer accumulating records and flushing them in batches
///
/// One background task owns the pending list. A batch is written when
///
/// 1. a record with an immediate severity arrives (it and everything pending),
/// 2. the pending list reaches `batch_size`,
/// 3. `debounce` elapses without any new submission,
/// 4. `flush` or `shutdown` is called.
///
/// Failed writes are logged and the batch is dropped.
pub struct IngestBuffer {
    handle: BufferHandle,
    worker: JoinHandle<()>,
}

impl IngestBuffer {
    pub fn spawn(sink: LogSink, config: BufferConfig, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        info!(
            batch_size = config.batch_size,
            debounce_ms = config.debounce_ms,
            "Starting ingest buffer"
        );
        let worker = tokio::spawn(run(rx, sink, config, metrics.clone()));
        Self {
            handle: BufferHandle { tx, metrics },
            worker,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle.clone()
    }

    pub fn submit(&self, record: LogRecord) {
        self.handle.submit(record);
    }

    pub async fn flush(&self) {
        self.handle.flush().await;
    }

    /// Flush whatever is pending and stop the worker
    pub async fn shutdown(self) {
        let (ack, done) = oneshot::channel();
        if self.handle.tx.send(Command::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Ingest worker terminated abnormally");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    sink: LogSink,
    config: BufferConfig,
    metrics: Arc<Metrics>,
) {
    let debounce: Duration = config.debounce();
    let mut pending: Vec<LogRecord> = Vec::with_capacity(config.batch_size);
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Record(record)) => {
                    let immediate = config.immediate_severities.contains(&record.severity);
                    pending.push(record);
                    if immediate {
                        deadline = None;
                        flush_pending(&sink, &mut pending, &metrics, FlushReason::Immediate).await;
                    } else if pending.len() >= config.batch_size {
                        deadline = None;
                        flush_pending(&sink, &mut pending, &metrics, FlushReason::BatchFull).await;
                    } else {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Some(Command::Flush(ack)) => {
                    deadline = None;
                    flush_pending(&sink, &mut pending, &metrics, FlushReason::Manual).await;
                    let _ = ack.send(());
                }
                Some(Command::Shutdown(ack)) => {
                    flush_pending(&sink, &mut pending, &metrics, FlushReason::Shutdown).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    flush_pending(&sink, &mut pending, &metrics, FlushReason::Shutdown).await;
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                flush_pending(&sink, &mut pending, &metrics, FlushReason::Debounce).await;
            }
        }
    }

    info!("Ingest buffer stopped");
}

async fn flush_pending(
    sink: &LogSink,
    pending: &mut Vec<LogRecord>,
    metrics: &Metrics,
    reason: FlushReason,
) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    let count = batch.len();

    match sink.write(batch).await {
        Ok(written) => {
            debug!(count = written, ?reason, "Flushed batch");
            metrics.flush_succeeded(written);
        }
        Err(e) => {
            warn!(error = %e, dropped = count, ?reason, "Flush failed, dropping batch");
            metrics.flush_failed(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::sink::MemorySink;
    use crate::model::Severity;
    use crate::store::LogStore;
    use tempfile::TempDir;

    fn record(message: &str, severity: Severity) -> LogRecord {
        LogRecord::builder()
            .message(message)
            .severity(severity)
            .session_id("sess0001")
            .session_start_time(1_700_000_000.0)
            .build()
    }

    fn memory_buffer() -> (IngestBuffer, MemorySink, Arc<Metrics>) {
        let memory = MemorySink::new();
        let metrics = Arc::new(Metrics::new());
        let buffer = IngestBuffer::spawn(
            LogSink::Memory(memory.clone()),
            BufferConfig::default(),
            metrics.clone(),
        );
        (buffer, memory, metrics)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_size_triggers_single_flush() {
        let (buffer, memory, metrics) = memory_buffer();

        for i in 0..49 {
            buffer.submit(record(&format!("m{}", i), Severity::Info));
        }
        settle().await;
        assert!(memory.batch_sizes().is_empty());

        buffer.submit(record("m49", Severity::Info));
        settle().await;
        assert_eq!(memory.batch_sizes(), vec![50]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(memory.batch_sizes(), vec![50]);
        assert_eq!(metrics.snapshot().flushes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_flushes_immediately() {
        let (buffer, memory, _) = memory_buffer();

        buffer.submit(record("boom", Severity::Error));
        settle().await;

        assert_eq!(memory.batch_sizes(), vec![1]);
        assert_eq!(memory.records()[0].message, "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_flush_carries_pending_records_in_order() {
        let (buffer, memory, _) = memory_buffer();

        buffer.submit(record("a", Severity::Info));
        buffer.submit(record("b", Severity::Debug));
        buffer.submit(record("c", Severity::Info));
        buffer.submit(record("d", Severity::Warning));
        settle().await;

        let batches = memory.batches();
        assert_eq!(batches.len(), 1);
        let messages: Vec<_> = batches[0].iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_spaced_submissions() {
        let (buffer, memory, _) = memory_buffer();

        for i in 0..5 {
            buffer.submit(record(&format!("m{}", i), Severity::Info));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        // Last submission happened 1s ago; debounce window is 2s.
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(memory.batch_sizes().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(memory.batch_sizes(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_drains_pending() {
        let (buffer, memory, _) = memory_buffer();

        buffer.submit(record("a", Severity::Info));
        buffer.submit(record("b", Severity::Info));
        buffer.flush().await;

        assert_eq!(memory.batch_sizes(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_with_nothing_pending_is_noop() {
        let (buffer, memory, metrics) = memory_buffer();

        buffer.flush().await;

        assert!(memory.batches().is_empty());
        assert_eq!(metrics.snapshot().flushes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending() {
        let (buffer, memory, _) = memory_buffer();
        let handle = buffer.handle();

        handle.submit(record("late", Severity::Verbose));
        buffer.shutdown().await;

        assert_eq!(memory.batch_sizes(), vec![1]);

        handle.submit(record("after", Severity::Info));
        assert_eq!(memory.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch_and_keeps_running() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let metrics = Arc::new(Metrics::new());
        let buffer = IngestBuffer::spawn(
            LogSink::Store(store.clone()),
            BufferConfig::default(),
            metrics.clone(),
        );

        store.suspend();
        buffer.submit(record("lost", Severity::Error));
        buffer.flush().await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_dropped, 1);
        assert_eq!(snapshot.flushes_failed, 1);

        store.resume();
        buffer.submit(record("kept", Severity::Error));
        buffer.flush().await;

        let records = store
            .query(
                &crate::model::FilterCriteria::default(),
                crate::model::SortOrder::TimestampDesc,
                10,
                0,
            )
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }
}
