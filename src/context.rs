use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::buffer::{BufferHandle, IngestBuffer, LogSink};
use crate::config::{Config, ConfigError};
use crate::model::{LogRecord, SessionContext, Severity};
use crate::observability::Metrics;
use crate::search::{DeepSearch, SearchUpdate};
use crate::store::{LogStore, RetentionManager, StoreError};

#[derive(Debug, Error)]
pub enum LogBoxError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Shared handle over every logbox component.
///
/// Built once per process and passed to whoever needs to log, query or search.
pub struct LogBox {
    config: Arc<Config>,
    store: LogStore,
    buffer: IngestBuffer,
    retention: RetentionManager,
    session: SessionContext,
    metrics: Arc<Metrics>,
    periodic: Option<JoinHandle<()>>,
}

impl LogBox {
    /// Open the store, apply size-based rotation and start the ingest buffer.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(config: Config) -> Result<Self, LogBoxError> {
        config.validate()?;

        let store = LogStore::open(&config.store.path)?;
        let metrics = Arc::new(Metrics::new());
        let retention = RetentionManager::new(store.clone(), &config.retention, metrics.clone());

        let startup = retention.clone();
        match tokio::task::spawn_blocking(move || startup.rotate_if_needed()).await {
            Ok(Ok(stats)) if stats.applied => {
                info!(pruned = stats.records_pruned, "Startup rotation applied")
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Startup rotation failed"),
            Err(e) => warn!(error = %e, "Startup rotation task failed"),
        }

        let buffer = IngestBuffer::spawn(
            LogSink::Store(store.clone()),
            config.buffer.clone(),
            metrics.clone(),
        );
        let session = SessionContext::start();
        info!(
            session_id = %session.id,
            path = %config.store.path.display(),
            "Logbox opened"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            buffer,
            retention,
            session,
            metrics,
            periodic: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer.handle()
    }

    pub fn submit(&self, record: LogRecord) {
        self.buffer.submit(record);
    }

    pub async fn flush(&self) {
        self.buffer.flush().await;
    }

    /// Logger stamping records with this process' session
    pub fn logger(&self) -> Logger {
        Logger::new(self.buffer.handle(), self.session.clone())
    }

    /// New search engine over the persisted store
    pub fn search(&self) -> (DeepSearch, mpsc::UnboundedReceiver<SearchUpdate>) {
        DeepSearch::new(
            Arc::new(self.store.clone()),
            self.config.search.clone(),
            self.metrics.clone(),
        )
    }

    /// Start periodic size checks at `retention.check_interval_secs`
    pub fn start_retention(&mut self) {
        if self.periodic.is_some() {
            return;
        }
        let interval = Duration::from_secs(self.config.retention.check_interval_secs);
        self.periodic = Some(self.retention.clone().spawn_periodic(interval));
    }

    /// Flush pending records, stop background tasks and sync the store to disk
    pub async fn shutdown(self) -> Result<(), LogBoxError> {
        if let Some(periodic) = self.periodic {
            periodic.abort();
        }
        self.buffer.shutdown().await;
        self.store.persist()?;
        info!(session_id = %self.session.id, "Logbox closed");
        Ok(())
    }
}

/// Records log calls with their call site and submits them to the buffer
#[derive(Clone)]
pub struct Logger {
    buffer: BufferHandle,
    session: SessionContext,
    context: String,
    function: String,
}

impl Logger {
    pub fn new(buffer: BufferHandle, session: SessionContext) -> Self {
        Self {
            buffer,
            session,
            context: String::new(),
            function: String::new(),
        }
    }

    /// Same logger tagging its records with `context`
    pub fn with_context(&self, context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..self.clone()
        }
    }

    /// Same logger attributing its records to `function`
    pub fn scoped(&self, function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..self.clone()
        }
    }

    #[track_caller]
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let location = Location::caller();
        let current = std::thread::current();
        let thread = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };

        let record = LogRecord::builder()
            .message(message)
            .severity(severity)
            .session_id(self.session.id.clone())
            .session_start_time(self.session.start_time)
            .thread(thread)
            .function(self.function.clone())
            .source_file(location.file())
            .line(location.line())
            .context(self.context.clone())
            .build();
        self.buffer.submit(record);
    }

    #[track_caller]
    pub fn verbose(&self, message: impl Into<String>) {
        self.log(Severity::Verbose, message);
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        self.log(Severity::Critical, message);
    }

    #[track_caller]
    pub fn fault(&self, message: impl Into<String>) {
        self.log(Severity::Fault, message);
    }
}
