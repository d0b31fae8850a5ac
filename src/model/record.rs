use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bon::bon;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Current wall-clock time as float seconds since the Unix epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Record severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Verbose,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Fault,
}

#[derive(Debug, Error)]
#[error("unknown severity: {0}")]
pub struct UnknownSeverity(pub String);

impl Severity {
    pub const ALL: [Severity; 7] = [
        Severity::Verbose,
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Fault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Verbose => "verbose",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Fault => "fault",
        }
    }

    /// Upper-case label used in rendered log lines
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Verbose => "VERBOSE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Fault => "FAULT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(Severity::Verbose),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "fault" => Ok(Severity::Fault),
            other => Err(UnknownSeverity(other.to_string())),
        }
    }
}

/// One persisted log entry. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: f64,
    pub severity: Severity,
    pub message: String,
    pub thread: String,
    pub function: String,
    pub source_file: String,
    /// Last path component of `source_file`, computed once at construction
    pub source_file_name: String,
    pub line: u32,
    pub context: String,
    pub session_id: String,
    pub session_start_time: f64,
}

#[bon]
impl LogRecord {
    #[builder]
    pub fn new(
        #[builder(into)] message: String,
        #[builder(default)] severity: Severity,
        #[builder(into)] session_id: String,
        session_start_time: f64,
        #[builder(into)] id: Option<String>,
        timestamp: Option<f64>,
        #[builder(default, into)] thread: String,
        #[builder(default, into)] function: String,
        #[builder(default, into)] source_file: String,
        #[builder(default)] line: u32,
        #[builder(default, into)] context: String,
    ) -> Self {
        let source_file_name = file_name_of(&source_file);
        Self {
            id: id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            timestamp: timestamp.unwrap_or_else(now_secs),
            severity,
            message,
            thread,
            function,
            source_file,
            source_file_name,
            line,
            context,
            session_id,
            session_start_time,
        }
    }
}

fn file_name_of(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

/// Aggregate view of one session, recomputed from the store on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub start_time: f64,
    pub event_count: u64,
}

/// Identity of the running process' session, stamped on every record it emits
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub id: String,
    pub start_time: f64,
}

impl SessionContext {
    /// Start a new session with a short random id
    pub fn start() -> Self {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            start_time: now_secs(),
        }
    }
}
