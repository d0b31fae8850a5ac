//! Record, session and filter definitions shared by every component.
//!
//! - [`LogRecord`]: one immutable log entry, created at log-call time
//! - [`SessionInfo`]: per-session aggregate derived from stored records
//! - [`FilterCriteria`]: set-based predicate evaluated by the query layer
//! - [`DeleteScope`]: what a bulk delete removes

pub mod criteria;
pub mod record;

pub use criteria::{
    CriteriaError, DeleteScope, DistinctField, FilterCriteria, SearchField, SearchFields, SortOrder,
    TextQuery,
};
pub use record::{LogRecord, SessionContext, SessionInfo, Severity, UnknownSeverity, now_secs};
