//! Two-phase deep search over persisted sessions
//!
//! A search first looks at the few most recent sessions (preview) and, on
//! request, at the remaining ones in event-count-balanced batches. Progress
//! is published as a stream of [`SearchUpdate`] values.

mod batching;
mod engine;
mod merge;
mod phase;
mod results;
mod snapshot;
mod source;

pub use batching::{SearchBatch, estimated_total, plan_batches};
pub use engine::DeepSearch;
pub use merge::merge_time_desc;
pub use phase::{SearchPhase, SearchUpdate};
pub use results::{MessageMatch, SearchResults, ValueMatch};
pub use snapshot::{SearchRequest, SearchSnapshot, SessionScope};
pub use source::{MemorySource, SearchSource};
