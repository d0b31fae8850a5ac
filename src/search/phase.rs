use std::fmt;
use std::sync::Arc;

use crate::search::results::SearchResults;

/// Observable state of a deep search
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SearchPhase {
    #[default]
    Idle,
    Typing,
    PreviewSearching {
        session_count: usize,
    },
    PreviewCompleted {
        match_count: usize,
        searched_sessions: usize,
        has_more_sessions: bool,
    },
    FullSearching {
        scanned_events: u64,
        total_estimated_events: u64,
        match_count: usize,
    },
    Completed {
        total_matches: usize,
        searched_sessions: usize,
    },
    Cancelled,
    Failed {
        message: String,
    },
    TooManyResults {
        current_count: u64,
        limit: u64,
    },
}

impl SearchPhase {
    /// A query is outstanding in this phase
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SearchPhase::PreviewSearching { .. } | SearchPhase::FullSearching { .. }
        )
    }

    /// No further transition happens without a new search
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchPhase::Completed { .. }
                | SearchPhase::Cancelled
                | SearchPhase::Failed { .. }
                | SearchPhase::TooManyResults { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchPhase::Idle => "idle",
            SearchPhase::Typing => "typing",
            SearchPhase::PreviewSearching { .. } => "preview_searching",
            SearchPhase::PreviewCompleted { .. } => "preview_completed",
            SearchPhase::FullSearching { .. } => "full_searching",
            SearchPhase::Completed { .. } => "completed",
            SearchPhase::Cancelled => "cancelled",
            SearchPhase::Failed { .. } => "failed",
            SearchPhase::TooManyResults { .. } => "too_many_results",
        }
    }

    /// Full-search progress in `0.0..`; may exceed 1.0 when estimates are stale
    pub fn progress(&self) -> Option<f64> {
        match self {
            SearchPhase::FullSearching {
                scanned_events,
                total_estimated_events,
                ..
            } if *total_estimated_events > 0 => {
                Some(*scanned_events as f64 / *total_estimated_events as f64)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPhase::PreviewSearching { session_count } => {
                write!(f, "searching {} recent sessions", session_count)
            }
            SearchPhase::PreviewCompleted {
                match_count,
                searched_sessions,
                has_more_sessions,
            } => {
                write!(f, "{} matches in {} sessions", match_count, searched_sessions)?;
                if *has_more_sessions {
                    f.write_str(", more sessions available")?;
                }
                Ok(())
            }
            SearchPhase::FullSearching {
                scanned_events,
                total_estimated_events,
                match_count,
            } => write!(
                f,
                "scanned {}/{} events, {} matches",
                scanned_events, total_estimated_events, match_count
            ),
            SearchPhase::Completed {
                total_matches,
                searched_sessions,
            } => write!(
                f,
                "{} matches in {} sessions",
                total_matches, searched_sessions
            ),
            SearchPhase::Failed { message } => write!(f, "failed: {}", message),
            SearchPhase::TooManyResults {
                current_count,
                limit,
            } => write!(f, "too many results: {} (limit {})", current_count, limit),
            other => f.write_str(other.name()),
        }
    }
}

/// One emitted transition together with the visible result set
#[derive(Debug, Clone)]
pub struct SearchUpdate {
    pub generation: u64,
    pub phase: SearchPhase,
    pub results: Arc<SearchResults>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_and_terminal_are_disjoint() {
        let phases = [
            SearchPhase::Idle,
            SearchPhase::Typing,
            SearchPhase::PreviewSearching { session_count: 3 },
            SearchPhase::FullSearching {
                scanned_events: 0,
                total_estimated_events: 10,
                match_count: 0,
            },
            SearchPhase::Cancelled,
            SearchPhase::Failed {
                message: "x".into(),
            },
        ];
        for phase in phases {
            assert!(!(phase.is_running() && phase.is_terminal()), "{:?}", phase);
        }
        assert!(!SearchPhase::Idle.is_running());
        assert!(SearchPhase::Cancelled.is_terminal());
    }

    #[test]
    fn test_progress_can_exceed_one() {
        let phase = SearchPhase::FullSearching {
            scanned_events: 300,
            total_estimated_events: 200,
            match_count: 1,
        };
        assert_eq!(phase.progress(), Some(1.5));
        assert_eq!(SearchPhase::Idle.progress(), None);
    }
}
