use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::model::{CriteriaError, LogRecord};
use crate::observability::Metrics;
use crate::search::batching::{SearchBatch, plan_batches};
use crate::search::merge::merge_time_desc;
use crate::search::phase::{SearchPhase, SearchUpdate};
use crate::search::results::SearchResults;
use crate::search::snapshot::{SearchRequest, SearchSnapshot};
use crate::search::source::SearchSource;
use crate::store::StoreError;

#[derive(Default)]
struct State {
    generation: u64,
    phase: SearchPhase,
    snapshot: Option<Arc<SearchSnapshot>>,
    preview: Arc<Vec<LogRecord>>,
    results: Arc<SearchResults>,
}

impl State {
    /// Supersede whatever search was running and clear its results
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        self.snapshot = None;
        self.preview = Arc::default();
        self.results = Arc::default();
        self.generation
    }
}

struct Inner {
    source: Arc<dyn SearchSource>,
    config: SearchConfig,
    metrics: Arc<Metrics>,
    updates: mpsc::UnboundedSender<SearchUpdate>,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn limit(&self) -> u64 {
        self.config.results_limit as u64
    }

    fn emit(&self, state: &State) {
        let update = SearchUpdate {
            generation: state.generation,
            phase: state.phase.clone(),
            results: state.results.clone(),
        };
        if self.updates.send(update).is_err() {
            debug!(generation = state.generation, "Search update receiver dropped");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Apply `f` and emit, unless `generation` has been superseded
    fn transition(&self, generation: u64, f: impl FnOnce(&mut State)) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(generation, current = state.generation, "Discarding stale search result");
            return false;
        }
        f(&mut state);
        self.emit(&state);
        true
    }

    /// Enter the preview phase for the current generation
    fn begin(&self, state: &mut State, request: &SearchRequest) -> bool {
        if request.fields.is_empty() {
            state.phase = SearchPhase::Failed {
                message: CriteriaError::NoSearchFields.to_string(),
            };
            self.emit(state);
            return false;
        }
        state.phase = SearchPhase::PreviewSearching { session_count: 0 };
        self.metrics.search_started();
        info!(generation = state.generation, text = %request.text.trim(), "Starting search");
        true
    }

    fn fail(&self, generation: u64, error: &StoreError) {
        warn!(generation, error = %error, "Search failed");
        self.transition(generation, |state| {
            state.phase = SearchPhase::Failed {
                message: error.to_string(),
            };
            state.snapshot = None;
        });
    }

    fn too_many(&self, generation: u64, current_count: u64) {
        let limit = self.limit();
        info!(generation, current_count, limit, "Search stopped, too many results");
        self.transition(generation, |state| {
            state.phase = SearchPhase::TooManyResults {
                current_count,
                limit,
            };
        });
    }
}

/// Two-phase text search over the persisted sessions.
///
/// The preview phase searches the most recent sessions right away. The rest
/// are searched in batches only after [`request_full_search`](Self::request_full_search).
/// Every transition is sent on the update channel returned by [`DeepSearch::new`].
///
/// Each search gets a generation number. Starting another search or
/// cancelling bumps it, and results computed for an older generation are
/// dropped without being emitted.
#[derive(Clone)]
pub struct DeepSearch {
    inner: Arc<Inner>,
}

impl DeepSearch {
    pub fn new(
        source: Arc<dyn SearchSource>,
        config: SearchConfig,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::UnboundedReceiver<SearchUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            source,
            config,
            metrics,
            updates,
            state: Mutex::new(State::default()),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn phase(&self) -> SearchPhase {
        self.inner.lock().phase.clone()
    }

    pub fn results(&self) -> Arc<SearchResults> {
        self.inner.lock().results.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Start searching for `request.text`, superseding any running search.
    ///
    /// Blank text returns the engine to `Idle`. Returns the new generation.
    pub fn start_search(&self, request: SearchRequest) -> u64 {
        let mut state = self.inner.lock();
        let generation = state.supersede();

        if request.text.trim().is_empty() {
            state.phase = SearchPhase::Idle;
            self.inner.emit(&state);
            return generation;
        }
        if !self.inner.begin(&mut state, &request) {
            return generation;
        }
        drop(state);

        tokio::spawn(run_preview(self.inner.clone(), request, generation));
        generation
    }

    /// Record a keystroke; the search starts once typing pauses
    pub fn update_text(&self, request: SearchRequest) -> u64 {
        let mut state = self.inner.lock();
        let generation = state.supersede();

        state.phase = if request.text.trim().is_empty() {
            SearchPhase::Idle
        } else {
            SearchPhase::Typing
        };
        self.inner.emit(&state);
        if state.phase == SearchPhase::Idle {
            return generation;
        }
        drop(state);

        let inner = self.inner.clone();
        let delay = inner.config.typing_debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.lock();
                if state.generation != generation || !inner.begin(&mut state, &request) {
                    return;
                }
            }
            run_preview(inner, request, generation).await;
        });
        generation
    }

    /// Search the sessions left out of the preview.
    ///
    /// Only valid right after a preview that reported more sessions; returns
    /// whether a full search was started.
    pub fn request_full_search(&self) -> bool {
        let mut state = self.inner.lock();
        let match_count = match &state.phase {
            SearchPhase::PreviewCompleted {
                match_count,
                has_more_sessions: true,
                ..
            } => *match_count,
            _ => return false,
        };
        let Some(snapshot) = state.snapshot.clone() else {
            return false;
        };

        let batches = plan_batches(
            snapshot.full_search_sessions(),
            self.inner.config.target_batch_size,
        );
        let total_estimated_events = snapshot.estimated_total_events();
        state.phase = SearchPhase::FullSearching {
            scanned_events: 0,
            total_estimated_events,
            match_count,
        };
        self.inner.emit(&state);

        let generation = state.generation;
        let preview = state.preview.clone();
        drop(state);

        info!(
            generation,
            batches = batches.len(),
            total_estimated_events,
            "Starting full search"
        );
        tokio::spawn(run_full(
            self.inner.clone(),
            generation,
            snapshot,
            preview,
            batches,
            total_estimated_events,
        ));
        true
    }

    /// Stop the active search. Returns false when nothing was active.
    pub fn cancel_search(&self) -> bool {
        let mut state = self.inner.lock();
        let cancellable = state.phase.is_running()
            || matches!(
                state.phase,
                SearchPhase::Typing | SearchPhase::PreviewCompleted { .. }
            );
        if !cancellable {
            return false;
        }

        state.phase = SearchPhase::Cancelled;
        state.snapshot = None;
        self.inner.emit(&state);
        info!(generation = state.generation, "Search cancelled");
        state.generation += 1;
        true
    }
}

async fn run_preview(inner: Arc<Inner>, request: SearchRequest, generation: u64) {
    let sessions = match inner.source.list_sessions().await {
        Ok(sessions) => sessions,
        Err(e) => return inner.fail(generation, &e),
    };
    let snapshot = Arc::new(SearchSnapshot::build(
        sessions,
        &request,
        inner.config.preview_session_count,
    ));
    let session_count = snapshot.preview_sessions().len();

    let started = inner.transition(generation, |state| {
        state.snapshot = Some(snapshot.clone());
        state.phase = SearchPhase::PreviewSearching { session_count };
    });
    if !started {
        return;
    }

    let records = if session_count == 0 {
        Vec::new()
    } else {
        let criteria = snapshot.preview_criteria();
        let count = match inner.source.count(&criteria).await {
            Ok(count) => count,
            Err(e) => return inner.fail(generation, &e),
        };
        if count > inner.limit() {
            return inner.too_many(generation, count);
        }
        match inner.source.query(&criteria, inner.config.results_limit).await {
            Ok(records) => records,
            Err(e) => return inner.fail(generation, &e),
        }
    };

    let match_count = records.len();
    let results = Arc::new(SearchResults::build(
        records.clone(),
        snapshot.query(),
        inner.config.top_messages,
    ));
    let has_more_sessions = snapshot.has_more_sessions();
    inner.transition(generation, |state| {
        state.preview = Arc::new(records);
        state.results = results;
        state.phase = SearchPhase::PreviewCompleted {
            match_count,
            searched_sessions: session_count,
            has_more_sessions,
        };
    });
    debug!(generation, match_count, has_more_sessions, "Preview search finished");
}

async fn run_full(
    inner: Arc<Inner>,
    generation: u64,
    snapshot: Arc<SearchSnapshot>,
    preview: Arc<Vec<LogRecord>>,
    batches: Vec<SearchBatch>,
    total_estimated_events: u64,
) {
    let mut full: Vec<LogRecord> = Vec::new();
    let mut scanned_events = 0u64;

    for (index, batch) in batches.iter().enumerate() {
        if !inner.is_current(generation) {
            debug!(generation, batch = index, "Full search superseded before batch");
            return;
        }

        let criteria = snapshot.criteria_for(batch.session_ids.iter().map(String::as_str));
        let count = match inner.source.count(&criteria).await {
            Ok(count) => count,
            Err(e) => return inner.fail(generation, &e),
        };
        let running = (preview.len() + full.len()) as u64 + count;
        if running > inner.limit() {
            return inner.too_many(generation, running);
        }

        let records = match inner.source.query(&criteria, inner.config.results_limit).await {
            Ok(records) => records,
            Err(e) => return inner.fail(generation, &e),
        };
        full = merge_time_desc(&full, &records);
        scanned_events += batch.estimated_events;

        let visible = merge_time_desc(&preview, &full);
        let match_count = visible.len();
        if match_count as u64 > inner.limit() {
            return inner.too_many(generation, match_count as u64);
        }
        let results = Arc::new(SearchResults::build(
            visible,
            snapshot.query(),
            inner.config.top_messages,
        ));

        let progressed = inner.transition(generation, |state| {
            state.results = results;
            state.phase = SearchPhase::FullSearching {
                scanned_events,
                total_estimated_events,
                match_count,
            };
        });
        if !progressed {
            return;
        }
        debug!(
            generation,
            batch = index,
            sessions = batch.session_ids.len(),
            match_count,
            "Full search batch merged"
        );
    }

    let total_matches = preview.len() + full.len();
    let searched_sessions = snapshot.session_count();
    inner.transition(generation, |state| {
        state.phase = SearchPhase::Completed {
            total_matches,
            searched_sessions,
        };
    });
    info!(generation, total_matches, searched_sessions, "Search completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SearchField, SearchFields};
    use crate::search::source::MemorySource;
    use std::time::Duration;
    use tokio::time::timeout;

    fn rec(session: &str, start: f64, ts: f64, message: &str) -> LogRecord {
        LogRecord::builder()
            .message(message)
            .session_id(session)
            .session_start_time(start)
            .timestamp(ts)
            .build()
    }

    /// Five sessions, newest first: s5 s4 s3 (preview), s2 s1 (full).
    fn fixture() -> Vec<LogRecord> {
        vec![
            rec("s5", 500.0, 510.0, "request timeout"),
            rec("s5", 500.0, 511.0, "ok"),
            rec("s4", 400.0, 410.0, "ok"),
            rec("s3", 300.0, 310.0, "db timeout"),
            rec("s2", 200.0, 210.0, "ok"),
            rec("s2", 200.0, 211.0, "request timeout"),
            rec("s1", 100.0, 110.0, "timeout again"),
            rec("s1", 100.0, 111.0, "ok"),
        ]
    }

    fn config() -> SearchConfig {
        SearchConfig {
            target_batch_size: 2,
            ..SearchConfig::default()
        }
    }

    fn engine(
        source: MemorySource,
        config: SearchConfig,
    ) -> (DeepSearch, mpsc::UnboundedReceiver<SearchUpdate>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let (search, rx) = DeepSearch::new(Arc::new(source), config, metrics.clone());
        (search, rx, metrics)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SearchUpdate>) -> SearchUpdate {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("channel closed")
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<SearchUpdate>) {
        let extra = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(extra.is_err(), "unexpected update: {:?}", extra);
    }

    #[tokio::test]
    async fn test_preview_then_full_search() {
        let (search, mut rx, metrics) = engine(MemorySource::new(fixture()), config());

        let generation = search.start_search(SearchRequest::new("timeout"));
        let update = next(&mut rx).await;
        assert_eq!(update.generation, generation);
        assert_eq!(update.phase, SearchPhase::PreviewSearching { session_count: 3 });

        let update = next(&mut rx).await;
        assert_eq!(
            update.phase,
            SearchPhase::PreviewCompleted {
                match_count: 2,
                searched_sessions: 3,
                has_more_sessions: true,
            }
        );
        assert_eq!(update.results.messages.len(), 2);

        assert!(search.request_full_search());
        assert!(!search.request_full_search());

        let update = next(&mut rx).await;
        assert_eq!(
            update.phase,
            SearchPhase::FullSearching {
                scanned_events: 0,
                total_estimated_events: 4,
                match_count: 2,
            }
        );

        let update = next(&mut rx).await;
        assert_eq!(
            update.phase,
            SearchPhase::FullSearching {
                scanned_events: 2,
                total_estimated_events: 4,
                match_count: 3,
            }
        );
        let update = next(&mut rx).await;
        assert_eq!(
            update.phase,
            SearchPhase::FullSearching {
                scanned_events: 4,
                total_estimated_events: 4,
                match_count: 4,
            }
        );

        let update = next(&mut rx).await;
        assert_eq!(
            update.phase,
            SearchPhase::Completed {
                total_matches: 4,
                searched_sessions: 5,
            }
        );
        let timestamps: Vec<f64> = update.results.records.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![510.0, 310.0, 211.0, 110.0]);
        assert_eq!(update.results.messages[0].latest.message, "request timeout");
        assert_eq!(update.results.messages[0].count, 2);
        assert_eq!(metrics.snapshot().searches_started, 1);
    }

    #[tokio::test]
    async fn test_full_search_unavailable_without_more_sessions() {
        let request = SearchRequest::new("timeout")
            .with_scope(crate::search::SessionScope::selected(["s5", "s3"]));
        let (search, mut rx, _) = engine(MemorySource::new(fixture()), config());

        assert!(!search.request_full_search());
        search.start_search(request);
        next(&mut rx).await;
        let update = next(&mut rx).await;
        assert_eq!(
            update.phase,
            SearchPhase::PreviewCompleted {
                match_count: 2,
                searched_sessions: 2,
                has_more_sessions: false,
            }
        );
        assert!(!search.request_full_search());
    }

    #[tokio::test]
    async fn test_blank_text_returns_to_idle() {
        let (search, mut rx, metrics) = engine(MemorySource::new(fixture()), config());

        search.start_search(SearchRequest::new("   "));
        assert_eq!(next(&mut rx).await.phase, SearchPhase::Idle);
        assert_eq!(metrics.snapshot().searches_started, 0);
    }

    #[tokio::test]
    async fn test_no_fields_fails() {
        let (search, mut rx, _) = engine(MemorySource::new(fixture()), config());

        let no_fields = SearchFields::only(Vec::<SearchField>::new());
        search.start_search(SearchRequest::new("x").with_fields(no_fields));
        assert!(matches!(next(&mut rx).await.phase, SearchPhase::Failed { .. }));
    }

    #[tokio::test]
    async fn test_source_failure_becomes_failed_phase() {
        let source = MemorySource::new(fixture());
        source.set_failing(true);
        let (search, mut rx, _) = engine(source, config());

        search.start_search(SearchRequest::new("timeout"));
        let update = next(&mut rx).await;
        match update.phase {
            SearchPhase::Failed { message } => assert!(message.contains("locked")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!search.cancel_search());
    }

    #[tokio::test]
    async fn test_too_many_results_in_preview() {
        let config = SearchConfig {
            results_limit: 1,
            ..config()
        };
        let (search, mut rx, _) = engine(MemorySource::new(fixture()), config);

        search.start_search(SearchRequest::new("timeout"));
        next(&mut rx).await;
        assert_eq!(
            next(&mut rx).await.phase,
            SearchPhase::TooManyResults {
                current_count: 2,
                limit: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_too_many_results_during_full_search() {
        let config = SearchConfig {
            results_limit: 3,
            ..config()
        };
        let (search, mut rx, _) = engine(MemorySource::new(fixture()), config);

        search.start_search(SearchRequest::new("timeout"));
        next(&mut rx).await;
        next(&mut rx).await;
        assert!(search.request_full_search());
        next(&mut rx).await;

        let update = next(&mut rx).await;
        assert_eq!(update.phase.name(), "full_searching");
        assert_eq!(
            next(&mut rx).await.phase,
            SearchPhase::TooManyResults {
                current_count: 4,
                limit: 3,
            }
        );
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_cancel_stops_remaining_batches() {
        let source = MemorySource::new(fixture()).gated();
        let (search, mut rx, _) = engine(source.clone(), config());

        search.start_search(SearchRequest::new("timeout"));
        next(&mut rx).await;
        source.release(1);
        next(&mut rx).await;

        assert!(search.request_full_search());
        next(&mut rx).await;
        source.release(1);
        let update = next(&mut rx).await;
        assert!(matches!(
            update.phase,
            SearchPhase::FullSearching {
                scanned_events: 2,
                ..
            }
        ));

        assert!(search.cancel_search());
        assert_eq!(next(&mut rx).await.phase, SearchPhase::Cancelled);

        source.release(1);
        assert_quiet(&mut rx).await;
        assert_eq!(search.phase(), SearchPhase::Cancelled);
        assert!(!search.cancel_search());
    }

    #[tokio::test]
    async fn test_latest_search_wins() {
        let source = MemorySource::new(fixture()).gated();
        let (search, mut rx, _) = engine(source.clone(), config());

        let first = search.start_search(SearchRequest::new("timeout"));
        assert_eq!(next(&mut rx).await.generation, first);

        let second = search.start_search(SearchRequest::new("ok"));
        assert!(second > first);
        source.release(2);

        let update = next(&mut rx).await;
        assert_eq!(update.generation, second);
        assert_eq!(update.phase, SearchPhase::PreviewSearching { session_count: 3 });

        let update = next(&mut rx).await;
        assert_eq!(update.generation, second);
        assert!(matches!(
            update.phase,
            SearchPhase::PreviewCompleted { match_count: 2, .. }
        ));
        assert_quiet(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_debounce_runs_only_last_text() {
        let (search, mut rx, metrics) = engine(MemorySource::new(fixture()), config());

        for text in ["ti", "tim", "timeout"] {
            search.update_text(SearchRequest::new(text));
            assert_eq!(next(&mut rx).await.phase, SearchPhase::Typing);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(metrics.snapshot().searches_started, 0);

        let update = next(&mut rx).await;
        assert_eq!(update.phase, SearchPhase::PreviewSearching { session_count: 3 });
        let update = next(&mut rx).await;
        assert!(matches!(
            update.phase,
            SearchPhase::PreviewCompleted { match_count: 2, .. }
        ));
        assert_eq!(metrics.snapshot().searches_started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_text_while_typing_goes_idle() {
        let (search, mut rx, metrics) = engine(MemorySource::new(fixture()), config());

        search.update_text(SearchRequest::new("time"));
        next(&mut rx).await;
        search.update_text(SearchRequest::new(""));
        assert_eq!(next(&mut rx).await.phase, SearchPhase::Idle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(metrics.snapshot().searches_started, 0);
        assert_eq!(search.phase(), SearchPhase::Idle);
    }
}
