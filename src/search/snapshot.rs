use std::collections::BTreeSet;

use crate::model::{FilterCriteria, SearchFields, SessionInfo, TextQuery};

/// Sessions a search is allowed to look at
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionScope {
    #[default]
    All,
    Selected(BTreeSet<String>),
}

impl SessionScope {
    pub fn selected<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        SessionScope::Selected(ids.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, session_id: &str) -> bool {
        match self {
            SessionScope::All => true,
            SessionScope::Selected(ids) => ids.contains(session_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub text: String,
    pub fields: SearchFields,
    pub scope: SessionScope,
}

impl SearchRequest {
    /// Search every field of every session
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: SearchFields::all(),
            scope: SessionScope::All,
        }
    }

    pub fn with_fields(mut self, fields: SearchFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_scope(mut self, scope: SessionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn query(&self) -> TextQuery {
        TextQuery::new(self.text.trim(), self.fields.clone())
    }
}

/// Session split frozen when a search starts.
///
/// Later inserts or deletes never change which sessions the search covers.
#[derive(Debug, Clone)]
pub struct SearchSnapshot {
    query: TextQuery,
    preview_sessions: Vec<SessionInfo>,
    full_search_sessions: Vec<SessionInfo>,
    estimated_total_events: u64,
}

impl SearchSnapshot {
    pub fn build(
        mut sessions: Vec<SessionInfo>,
        request: &SearchRequest,
        preview_count: usize,
    ) -> Self {
        sessions.retain(|s| request.scope.includes(&s.id));
        sessions.sort_by(|a, b| {
            b.start_time
                .total_cmp(&a.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        let split = preview_count.min(sessions.len());
        let full_search_sessions = sessions.split_off(split);
        let estimated_total_events = full_search_sessions.iter().map(|s| s.event_count).sum();
        Self {
            query: request.query(),
            preview_sessions: sessions,
            full_search_sessions,
            estimated_total_events,
        }
    }

    pub fn query(&self) -> &TextQuery {
        &self.query
    }

    pub fn preview_sessions(&self) -> &[SessionInfo] {
        &self.preview_sessions
    }

    pub fn full_search_sessions(&self) -> &[SessionInfo] {
        &self.full_search_sessions
    }

    pub fn has_more_sessions(&self) -> bool {
        !self.full_search_sessions.is_empty()
    }

    /// Events in the full-search sessions, as counted when the snapshot was taken
    pub fn estimated_total_events(&self) -> u64 {
        self.estimated_total_events
    }

    pub fn session_count(&self) -> usize {
        self.preview_sessions.len() + self.full_search_sessions.len()
    }

    /// Text query restricted to the given sessions
    pub fn criteria_for<'a>(
        &self,
        session_ids: impl IntoIterator<Item = &'a str>,
    ) -> FilterCriteria {
        FilterCriteria::new()
            .with_sessions(session_ids)
            .with_text(self.query.clone())
    }

    pub fn preview_criteria(&self) -> FilterCriteria {
        self.criteria_for(self.preview_sessions.iter().map(|s| s.id.as_str()))
    }
}
