use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use super::record::{LogRecord, Severity};

/// Record fields a text search can look into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchField {
    Message,
    FileName,
    Function,
    Context,
    Thread,
}

impl SearchField {
    pub const ALL: [SearchField; 5] = [
        SearchField::Message,
        SearchField::FileName,
        SearchField::Function,
        SearchField::Context,
        SearchField::Thread,
    ];

    pub fn value_of<'a>(&self, record: &'a LogRecord) -> &'a str {
        match self {
            SearchField::Message => &record.message,
            SearchField::FileName => &record.source_file_name,
            SearchField::Function => &record.function,
            SearchField::Context => &record.context,
            SearchField::Thread => &record.thread,
        }
    }
}

/// Non-empty set of fields searched by a [`TextQuery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFields(BTreeSet<SearchField>);

impl SearchFields {
    pub fn all() -> Self {
        Self(SearchField::ALL.into_iter().collect())
    }

    pub fn only(fields: impl IntoIterator<Item = SearchField>) -> Self {
        Self(fields.into_iter().collect())
    }

    pub fn contains(&self, field: SearchField) -> bool {
        self.0.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SearchField> + '_ {
        self.0.iter().copied()
    }
}

impl Default for SearchFields {
    fn default() -> Self {
        Self::all()
    }
}

/// Case-insensitive substring search over a set of fields
#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    text: String,
    needle: String,
    fields: SearchFields,
}

impl TextQuery {
    pub fn new(text: impl Into<String>, fields: SearchFields) -> Self {
        let text = text.into();
        let needle = text.trim().to_lowercase();
        Self {
            text,
            needle,
            fields,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fields(&self) -> &SearchFields {
        &self.fields
    }

    /// True when `value` contains the query text, ignoring case
    pub fn matches_value(&self, value: &str) -> bool {
        !self.needle.is_empty() && value.to_lowercase().contains(&self.needle)
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.fields
            .iter()
            .any(|field| self.matches_value(field.value_of(record)))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CriteriaError {
    #[error("time range is inverted: since {since} > until {until}")]
    InvertedRange { since: f64, until: f64 },

    #[error("text query has no fields to search")]
    NoSearchFields,

    #[error("text query is empty")]
    EmptySearchText,
}

/// Set-based record predicate.
///
/// Categories are AND-combined; values inside a category are OR-combined.
/// An empty category places no restriction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub severities: BTreeSet<Severity>,
    pub functions: BTreeSet<String>,
    pub file_names: BTreeSet<String>,
    pub contexts: BTreeSet<String>,
    pub threads: BTreeSet<String>,
    pub session_ids: BTreeSet<String>,
    pub message_keywords: BTreeSet<String>,
    /// Inclusive lower bound on `timestamp`
    pub since: Option<f64>,
    /// Exclusive upper bound on `timestamp`
    pub until: Option<f64>,
    pub text: Option<TextQuery>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities.extend(severities);
        self
    }

    pub fn with_sessions<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.session_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_functions<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.functions.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_file_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.file_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_contexts<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.contexts.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_threads<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.threads.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_keywords<S: Into<String>>(mut self, words: impl IntoIterator<Item = S>) -> Self {
        self.message_keywords
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }

    pub fn with_time_range(mut self, since: Option<f64>, until: Option<f64>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn with_text(mut self, query: TextQuery) -> Self {
        self.text = Some(query);
        self
    }

    pub fn validate(&self) -> Result<(), CriteriaError> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(CriteriaError::InvertedRange { since, until });
            }
        }
        if let Some(text) = &self.text {
            if text.fields().is_empty() {
                return Err(CriteriaError::NoSearchFields);
            }
            if text.text().trim().is_empty() {
                return Err(CriteriaError::EmptySearchText);
            }
        }
        Ok(())
    }

    /// Evaluate every category against a record
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.matches_time(record.timestamp)
            && (self.severities.is_empty() || self.severities.contains(&record.severity))
            && accepts(&self.functions, &record.function)
            && accepts(&self.file_names, &record.source_file_name)
            && accepts(&self.contexts, &record.context)
            && accepts(&self.threads, &record.thread)
            && accepts(&self.session_ids, &record.session_id)
            && self.matches_keywords(&record.message)
            && self.text.as_ref().is_none_or(|q| q.matches(record))
    }

    pub fn matches_time(&self, timestamp: f64) -> bool {
        self.since.is_none_or(|since| timestamp >= since)
            && self.until.is_none_or(|until| timestamp < until)
    }

    fn matches_keywords(&self, message: &str) -> bool {
        if self.message_keywords.is_empty() {
            return true;
        }
        let message = message.to_lowercase();
        self.message_keywords
            .iter()
            .any(|word| message.contains(&word.to_lowercase()))
    }
}

fn accepts(set: &BTreeSet<String>, value: &str) -> bool {
    set.is_empty() || set.contains(value)
}

/// Result ordering for record queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    TimestampDesc,
    TimestampAsc,
}

/// Field whose distinct values can be listed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    Severity,
    Function,
    FileName,
    Context,
    Thread,
    SessionId,
}

/// Records removed by a bulk delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteScope {
    Session(String),
    Sessions(Vec<String>),
    /// A UTC day, or one hour of it when `hour` is set
    DateBucket { date: NaiveDate, hour: Option<u32> },
    /// Every record with `timestamp < cutoff`
    Before(f64),
    All,
}

impl fmt::Display for DeleteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteScope::Session(id) => write!(f, "session {}", id),
            DeleteScope::Sessions(ids) => write!(f, "sessions [{}]", ids.join(", ")),
            DeleteScope::DateBucket { date, hour: None } => write!(f, "date {}", date),
            DeleteScope::DateBucket {
                date,
                hour: Some(hour),
            } => write!(f, "date {} hour {:02}", date, hour),
            DeleteScope::Before(cutoff) => write!(f, "records before {}", cutoff),
            DeleteScope::All => f.write_str("all records"),
        }
    }
}
