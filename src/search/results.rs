use std::collections::HashMap;

use crate::model::{LogRecord, SearchField, TextQuery};

/// Distinct message text that matched, represented by its newest record
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMatch {
    pub latest: LogRecord,
    pub count: usize,
}

/// Distinct field value that matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueMatch {
    pub value: String,
    pub count: usize,
}

/// Visible result set of a search, grouped by the field that matched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Every matching record, newest first
    pub records: Vec<LogRecord>,
    pub messages: Vec<MessageMatch>,
    pub file_names: Vec<ValueMatch>,
    pub functions: Vec<ValueMatch>,
    pub contexts: Vec<ValueMatch>,
    pub threads: Vec<ValueMatch>,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Categorize newest-first `records` by which fields `query` matches
    pub fn build(records: Vec<LogRecord>, query: &TextQuery, top_messages: usize) -> Self {
        let fields = query.fields();
        let matched = |field: SearchField, record: &LogRecord| {
            fields.contains(field) && query.matches_value(field.value_of(record))
        };

        let mut messages: Vec<MessageMatch> = Vec::new();
        let mut message_slots: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            if !matched(SearchField::Message, record) {
                continue;
            }
            match message_slots.get(record.message.as_str()) {
                Some(&slot) => messages[slot].count += 1,
                None => {
                    message_slots.insert(record.message.as_str(), messages.len());
                    messages.push(MessageMatch {
                        latest: record.clone(),
                        count: 1,
                    });
                }
            }
        }
        messages.sort_by(|a, b| b.latest.timestamp.total_cmp(&a.latest.timestamp));
        messages.truncate(top_messages);

        let tally = |field: SearchField| -> Vec<ValueMatch> {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for record in records.iter().filter(|r| matched(field, *r)) {
                *counts.entry(field.value_of(record)).or_default() += 1;
            }
            let mut values: Vec<ValueMatch> = counts
                .into_iter()
                .map(|(value, count)| ValueMatch {
                    value: value.to_string(),
                    count,
                })
                .collect();
            values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            values
        };

        let file_names = tally(SearchField::FileName);
        let functions = tally(SearchField::Function);
        let contexts = tally(SearchField::Context);
        let threads = tally(SearchField::Thread);

        Self {
            records,
            messages,
            file_names,
            functions,
            contexts,
            threads,
        }
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
