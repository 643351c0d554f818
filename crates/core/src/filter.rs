use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceloomError};
use crate::model::span::{SpanKind, SpanRecord};

/// Glob match against a typed span attribute, `key=glob` syntax.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttrFilter {
    pub key: String,
    pub value_glob: String,
}

impl AttrFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value_glob) = input
            .split_once('=')
            .ok_or_else(|| TraceloomError::Parse(format!("invalid attr filter: {input}")))?;

        if key.trim().is_empty() || value_glob.trim().is_empty() {
            return Err(TraceloomError::Parse(format!(
                "invalid attr filter: {input}"
            )));
        }

        Ok(Self {
            key: key.trim().to_string(),
            value_glob: value_glob.trim().to_string(),
        })
    }

    pub fn matches(&self, span: &SpanRecord) -> bool {
        let Some(value) = span.attrs.get(&self.key) else {
            return false;
        };
        Pattern::new(&self.value_glob)
            .map(|p| p.matches(&value))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self {
            since: None,
            until: None,
        }
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(since) = self.since
            && ts < since
        {
            return false;
        }
        if let Some(until) = self.until
            && ts > until
        {
            return false;
        }
        true
    }
}

/// Record-level predicate for range queries over spans. The name pattern is
/// a regex compiled by the store at query time; everything else matches here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordFilter {
    pub kind: Option<SpanKind>,
    pub name_pattern: Option<String>,
    pub success: Option<bool>,
    pub attr_filters: Vec<AttrFilter>,
}

impl RecordFilter {
    pub fn matches_fields(&self, span: &SpanRecord) -> bool {
        if let Some(kind) = &self.kind
            && &span.kind != kind
        {
            return false;
        }
        if let Some(success) = self.success
            && span.success != success
        {
            return false;
        }
        self.attr_filters.iter().all(|f| f.matches(span))
    }
}
