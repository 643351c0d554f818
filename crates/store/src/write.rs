use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::warn;
use traceloom_core::error::{Result, TraceloomError};
use traceloom_core::model::evaluation::EvaluationRecord;
use traceloom_core::model::span::SpanRecord;

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Appended {
    Inserted,
    /// The span was already present with identical content; nothing changed.
    Duplicate,
}

impl Store {
    /// Idempotent append keyed by `span_id`. Re-submitting identical content
    /// is a no-op; differing content for a known id is a conflict.
    pub fn append(&self, span: SpanRecord) -> Result<Appended> {
        if span.span_id.is_empty() {
            return Err(TraceloomError::InvalidArgument(
                "span_id must not be empty".to_string(),
            ));
        }
        if span.trace_id.is_empty() {
            return Err(TraceloomError::InvalidArgument(format!(
                "span {} has no trace_id",
                span.span_id
            )));
        }

        // The span-shard guard is released before the index maps are
        // touched; holding it across them would invert lock order against
        // readers walking index -> spans.
        let inserted = match self.spans.entry(span.span_id.clone()) {
            Entry::Occupied(existing) => {
                if *existing.get() == span {
                    false
                } else {
                    return Err(TraceloomError::Conflict(span.span_id));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(span.clone());
                true
            }
        };

        if !inserted {
            return Ok(Appended::Duplicate);
        }

        self.traces
            .entry(span.trace_id.clone())
            .or_default()
            .push(span.span_id.clone());
        if let Some(key) = span.attrs.correlation_key() {
            self.corr_spans
                .entry(key)
                .or_default()
                .push(span.span_id);
        }
        Ok(Appended::Inserted)
    }

    /// Evaluation records are accepted unconditionally and never reconciled
    /// against each other.
    pub fn append_evaluation(&self, record: EvaluationRecord) -> Result<()> {
        if !record.is_valid() {
            warn!(
                evaluator = %record.evaluator_name,
                score = record.score,
                "evaluation score outside [0, 1]; retained but excluded from aggregates"
            );
        }
        self.evaluations
            .entry(record.correlation_key.clone())
            .or_default()
            .push(record);
        Ok(())
    }
}
