use std::sync::Arc;

use dashmap::DashMap;
use traceloom_core::model::evaluation::EvaluationRecord;
use traceloom_core::model::span::SpanRecord;
use traceloom_core::query::StatusResponse;

/// Append-only, deduplicated working set of span and evaluation records.
///
/// Sharded maps keep contention per-key: appends for distinct traces never
/// touch the same lock, and span conflict detection is scoped to the single
/// `span_id` entry being written.
#[derive(Clone, Default)]
pub struct Store {
    pub(crate) spans: Arc<DashMap<String, SpanRecord>>,
    /// trace_id -> span ids, insertion order; queries re-sort by start time.
    pub(crate) traces: Arc<DashMap<String, Vec<String>>>,
    /// correlation key -> span ids sharing it across traces.
    pub(crate) corr_spans: Arc<DashMap<String, Vec<String>>>,
    /// correlation key -> evaluation records, never reconciled.
    pub(crate) evaluations: Arc<DashMap<String, Vec<EvaluationRecord>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusResponse {
        let mut oldest = None;
        let mut newest = None;
        for entry in self.spans.iter() {
            let ts = entry.value().start_time;
            if oldest.is_none_or(|o| ts < o) {
                oldest = Some(ts);
            }
            if newest.is_none_or(|n| ts > n) {
                newest = Some(ts);
            }
        }

        StatusResponse {
            spans_count: self.spans.len(),
            traces_count: self.traces.len(),
            evaluations_count: self.evaluations.iter().map(|e| e.value().len()).sum(),
            oldest_ts: oldest,
            newest_ts: newest,
        }
    }
}
