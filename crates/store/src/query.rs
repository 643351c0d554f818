use regex::RegexBuilder;
use traceloom_core::error::{Result, TraceloomError};
use traceloom_core::filter::TimeWindow;
use traceloom_core::model::evaluation::EvaluationRecord;
use traceloom_core::model::span::SpanRecord;
use traceloom_core::query::RangeRequest;

use crate::Store;

impl Store {
    /// All spans of a trace ordered by start time, `span_id` tiebreak so
    /// output is deterministic for equal timestamps.
    pub fn spans_for_trace(&self, trace_id: &str) -> Vec<SpanRecord> {
        let Some(ids) = self.traces.get(trace_id) else {
            return Vec::new();
        };

        let mut spans = ids
            .value()
            .iter()
            .filter_map(|id| self.spans.get(id).map(|s| s.value().clone()))
            .collect::<Vec<_>>();
        sort_spans(&mut spans);
        spans
    }

    /// Spans and evaluation records sharing a correlation key, across trace
    /// boundaries. Either side may be empty.
    pub fn by_correlation_key(&self, key: &str) -> (Vec<SpanRecord>, Vec<EvaluationRecord>) {
        let mut spans = self
            .corr_spans
            .get(key)
            .map(|ids| {
                ids.value()
                    .iter()
                    .filter_map(|id| self.spans.get(id).map(|s| s.value().clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        sort_spans(&mut spans);

        let mut evals = self
            .evaluations
            .get(key)
            .map(|records| records.value().clone())
            .unwrap_or_default();
        sort_evaluations(&mut evals);

        (spans, evals)
    }

    /// Spans whose start time falls in the window, filtered by kind, name
    /// pattern, success and attribute globs.
    pub fn query_range(&self, req: &RangeRequest) -> Result<Vec<SpanRecord>> {
        let name_regex = match &req.filter.name_pattern {
            Some(pattern) => Some(
                RegexBuilder::new(pattern)
                    .build()
                    .map_err(|e| TraceloomError::Parse(format!("invalid name pattern: {e}")))?,
            ),
            None => None,
        };

        let mut spans = self
            .spans
            .iter()
            .filter(|entry| {
                let span = entry.value();
                req.window.contains(span.start_time)
                    && req.filter.matches_fields(span)
                    && name_regex
                        .as_ref()
                        .is_none_or(|re| re.is_match(&span.name))
            })
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        sort_spans(&mut spans);
        spans.truncate(req.limit);
        Ok(spans)
    }

    /// Evaluation records with a timestamp in the window, across all keys.
    pub fn evaluations_in(&self, window: &TimeWindow) -> Vec<EvaluationRecord> {
        let mut out = Vec::new();
        for entry in self.evaluations.iter() {
            for record in entry.value() {
                if window.contains(record.timestamp) {
                    out.push(record.clone());
                }
            }
        }
        sort_evaluations(&mut out);
        out
    }

    /// Distinct trace ids with at least one span starting in the window.
    pub fn trace_ids_in(&self, window: &TimeWindow) -> Vec<String> {
        let mut ids = Vec::new();
        for entry in self.traces.iter() {
            let in_window = entry
                .value()
                .iter()
                .filter_map(|id| self.spans.get(id).map(|s| s.value().start_time))
                .any(|ts| window.contains(ts));
            if in_window {
                ids.push(entry.key().clone());
            }
        }
        ids.sort();
        ids
    }

    pub fn evaluations_for_key(&self, key: &str) -> Vec<EvaluationRecord> {
        let mut evals = self
            .evaluations
            .get(key)
            .map(|records| records.value().clone())
            .unwrap_or_default();
        sort_evaluations(&mut evals);
        evals
    }
}

fn sort_spans(spans: &mut [SpanRecord]) {
    spans.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.span_id.cmp(&b.span_id))
    });
}

fn sort_evaluations(evals: &mut [EvaluationRecord]) {
    evals.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.evaluator_name.cmp(&b.evaluator_name))
    });
}
