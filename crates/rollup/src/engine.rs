use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use traceloom_core::config::Config;
use traceloom_core::error::{DataQualityWarning, Result, TraceloomError};
use traceloom_core::filter::{RecordFilter, TimeWindow};
use traceloom_core::model::rollup::{EvaluatorStats, KindStats, TraceDetail, TraceSummary};
use traceloom_core::model::span::{SpanAttrs, SpanKind, SpanRecord};
use traceloom_core::query::{
    AttributeCount, GroupBy, HistogramBucket, HistogramRequest, PercentileRequest, PercentileRow,
    RangeRequest, RollupRequest, RollupRow, SlowTracesRequest, TopAttributesRequest,
};
use traceloom_core::time::bucket_start;
use traceloom_correlate::cost::{CostModel, round_amount};
use traceloom_correlate::evaluation;
use traceloom_correlate::graph::TraceTree;
use traceloom_correlate::metrics;
use traceloom_store::Store;

/// Read side of the engine: every query is a pure fold over the store's
/// current contents, recomputed per call and safe to run in parallel across
/// traces and buckets.
#[derive(Clone)]
pub struct QueryEngine {
    store: Store,
    cfg: Config,
    cost: CostModel,
}

impl QueryEngine {
    pub fn new(store: Store, cfg: Config) -> Self {
        let cost = CostModel::new(cfg.cost.clone());
        Self { store, cfg, cost }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Full per-trace view. Accepts either a trace id or, for callers that
    /// only hold the response identifier, a correlation key that resolves to
    /// one. Malformed traces are returned marked incomplete rather than
    /// hidden.
    pub fn trace_detail(&self, trace_id: &str) -> Result<TraceDetail> {
        let mut spans = self.store.spans_for_trace(trace_id);
        let mut resolved = trace_id.to_string();
        if spans.is_empty() {
            let (keyed, _) = self.store.by_correlation_key(trace_id);
            if let Some(first) = keyed.first() {
                resolved = first.trace_id.clone();
                spans = self.store.spans_for_trace(&resolved);
            }
        }
        if spans.is_empty() {
            return Err(TraceloomError::Store(format!(
                "trace not found: {trace_id}"
            )));
        }

        let tree = TraceTree::build(&resolved, spans);
        let aggregated = metrics::aggregate(&tree, self.cfg.ticks_per_millisecond);
        let cost = self.cost.estimate_trace(&tree);
        let evaluations = match tree.correlation_key() {
            Some(key) => evaluation::summarize(&self.store.evaluations_for_key(&key)),
            None => evaluation::summarize(&[]),
        };

        let mut warnings = Vec::new();
        for span in &tree.spans {
            for field in &span.attrs.parse_errors {
                warnings.push(DataQualityWarning::NonNumericTokens {
                    span_id: span.span_id.clone(),
                    field: field.clone(),
                });
            }
        }
        for record in evaluations.records.iter().filter(|r| !r.is_valid()) {
            warnings.push(DataQualityWarning::ScoreOutOfRange {
                evaluator_name: record.evaluator_name.clone(),
                score: record.score,
            });
        }

        Ok(TraceDetail {
            trace_id: resolved,
            complete: tree.is_complete(),
            issues: tree.issues.clone(),
            warnings,
            execution_flow: tree.execution_flow(),
            span_count: aggregated.span_count,
            duration_ms: aggregated.duration_ms,
            success: aggregated.success,
            tokens: aggregated.tokens,
            cost,
            kinds: aggregated.kinds,
            evaluations,
        })
    }

    /// Summaries of the well-formed traces whose root starts in the window.
    /// Malformed traces are excluded here with a diagnostic; they remain
    /// inspectable through `trace_detail`.
    pub fn trace_summaries(&self, window: &TimeWindow) -> Vec<TraceSummary> {
        let mut out = Vec::new();
        for trace_id in self.store.trace_ids_in(window) {
            let tree = TraceTree::build(&trace_id, self.store.spans_for_trace(&trace_id));
            if !tree.is_complete() {
                warn!(
                    trace_id = %trace_id,
                    issues = ?tree.issues,
                    "excluding malformed trace from rollup"
                );
                continue;
            }
            let Some(root) = tree.root_span() else {
                continue;
            };
            let root_start = root.start_time;
            if !window.contains(root_start) {
                continue;
            }

            let aggregated = metrics::aggregate(&tree, self.cfg.ticks_per_millisecond);
            let cost = self.cost.estimate_trace(&tree);
            out.push(TraceSummary {
                trace_id,
                start_time: root_start,
                duration_ms: aggregated.duration_ms,
                success: aggregated.success,
                span_count: aggregated.span_count,
                model: aggregated.primary_model,
                tokens: aggregated.tokens,
                cost,
            });
        }

        out.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        out
    }

    pub fn rollup(&self, req: &RollupRequest) -> Result<Vec<RollupRow>> {
        check_bucket(req.bucket)?;
        match req.group_by {
            None => Ok(self.rollup_by_trace(req)),
            Some(group_by) => self.rollup_by_span(req, group_by),
        }
    }

    fn rollup_by_trace(&self, req: &RollupRequest) -> Vec<RollupRow> {
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<TraceSummary>> = BTreeMap::new();
        for summary in self.trace_summaries(&req.window) {
            buckets
                .entry(bucket_start(summary.start_time, req.bucket))
                .or_default()
                .push(summary);
        }

        buckets
            .into_iter()
            .map(|(bucket, summaries)| {
                let count = summaries.len();
                let successes = summaries.iter().filter(|s| s.success).count();
                let input = summaries.iter().map(|s| s.tokens.input).sum();
                let output = summaries.iter().map(|s| s.tokens.output).sum();
                let total: i64 = summaries.iter().map(|s| s.tokens.total).sum();
                let cost = summaries.iter().map(|s| s.cost.amount).sum::<f64>();
                RollupRow {
                    bucket_start: bucket,
                    group: None,
                    request_count: count,
                    success_rate: successes as f64 / count as f64,
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: total,
                    avg_total_tokens: total as f64 / count as f64,
                    estimated_cost: round_amount(cost),
                }
            })
            .collect()
    }

    fn rollup_by_span(&self, req: &RollupRequest, group_by: GroupBy) -> Result<Vec<RollupRow>> {
        let spans = self.store.query_range(&RangeRequest {
            window: req.window.clone(),
            filter: RecordFilter::default(),
            limit: usize::MAX,
        })?;

        let mut groups: BTreeMap<(DateTime<Utc>, String), Vec<SpanRecord>> = BTreeMap::new();
        for span in spans {
            let key = match group_by {
                GroupBy::Model => {
                    if span.kind != SpanKind::ModelCall {
                        continue;
                    }
                    span.attrs
                        .model
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string())
                }
                GroupBy::Kind => span.kind.as_str().to_string(),
            };
            groups
                .entry((bucket_start(span.start_time, req.bucket), key))
                .or_default()
                .push(span);
        }

        Ok(groups
            .into_iter()
            .map(|((bucket, group), spans)| {
                let count = spans.len();
                let successes = spans.iter().filter(|s| s.success).count();
                let input: i64 = spans.iter().filter_map(|s| s.attrs.input_tokens).sum();
                let output: i64 = spans.iter().filter_map(|s| s.attrs.output_tokens).sum();
                let total: i64 = spans
                    .iter()
                    .map(|s| {
                        s.attrs.total_tokens.unwrap_or_else(|| {
                            s.attrs.input_tokens.unwrap_or(0)
                                + s.attrs.output_tokens.unwrap_or(0)
                        })
                    })
                    .sum();
                RollupRow {
                    bucket_start: bucket,
                    group: Some(group),
                    request_count: count,
                    success_rate: successes as f64 / count as f64,
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: total,
                    avg_total_tokens: total as f64 / count as f64,
                    estimated_cost: self.cost.estimate_spans(&spans).amount,
                }
            })
            .collect())
    }

    pub fn percentiles(&self, req: &PercentileRequest) -> Result<Vec<PercentileRow>> {
        check_bucket(req.bucket)?;

        let mut buckets: BTreeMap<DateTime<Utc>, Vec<TraceSummary>> = BTreeMap::new();
        for summary in self.trace_summaries(&req.window) {
            buckets
                .entry(bucket_start(summary.start_time, req.bucket))
                .or_default()
                .push(summary);
        }

        let method = self.cfg.percentile_method;
        Ok(buckets
            .into_iter()
            .map(|(bucket, summaries)| {
                let mut durations = summaries.iter().map(|s| s.duration_ms).collect::<Vec<_>>();
                durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let successes = summaries.iter().filter(|s| s.success).count();
                PercentileRow {
                    bucket_start: bucket,
                    sample_count: durations.len(),
                    p50_ms: crate::percentile::percentile(&durations, 0.50, method),
                    p95_ms: crate::percentile::percentile(&durations, 0.95, method),
                    p99_ms: crate::percentile::percentile(&durations, 0.99, method),
                    success_rate: successes as f64 / summaries.len() as f64,
                }
            })
            .collect())
    }

    /// Average/min/max duration per span kind across the range.
    pub fn kind_breakdown(&self, window: &TimeWindow) -> Result<Vec<KindStats>> {
        let spans = self.store.query_range(&RangeRequest {
            window: window.clone(),
            filter: RecordFilter::default(),
            limit: usize::MAX,
        })?;
        Ok(metrics::kind_stats(&spans, self.cfg.ticks_per_millisecond))
    }

    pub fn slow_traces(&self, req: &SlowTracesRequest) -> Vec<TraceSummary> {
        let mut slow = self
            .trace_summaries(&req.window)
            .into_iter()
            .filter(|s| s.duration_ms > req.threshold_ms)
            .collect::<Vec<_>>();
        slow.sort_by(|a, b| {
            b.duration_ms
                .partial_cmp(&a.duration_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        slow.truncate(req.limit);
        slow
    }

    pub fn evaluator_summary(&self, window: &TimeWindow) -> Vec<EvaluatorStats> {
        let mut by_evaluator: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in self.store.evaluations_in(window) {
            if !record.is_valid() {
                continue;
            }
            by_evaluator
                .entry(record.evaluator_name.clone())
                .or_default()
                .push(record.score);
        }

        by_evaluator
            .into_iter()
            .map(|(name, scores)| evaluation::stats_for(name, &scores))
            .collect()
    }

    /// Frequency-ranked values of one typed attribute, counted per trace so
    /// a value repeated inside a single trace counts once.
    pub fn top_attribute_values(&self, req: &TopAttributesRequest) -> Result<Vec<AttributeCount>> {
        if !SpanAttrs::KEYS.contains(&req.attribute.as_str()) {
            return Err(TraceloomError::InvalidArgument(format!(
                "unknown attribute: {}",
                req.attribute
            )));
        }

        let spans = self.store.query_range(&RangeRequest {
            window: req.window.clone(),
            filter: RecordFilter::default(),
            limit: usize::MAX,
        })?;

        let mut traces_by_value: BTreeMap<String, std::collections::HashSet<String>> =
            BTreeMap::new();
        for span in spans {
            if let Some(value) = span.attrs.get(&req.attribute) {
                traces_by_value
                    .entry(value)
                    .or_default()
                    .insert(span.trace_id);
            }
        }

        let mut counts = traces_by_value
            .into_iter()
            .map(|(value, traces)| AttributeCount {
                value,
                count: traces.len(),
            })
            .collect::<Vec<_>>();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        counts.truncate(req.limit);
        Ok(counts)
    }

    /// Fixed-width histogram over trace outer durations.
    pub fn histogram(&self, req: &HistogramRequest) -> Result<Vec<HistogramBucket>> {
        if req.bin_ms <= 0.0 {
            return Err(TraceloomError::InvalidArgument(
                "histogram bin width must be positive".to_string(),
            ));
        }

        let durations = self
            .trace_summaries(&req.window)
            .into_iter()
            .map(|s| s.duration_ms)
            .collect::<Vec<_>>();
        if durations.is_empty() {
            return Ok(Vec::new());
        }

        let max = durations.iter().copied().fold(0.0_f64, f64::max);
        let last_bin = (max / req.bin_ms).floor() as usize;
        if last_bin >= 10_000 {
            return Err(TraceloomError::InvalidArgument(format!(
                "bin width {} ms produces too many bins for the observed range",
                req.bin_ms
            )));
        }

        let mut counts = vec![0usize; last_bin + 1];
        for duration in durations {
            let idx = ((duration / req.bin_ms).floor() as usize).min(last_bin);
            counts[idx] += 1;
        }

        Ok(counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBucket {
                lower_ms: i as f64 * req.bin_ms,
                upper_ms: (i + 1) as f64 * req.bin_ms,
                count,
            })
            .collect())
    }
}

fn check_bucket(bucket: std::time::Duration) -> Result<()> {
    if bucket.as_secs() == 0 {
        return Err(TraceloomError::InvalidArgument(
            "bucket size must be at least one second".to_string(),
        ));
    }
    Ok(())
}
