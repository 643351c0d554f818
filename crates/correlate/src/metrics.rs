use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use traceloom_core::model::rollup::{KindStats, TokenTotals};
use traceloom_core::model::span::{SpanKind, SpanRecord};
use traceloom_core::time::ticks_to_ms;

use crate::graph::TraceTree;

/// Pure fold over one trace's spans; no cross-trace state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetrics {
    pub span_count: usize,
    pub duration_ticks: i64,
    pub duration_ms: f64,
    pub success: bool,
    pub tokens: TokenTotals,
    pub kinds: Vec<KindStats>,
    /// Model of the first model call in execution order, used for grouped
    /// rollups and trace summaries.
    pub primary_model: Option<String>,
}

pub fn aggregate(tree: &TraceTree, ticks_per_ms: i64) -> TraceMetrics {
    // Parent spans enclose their children, so the trace's outer duration is
    // the longest single span, never a sum across nesting levels.
    let duration_ticks = tree
        .spans
        .iter()
        .map(|s| s.duration_ticks)
        .max()
        .unwrap_or(0);

    let success = match tree.root_span() {
        Some(root) => root.success,
        None => tree.spans.iter().all(|s| s.success),
    };

    let mut tokens = TokenTotals::default();
    for span in &tree.spans {
        if let Some(input) = span.attrs.input_tokens {
            tokens.input += input;
        }
        if let Some(output) = span.attrs.output_tokens {
            tokens.output += output;
        }
        match span.attrs.total_tokens {
            Some(total) => tokens.total += total,
            None => {
                tokens.total +=
                    span.attrs.input_tokens.unwrap_or(0) + span.attrs.output_tokens.unwrap_or(0);
            }
        }
        tokens.parse_error_count += span.attrs.parse_errors.len();
    }

    let kinds = kind_stats(&tree.spans, ticks_per_ms);

    let primary_model = tree
        .spans
        .iter()
        .filter(|s| s.kind == SpanKind::ModelCall)
        .find_map(|s| s.attrs.model.clone());

    TraceMetrics {
        span_count: tree.spans.len(),
        duration_ticks,
        duration_ms: ticks_to_ms(duration_ticks, ticks_per_ms),
        success,
        tokens,
        kinds,
        primary_model,
    }
}

/// Per-kind duration breakdown over any span set, sorted by kind name so
/// output is stable.
pub fn kind_stats(spans: &[SpanRecord], ticks_per_ms: i64) -> Vec<KindStats> {
    let mut by_kind: BTreeMap<String, (SpanKind, Vec<i64>)> = BTreeMap::new();
    for span in spans {
        by_kind
            .entry(span.kind.as_str().to_string())
            .or_insert_with(|| (span.kind.clone(), Vec::new()))
            .1
            .push(span.duration_ticks);
    }

    by_kind
        .into_values()
        .map(|(kind, durations)| {
            let total: i64 = durations.iter().sum();
            let min = durations.iter().min().copied().unwrap_or(0);
            let max = durations.iter().max().copied().unwrap_or(0);
            KindStats {
                kind,
                count: durations.len(),
                avg_ms: ticks_to_ms(total, ticks_per_ms) / durations.len() as f64,
                min_ms: ticks_to_ms(min, ticks_per_ms),
                max_ms: ticks_to_ms(max, ticks_per_ms),
                total_ms: ticks_to_ms(total, ticks_per_ms),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use traceloom_core::model::span::{SpanAttrs, SpanRecord};
    use traceloom_core::time::DEFAULT_TICKS_PER_MILLISECOND;

    use super::*;

    fn span(
        span_id: &str,
        parent: Option<&str>,
        kind: SpanKind,
        offset_ms: i64,
        duration_ticks: i64,
        attrs: SpanAttrs,
    ) -> SpanRecord {
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        SpanRecord {
            trace_id: "t1".into(),
            span_id: span_id.into(),
            parent_span_id: parent.map(String::from),
            kind,
            name: format!("op_{span_id}"),
            start_time: base + Duration::milliseconds(offset_ms),
            duration_ticks,
            success: true,
            attrs,
        }
    }

    fn model_attrs(model: &str, input: Option<i64>, output: Option<i64>) -> SpanAttrs {
        SpanAttrs {
            model: Some(model.into()),
            input_tokens: input,
            output_tokens: output,
            ..SpanAttrs::default()
        }
    }

    #[test]
    fn outer_duration_is_max_not_sum() {
        let tree = TraceTree::build(
            "t1",
            vec![
                span("root", None, SpanKind::Entry, 0, 21_505_000, SpanAttrs::default()),
                span(
                    "m1",
                    Some("root"),
                    SpanKind::ModelCall,
                    10,
                    9_000_000,
                    model_attrs("gpt-4", Some(285), Some(0)),
                ),
            ],
        );

        let metrics = aggregate(&tree, DEFAULT_TICKS_PER_MILLISECOND);
        assert_eq!(metrics.duration_ticks, 21_505_000);
        assert_eq!(metrics.duration_ms, 2150.5);
    }

    #[test]
    fn token_totals_sum_across_children() {
        let tree = TraceTree::build(
            "t1",
            vec![
                span("root", None, SpanKind::Entry, 0, 21_505_000, SpanAttrs::default()),
                span(
                    "m1",
                    Some("root"),
                    SpanKind::ModelCall,
                    10,
                    9_000_000,
                    model_attrs("gpt-4", Some(285), Some(0)),
                ),
                span(
                    "tool",
                    Some("root"),
                    SpanKind::ToolCall,
                    900,
                    1_000_000,
                    SpanAttrs::default(),
                ),
                span(
                    "m2",
                    Some("root"),
                    SpanKind::ModelCall,
                    1_100,
                    8_000_000,
                    model_attrs("gpt-4", Some(0), Some(95)),
                ),
            ],
        );

        let metrics = aggregate(&tree, DEFAULT_TICKS_PER_MILLISECOND);
        assert_eq!(metrics.tokens.input, 285);
        assert_eq!(metrics.tokens.output, 95);
        assert_eq!(metrics.tokens.total, 380);
        assert_eq!(metrics.tokens.parse_error_count, 0);
        assert_eq!(metrics.primary_model.as_deref(), Some("gpt-4"));
    }

    #[test]
    fn explicit_total_field_wins_over_derived() {
        let attrs = SpanAttrs {
            model: Some("gpt-4".into()),
            input_tokens: Some(100),
            output_tokens: Some(50),
            total_tokens: Some(150),
            ..SpanAttrs::default()
        };
        let tree = TraceTree::build(
            "t1",
            vec![span("root", None, SpanKind::ModelCall, 0, 1_000, attrs)],
        );
        let metrics = aggregate(&tree, DEFAULT_TICKS_PER_MILLISECOND);
        assert_eq!(metrics.tokens.total, 150);
    }

    #[test]
    fn parse_errors_are_counted_not_zeroed() {
        let attrs = SpanAttrs {
            model: Some("gpt-4".into()),
            input_tokens: None,
            parse_errors: vec!["gen_ai.usage.input_tokens".into()],
            ..SpanAttrs::default()
        };
        let tree = TraceTree::build(
            "t1",
            vec![span("root", None, SpanKind::ModelCall, 0, 1_000, attrs)],
        );
        let metrics = aggregate(&tree, DEFAULT_TICKS_PER_MILLISECOND);
        assert_eq!(metrics.tokens.input, 0);
        assert_eq!(metrics.tokens.parse_error_count, 1);
    }

    #[test]
    fn per_kind_breakdown_reports_avg_min_max() {
        let tree = TraceTree::build(
            "t1",
            vec![
                span("root", None, SpanKind::Entry, 0, 20_000, SpanAttrs::default()),
                span(
                    "a",
                    Some("root"),
                    SpanKind::ModelCall,
                    1,
                    10_000,
                    SpanAttrs::default(),
                ),
                span(
                    "b",
                    Some("root"),
                    SpanKind::ModelCall,
                    2,
                    30_000,
                    SpanAttrs::default(),
                ),
            ],
        );

        let metrics = aggregate(&tree, DEFAULT_TICKS_PER_MILLISECOND);
        let model = metrics
            .kinds
            .iter()
            .find(|k| k.kind == SpanKind::ModelCall)
            .unwrap();
        assert_eq!(model.count, 2);
        assert_eq!(model.min_ms, 1.0);
        assert_eq!(model.max_ms, 3.0);
        assert_eq!(model.avg_ms, 2.0);
    }

    #[test]
    fn success_follows_root_outcome() {
        let mut failing_root = span(
            "root",
            None,
            SpanKind::Entry,
            0,
            1_000,
            SpanAttrs::default(),
        );
        failing_root.success = false;
        let child = span(
            "m1",
            Some("root"),
            SpanKind::ModelCall,
            1,
            500,
            SpanAttrs::default(),
        );

        let tree = TraceTree::build("t1", vec![failing_root, child]);
        let metrics = aggregate(&tree, DEFAULT_TICKS_PER_MILLISECOND);
        assert!(!metrics.success);
    }
}
