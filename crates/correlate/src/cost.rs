use std::collections::BTreeMap;

use tracing::warn;
use traceloom_core::config::{CostConfig, ModelRate};
use traceloom_core::error::DataQualityWarning;
use traceloom_core::model::rollup::CostEstimate;
use traceloom_core::model::span::{SpanKind, SpanRecord};

use crate::graph::TraceTree;

/// Converts token counts to a monetary estimate through a per-model rate
/// table. Unknown models fall back to the default rate and mark the
/// estimate approximate instead of failing.
#[derive(Debug, Clone)]
pub struct CostModel {
    rates: BTreeMap<String, ModelRate>,
    default_rate: ModelRate,
}

/// Reported amounts are rounded to four decimal places for stability.
const PRECISION: f64 = 10_000.0;

pub fn round_amount(amount: f64) -> f64 {
    (amount * PRECISION).round() / PRECISION
}

impl CostModel {
    pub fn new(cfg: CostConfig) -> Self {
        Self {
            rates: cfg.rates,
            default_rate: cfg.default_rate,
        }
    }

    fn rate_for(&self, model: Option<&str>) -> (ModelRate, bool) {
        match model.and_then(|m| self.rates.get(m)) {
            Some(rate) => (*rate, false),
            None => {
                warn!(
                    model = model.unwrap_or("<none>"),
                    "model missing from rate table; cost estimate is approximate"
                );
                (self.default_rate, true)
            }
        }
    }

    /// Single-call estimate. Null and negative counts contribute zero and
    /// record a data-quality warning.
    pub fn estimate(
        &self,
        input_tokens: Option<i64>,
        output_tokens: Option<i64>,
        model: Option<&str>,
    ) -> CostEstimate {
        let mut warnings = Vec::new();
        for (tokens, field) in [(input_tokens, "input_tokens"), (output_tokens, "output_tokens")] {
            if tokens.is_none() {
                warnings.push(DataQualityWarning::MissingTokens {
                    field: field.to_string(),
                });
            }
        }
        let input = usable_tokens(input_tokens, "input_tokens", &mut warnings);
        let output = usable_tokens(output_tokens, "output_tokens", &mut warnings);

        let (rate, approximate) = self.rate_for(model);
        let amount =
            input as f64 / 1_000.0 * rate.input_per_1k + output as f64 / 1_000.0 * rate.output_per_1k;

        CostEstimate {
            amount: round_amount(amount),
            approximate,
            warnings,
        }
    }

    /// Trace-level estimate: token counts grouped per model first, each
    /// group priced at its own rate, rounding applied once at the end so the
    /// reported figure does not drift with span count.
    pub fn estimate_trace(&self, tree: &TraceTree) -> CostEstimate {
        self.estimate_spans(&tree.spans)
    }

    /// Same pricing over an arbitrary span set; only model calls carry
    /// usage, everything else is ignored.
    pub fn estimate_spans(&self, spans: &[SpanRecord]) -> CostEstimate {
        let mut warnings = Vec::new();
        let mut groups: BTreeMap<Option<String>, (i64, i64)> = BTreeMap::new();

        for span in spans.iter().filter(|s| s.kind == SpanKind::ModelCall) {
            if span.attrs.input_tokens.is_none() && span.attrs.output_tokens.is_none() {
                warnings.push(DataQualityWarning::MissingTokens {
                    field: format!("{}: token usage", span.span_id),
                });
                continue;
            }
            let entry = groups.entry(span.attrs.model.clone()).or_default();
            entry.0 += usable_tokens(span.attrs.input_tokens, "input_tokens", &mut warnings);
            entry.1 += usable_tokens(span.attrs.output_tokens, "output_tokens", &mut warnings);
        }

        let mut amount = 0.0;
        let mut approximate = false;
        for (model, (input, output)) in groups {
            let (rate, fallback) = self.rate_for(model.as_deref());
            approximate |= fallback;
            amount +=
                input as f64 / 1_000.0 * rate.input_per_1k + output as f64 / 1_000.0 * rate.output_per_1k;
        }

        CostEstimate {
            amount: round_amount(amount),
            approximate,
            warnings,
        }
    }
}

fn usable_tokens(
    tokens: Option<i64>,
    field: &str,
    warnings: &mut Vec<DataQualityWarning>,
) -> i64 {
    match tokens {
        Some(v) if v < 0 => {
            warnings.push(DataQualityWarning::NegativeTokens {
                field: field.to_string(),
            });
            0
        }
        Some(v) => v,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use traceloom_core::config::CostConfig;
    use traceloom_core::model::span::{SpanAttrs, SpanRecord};

    use super::*;

    fn model() -> CostModel {
        CostModel::new(CostConfig::default())
    }

    fn model_call(span_id: &str, model: Option<&str>, input: Option<i64>, output: Option<i64>) -> SpanRecord {
        SpanRecord {
            trace_id: "t1".into(),
            span_id: span_id.into(),
            parent_span_id: Some("root".into()),
            kind: SpanKind::ModelCall,
            name: "openai_initial_request".into(),
            start_time: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            duration_ticks: 1_000,
            success: true,
            attrs: SpanAttrs {
                model: model.map(String::from),
                input_tokens: input,
                output_tokens: output,
                ..SpanAttrs::default()
            },
        }
    }

    fn root() -> SpanRecord {
        SpanRecord {
            parent_span_id: None,
            kind: SpanKind::Entry,
            name: "weather_chat_function".into(),
            attrs: SpanAttrs::default(),
            ..model_call("root", None, None, None)
        }
    }

    #[test]
    fn known_model_uses_table_rate() {
        let estimate = model().estimate(Some(285), Some(95), Some("gpt-4"));
        assert_eq!(estimate.amount, 0.0142);
        assert!(!estimate.approximate);
        assert!(estimate.warnings.is_empty());
    }

    #[test]
    fn unknown_model_falls_back_and_flags() {
        let estimate = model().estimate(Some(1_000), Some(1_000), Some("mystery-model"));
        assert!(estimate.approximate);
        assert_eq!(estimate.amount, 0.003);
    }

    #[test]
    fn negative_tokens_contribute_zero_with_warning() {
        let estimate = model().estimate(Some(-5), Some(100), Some("gpt-4"));
        assert_eq!(estimate.amount, 0.006);
        assert!(matches!(
            estimate.warnings[0],
            DataQualityWarning::NegativeTokens { .. }
        ));
    }

    #[test]
    fn null_tokens_contribute_zero_with_warning() {
        let estimate = model().estimate(None, Some(100), Some("gpt-4"));
        assert_eq!(estimate.amount, 0.006);
        assert!(matches!(
            estimate.warnings[0],
            DataQualityWarning::MissingTokens { .. }
        ));
    }

    #[test]
    fn cost_is_monotonic_in_token_counts() {
        let m = model();
        let base = m.estimate(Some(100), Some(100), Some("gpt-4")).amount;
        assert!(m.estimate(Some(200), Some(100), Some("gpt-4")).amount >= base);
        assert!(m.estimate(Some(100), Some(200), Some("gpt-4")).amount >= base);
    }

    #[test]
    fn trace_estimate_groups_by_model_before_rounding() {
        let tree = TraceTree::build(
            "t1",
            vec![
                root(),
                model_call("m1", Some("gpt-4"), Some(285), Some(0)),
                model_call("m2", Some("gpt-4"), Some(0), Some(95)),
            ],
        );
        let estimate = model().estimate_trace(&tree);
        // 285/1000*0.03 + 95/1000*0.06 rounded once at the end.
        assert_eq!(estimate.amount, 0.0142);
        assert!(!estimate.approximate);
    }

    #[test]
    fn model_call_without_usage_warns_but_does_not_price() {
        let tree = TraceTree::build(
            "t1",
            vec![root(), model_call("m1", Some("gpt-4"), None, None)],
        );
        let estimate = model().estimate_trace(&tree);
        assert_eq!(estimate.amount, 0.0);
        assert!(matches!(
            estimate.warnings[0],
            DataQualityWarning::MissingTokens { .. }
        ));
    }
}
