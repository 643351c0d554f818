use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DataQualityWarning, TraceIssue};
use crate::model::evaluation::EvaluationRecord;
use crate::model::span::SpanKind;

/// Derived aggregates are recomputed on query and owned by the caller; none
/// of the types here are ever written back to the store.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorStats {
    pub evaluator_name: String,
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub eval_count: usize,
    pub invalid_count: usize,
    /// Mean across evaluator means, so one chatty evaluator cannot skew it.
    pub avg_score: Option<f64>,
    pub evaluators: Vec<EvaluatorStats>,
    pub records: Vec<EvaluationRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input: i64,
    pub output: i64,
    pub total: i64,
    /// Token fields that were present but failed typed extraction. Excluded
    /// from the sums rather than counted as zero.
    pub parse_error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub kind: SpanKind,
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub amount: f64,
    /// Set when any contributing model was missing from the rate table and
    /// the default rate was applied.
    pub approximate: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DataQualityWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub span_count: usize,
    pub model: Option<String>,
    pub tokens: TokenTotals,
    pub cost: CostEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDetail {
    pub trace_id: String,
    pub complete: bool,
    pub issues: Vec<TraceIssue>,
    /// Record-level findings: token fields that failed typed extraction and
    /// out-of-range evaluation scores. The offending records are retained.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DataQualityWarning>,
    /// Span kinds ordered by start time, "what ran and in what order".
    pub execution_flow: Vec<SpanKind>,
    pub span_count: usize,
    pub duration_ms: f64,
    pub success: bool,
    pub tokens: TokenTotals,
    pub cost: CostEstimate,
    pub kinds: Vec<KindStats>,
    pub evaluations: EvaluationSummary,
}
