use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use traceloom_core::model::evaluation::EvaluationRecord;
use traceloom_core::model::span::{SpanAttrs, SpanKind, SpanRecord};

/// Attribute keys as emitted by instrumented gen-AI request handlers.
pub mod keys {
    pub const MODEL: &str = "gen_ai.request.model";
    pub const MODEL_FALLBACK: &str = "model";
    pub const INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
    pub const OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
    pub const TOTAL_TOKENS: &str = "gen_ai.usage.total_tokens";
    pub const FINISH_REASON: &str = "gen_ai.response.finish_reason";
    pub const FINISH_REASON_FALLBACK: &str = "response.finish_reason";
    pub const RESPONSE_ID: &str = "gen_ai.response.id";
    pub const THREAD_ID: &str = "gen_ai.thread.id";
    pub const RUN_ID: &str = "gen_ai.thread.run.id";
    pub const LOCATION: &str = "location";
    pub const EVALUATOR_NAME: &str = "gen_ai.evaluator.name";
    pub const EVALUATION_SCORE: &str = "gen_ai.evaluation.score";
    pub const EVALUATION_SPAN_PREFIX: &str = "gen_ai.evaluation.";
}

/// A span as emitted on the wire: identity and timing plus an open
/// attribute bag. `decode_span` lowers the bag into the typed schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub kind: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub duration_ticks: i64,
    pub success: bool,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvaluation {
    pub correlation_key: String,
    pub evaluator_name: String,
    pub score: f64,
    #[serde(default)]
    pub comments: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Typed extraction happens here, at ingestion, so malformed fields are
/// caught once instead of surfacing at query time. A field that fails
/// extraction lands in `parse_errors`; the span itself is always accepted.
pub fn decode_span(raw: &RawSpan) -> SpanRecord {
    let mut parse_errors = Vec::new();

    let attrs = SpanAttrs {
        model: string_attr(raw, keys::MODEL, &mut parse_errors)
            .or_else(|| string_attr(raw, keys::MODEL_FALLBACK, &mut parse_errors)),
        input_tokens: token_attr(raw, keys::INPUT_TOKENS, &mut parse_errors),
        output_tokens: token_attr(raw, keys::OUTPUT_TOKENS, &mut parse_errors),
        total_tokens: token_attr(raw, keys::TOTAL_TOKENS, &mut parse_errors),
        finish_reason: string_attr(raw, keys::FINISH_REASON, &mut parse_errors)
            .or_else(|| string_attr(raw, keys::FINISH_REASON_FALLBACK, &mut parse_errors)),
        location: string_attr(raw, keys::LOCATION, &mut parse_errors),
        response_id: string_attr(raw, keys::RESPONSE_ID, &mut parse_errors),
        thread_id: string_attr(raw, keys::THREAD_ID, &mut parse_errors),
        run_id: string_attr(raw, keys::RUN_ID, &mut parse_errors),
        parse_errors,
    };

    SpanRecord {
        trace_id: raw.trace_id.clone(),
        span_id: raw.span_id.clone(),
        parent_span_id: raw.parent_span_id.clone(),
        kind: SpanKind::from(raw.kind.clone()),
        name: raw.name.clone(),
        start_time: raw.start_time,
        duration_ticks: raw.duration_ticks,
        success: raw.success,
        attrs,
    }
}

pub fn decode_evaluation(raw: &RawEvaluation) -> EvaluationRecord {
    EvaluationRecord {
        correlation_key: raw.correlation_key.clone(),
        evaluator_name: raw.evaluator_name.clone(),
        score: raw.score,
        comments: raw.comments.clone(),
        timestamp: raw.timestamp,
    }
}

/// Evaluation spans carry their score in the attribute bag
/// (`gen_ai.evaluation.relevance` with a score and evaluator name). Lower
/// them into evaluation records so both emission styles join identically.
pub fn evaluation_from_span(raw: &RawSpan) -> Option<EvaluationRecord> {
    if SpanKind::from(raw.kind.clone()) != SpanKind::Evaluation {
        return None;
    }

    let score = raw
        .attributes
        .get(keys::EVALUATION_SCORE)
        .and_then(Value::as_f64)?;

    let mut sink = Vec::new();
    let evaluator_name = string_attr(raw, keys::EVALUATOR_NAME, &mut sink).or_else(|| {
        raw.name
            .strip_prefix(keys::EVALUATION_SPAN_PREFIX)
            .map(String::from)
    })?;

    let correlation_key = string_attr(raw, keys::RESPONSE_ID, &mut sink).or_else(|| {
        let thread = string_attr(raw, keys::THREAD_ID, &mut sink)?;
        let run = string_attr(raw, keys::RUN_ID, &mut sink)?;
        Some(format!("thread:{thread}/run:{run}"))
    })?;

    Some(EvaluationRecord {
        correlation_key,
        evaluator_name,
        score,
        comments: None,
        timestamp: raw.start_time,
    })
}

fn string_attr(raw: &RawSpan, key: &str, parse_errors: &mut Vec<String>) -> Option<String> {
    match raw.attributes.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => {
            warn!(
                span_id = %raw.span_id,
                key,
                value = %other,
                "attribute is not a scalar"
            );
            parse_errors.push(key.to_string());
            None
        }
    }
}

fn token_attr(raw: &RawSpan, key: &str, parse_errors: &mut Vec<String>) -> Option<i64> {
    let value = raw.attributes.get(key)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Null => return None,
        _ => None,
    };

    if parsed.is_none() {
        warn!(
            span_id = %raw.span_id,
            key,
            value = %value,
            "token attribute is not numeric; excluded from sums"
        );
        parse_errors.push(key.to_string());
    }
    parsed
}
