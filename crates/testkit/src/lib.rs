use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use traceloom_ingest::decode::keys;
use traceloom_ingest::{RawEvaluation, RawSpan};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

pub fn unique_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// One weather-chat request the way the instrumented handler emits it: an
/// entry span fanning out into a model call that picks the tool, the tool
/// call itself and a final model call producing the answer.
pub fn sample_trace(trace_id: &str, response_id: &str) -> Vec<RawSpan> {
    let base = base_time();
    vec![
        RawSpan {
            trace_id: trace_id.to_string(),
            span_id: format!("{trace_id}/root"),
            parent_span_id: None,
            kind: "entry".to_string(),
            name: "weather_chat_function".to_string(),
            start_time: base,
            duration_ticks: 21_505_000,
            success: true,
            attributes: HashMap::from([
                (keys::RESPONSE_ID.to_string(), json!(response_id)),
                (keys::LOCATION.to_string(), json!("Dubai")),
            ]),
        },
        RawSpan {
            trace_id: trace_id.to_string(),
            span_id: format!("{trace_id}/initial"),
            parent_span_id: Some(format!("{trace_id}/root")),
            kind: "model_call".to_string(),
            name: "openai_initial_request".to_string(),
            start_time: base + Duration::milliseconds(12),
            duration_ticks: 9_000_000,
            success: true,
            attributes: HashMap::from([
                (keys::MODEL.to_string(), json!("gpt-4")),
                (keys::INPUT_TOKENS.to_string(), json!(285)),
                (keys::OUTPUT_TOKENS.to_string(), json!(0)),
                (keys::FINISH_REASON.to_string(), json!("tool_calls")),
                (keys::RESPONSE_ID.to_string(), json!(response_id)),
            ]),
        },
        RawSpan {
            trace_id: trace_id.to_string(),
            span_id: format!("{trace_id}/tool"),
            parent_span_id: Some(format!("{trace_id}/root")),
            kind: "tool_call".to_string(),
            name: "get_weather_api_call".to_string(),
            start_time: base + Duration::milliseconds(950),
            duration_ticks: 1_200_000,
            success: true,
            attributes: HashMap::from([(keys::LOCATION.to_string(), json!("Dubai"))]),
        },
        RawSpan {
            trace_id: trace_id.to_string(),
            span_id: format!("{trace_id}/final"),
            parent_span_id: Some(format!("{trace_id}/root")),
            kind: "model_call".to_string(),
            name: "openai_final_request".to_string(),
            start_time: base + Duration::milliseconds(1_100),
            duration_ticks: 8_400_000,
            success: true,
            attributes: HashMap::from([
                (keys::MODEL.to_string(), json!("gpt-4")),
                (keys::INPUT_TOKENS.to_string(), json!(0)),
                (keys::OUTPUT_TOKENS.to_string(), json!(95)),
                (keys::FINISH_REASON.to_string(), json!("stop")),
                (keys::RESPONSE_ID.to_string(), json!(response_id)),
            ]),
        },
    ]
}

/// The scores the async evaluators report for one response, a few minutes
/// after the trace itself completed.
pub fn sample_evaluations(response_id: &str) -> Vec<RawEvaluation> {
    let scored_at = base_time() + Duration::seconds(183);
    vec![
        RawEvaluation {
            correlation_key: response_id.to_string(),
            evaluator_name: "relevance".to_string(),
            score: 0.9,
            comments: Some("Response addresses the user's query".to_string()),
            timestamp: scored_at,
        },
        RawEvaluation {
            correlation_key: response_id.to_string(),
            evaluator_name: "coherence".to_string(),
            score: 0.85,
            comments: Some("Response is well-structured".to_string()),
            timestamp: scored_at + Duration::seconds(1),
        },
        RawEvaluation {
            correlation_key: response_id.to_string(),
            evaluator_name: "groundedness".to_string(),
            score: 0.95,
            comments: Some("Response is based on retrieved data".to_string()),
            timestamp: scored_at + Duration::seconds(2),
        },
    ]
}
