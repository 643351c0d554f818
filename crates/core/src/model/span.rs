use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categorical tag for a recorded unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpanKind {
    Entry,
    ModelCall,
    ToolCall,
    Evaluation,
    Other(String),
}

impl SpanKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Entry => "entry",
            Self::ModelCall => "model_call",
            Self::ToolCall => "tool_call",
            Self::Evaluation => "evaluation",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for SpanKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "entry" => Self::Entry,
            "model_call" => Self::ModelCall,
            "tool_call" => Self::ToolCall,
            "evaluation" => Self::Evaluation,
            _ => Self::Other(s),
        }
    }
}

impl From<SpanKind> for String {
    fn from(kind: SpanKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of the span attribute bag. Fields that fail typed extraction
/// at ingest are listed in `parse_errors` instead of being silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanAttrs {
    pub model: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub finish_reason: Option<String>,
    pub location: Option<String>,
    pub response_id: Option<String>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_errors: Vec<String>,
}

impl SpanAttrs {
    /// The attribute keys queries may name; anything else is rejected at
    /// query time rather than silently matching nothing.
    pub const KEYS: &'static [&'static str] = &[
        "model",
        "finish_reason",
        "location",
        "response_id",
        "thread_id",
        "run_id",
        "input_tokens",
        "output_tokens",
        "total_tokens",
    ];

    /// Secondary correlation key: explicit response identifier when present,
    /// otherwise a composite of thread and run identifiers.
    pub fn correlation_key(&self) -> Option<String> {
        if let Some(id) = &self.response_id {
            return Some(id.clone());
        }
        if let (Some(thread), Some(run)) = (&self.thread_id, &self.run_id) {
            return Some(format!("thread:{thread}/run:{run}"));
        }
        None
    }

    /// String rendering of a named attribute, used by filters and top-N
    /// frequency queries. Unknown keys resolve to `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "model" => self.model.clone(),
            "finish_reason" => self.finish_reason.clone(),
            "location" => self.location.clone(),
            "response_id" => self.response_id.clone(),
            "thread_id" => self.thread_id.clone(),
            "run_id" => self.run_id.clone(),
            "input_tokens" => self.input_tokens.map(|v| v.to_string()),
            "output_tokens" => self.output_tokens.map(|v| v.to_string()),
            "total_tokens" => self.total_tokens.map(|v| v.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub kind: SpanKind,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub duration_ticks: i64,
    pub success: bool,
    pub attrs: SpanAttrs,
}

impl SpanRecord {
    /// A root span carries no parent, or names itself as parent.
    pub fn is_root(&self) -> bool {
        match &self.parent_span_id {
            None => true,
            Some(parent) => parent == &self.span_id,
        }
    }
}
