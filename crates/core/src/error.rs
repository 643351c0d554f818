use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceloomError {
    #[error("conflict: span {0} resubmitted with different content")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TraceloomError>;

/// Structural problems found while assembling a trace tree. These are
/// diagnostics, not errors: the trace is marked incomplete and kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TraceIssue {
    #[error("trace has no root span")]
    MissingRoot,

    #[error("trace has multiple root spans: {span_ids:?}")]
    MultipleRoots { span_ids: Vec<String> },

    #[error("span {span_id} references parent {parent_span_id} not present in the trace")]
    MissingParent {
        span_id: String,
        parent_span_id: String,
    },

    #[error("span {span_id} is its own ancestor")]
    Cycle { span_id: String },
}

/// Per-record quality findings. The offending value is excluded from
/// aggregates; the record itself is retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DataQualityWarning {
    #[error("span {span_id} attribute {field} is not numeric")]
    NonNumericTokens { span_id: String, field: String },

    #[error("negative {field} treated as zero")]
    NegativeTokens { field: String },

    #[error("missing {field} treated as zero")]
    MissingTokens { field: String },

    #[error("evaluator {evaluator_name} reported out-of-range score {score}")]
    ScoreOutOfRange {
        evaluator_name: String,
        score: f64,
    },
}
