use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An asynchronous quality score joined back to its trace through the
/// secondary correlation key, typically arriving after the trace completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub correlation_key: String,
    pub evaluator_name: String,
    pub score: f64,
    pub comments: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Scores outside [0, 1] are retained but excluded from aggregates.
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.score)
    }
}
