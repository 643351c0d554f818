use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::{RecordFilter, TimeWindow};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Model,
    Kind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupRequest {
    pub window: TimeWindow,
    pub bucket: Duration,
    pub group_by: Option<GroupBy>,
}

impl Default for RollupRequest {
    fn default() -> Self {
        Self {
            window: TimeWindow::all(),
            bucket: Duration::from_secs(3600),
            group_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollupRow {
    pub bucket_start: DateTime<Utc>,
    /// Group key when grouping was requested ("gpt-4", "tool_call"), absent
    /// for plain per-bucket rows.
    pub group: Option<String>,
    pub request_count: usize,
    pub success_rate: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub avg_total_tokens: f64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileRequest {
    pub window: TimeWindow,
    pub bucket: Duration,
}

impl Default for PercentileRequest {
    fn default() -> Self {
        Self {
            window: TimeWindow::all(),
            bucket: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PercentileRow {
    pub bucket_start: DateTime<Utc>,
    pub sample_count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowTracesRequest {
    pub window: TimeWindow,
    pub threshold_ms: f64,
    pub limit: usize,
}

impl Default for SlowTracesRequest {
    fn default() -> Self {
        Self {
            window: TimeWindow::all(),
            threshold_ms: 1_000.0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopAttributesRequest {
    pub window: TimeWindow,
    pub attribute: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeCount {
    pub value: String,
    /// Number of distinct traces carrying the value.
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramRequest {
    pub window: TimeWindow,
    pub bin_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistogramBucket {
    pub lower_ms: f64,
    pub upper_ms: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeRequest {
    pub window: TimeWindow,
    pub filter: RecordFilter,
    pub limit: usize,
}

impl Default for RangeRequest {
    fn default() -> Self {
        Self {
            window: TimeWindow::all(),
            filter: RecordFilter::default(),
            limit: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub spans_count: usize,
    pub traces_count: usize,
    pub evaluations_count: usize,
    pub oldest_ts: Option<DateTime<Utc>>,
    pub newest_ts: Option<DateTime<Utc>>,
}
