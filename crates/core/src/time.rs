use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, TraceloomError};

/// Durations are recorded in a fixed tick unit: 10,000 ticks = 1 millisecond.
pub const DEFAULT_TICKS_PER_MILLISECOND: i64 = 10_000;

pub fn ticks_to_ms(ticks: i64, ticks_per_ms: i64) -> f64 {
    ticks as f64 / ticks_per_ms as f64
}

pub fn ticks_to_secs(ticks: i64, ticks_per_ms: i64) -> f64 {
    ticks_to_ms(ticks, ticks_per_ms) / 1_000.0
}

pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(Utc::now()
            - chrono::Duration::from_std(duration).map_err(|e| {
                TraceloomError::Parse(format!("failed to parse duration to chrono: {e}"))
            })?);
    }

    Err(TraceloomError::Parse(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| TraceloomError::Parse(format!("invalid duration {input}: {e}")))
}

/// Floor a timestamp to the start of its bucket, aligned to epoch time so
/// hourly buckets land on the hour.
pub fn bucket_start(ts: DateTime<Utc>, bucket: Duration) -> DateTime<Utc> {
    let size = (bucket.as_secs() as i64).max(1);
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(size);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}
