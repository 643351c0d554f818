use async_stream::stream;
use chrono::Duration;
use futures::Stream;
use traceloom_core::error::Result;
use traceloom_core::filter::TimeWindow;
use traceloom_core::query::{RollupRequest, RollupRow};
use traceloom_core::time::bucket_start;

use crate::QueryEngine;

/// Chunked rollup over a long range: one item per bucket, so callers can
/// consume output incrementally instead of waiting for the whole range.
/// Open window edges are resolved against the store's oldest and newest
/// records at call time.
pub fn rollup_stream(
    engine: QueryEngine,
    req: RollupRequest,
) -> impl Stream<Item = Result<Vec<RollupRow>>> {
    stream! {
        let status = engine.store().status();
        let Some(since) = req.window.since.or(status.oldest_ts) else {
            return;
        };
        let Some(until) = req.window.until.or(status.newest_ts) else {
            return;
        };
        if until < since {
            return;
        }

        let step = Duration::seconds(req.bucket.as_secs().max(1) as i64);
        let mut cursor = bucket_start(since, req.bucket);
        while cursor <= until {
            let bucket_window = TimeWindow::between(
                cursor.max(since),
                (cursor + step - Duration::nanoseconds(1)).min(until),
            );
            let chunk = engine.rollup(&RollupRequest {
                window: bucket_window,
                bucket: req.bucket,
                group_by: req.group_by,
            });
            yield chunk;
            cursor += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{TimeZone, Utc};
    use futures::{StreamExt, pin_mut};
    use traceloom_core::config::Config;
    use traceloom_core::model::span::{SpanAttrs, SpanKind, SpanRecord};
    use traceloom_store::Store;

    use super::*;

    fn root(trace_id: &str, offset_min: i64) -> SpanRecord {
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        SpanRecord {
            trace_id: trace_id.into(),
            span_id: format!("{trace_id}/root"),
            parent_span_id: None,
            kind: SpanKind::Entry,
            name: "weather_chat_function".into(),
            start_time: base + chrono::Duration::minutes(offset_min),
            duration_ticks: 10_000_000,
            success: true,
            attrs: SpanAttrs::default(),
        }
    }

    #[tokio::test]
    async fn streams_one_chunk_per_bucket() {
        let store = Store::new();
        store.append(root("t1", 0)).unwrap();
        store.append(root("t2", 10)).unwrap();
        store.append(root("t3", 70)).unwrap();
        let engine = QueryEngine::new(store, Config::default());

        let s = rollup_stream(engine, RollupRequest::default());
        pin_mut!(s);

        let mut chunks = Vec::new();
        while let Some(chunk) = s.next().await {
            chunks.push(chunk.unwrap());
        }

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(chunks[0][0].request_count, 2);
        assert_eq!(chunks[1][0].request_count, 1);
    }

    #[tokio::test]
    async fn empty_store_yields_nothing() {
        let engine = QueryEngine::new(Store::new(), Config::default());
        let s = rollup_stream(engine, RollupRequest::default());
        pin_mut!(s);
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn chunked_rows_match_single_shot_rollup() {
        let store = Store::new();
        store.append(root("t1", 0)).unwrap();
        store.append(root("t2", 70)).unwrap();
        let engine = QueryEngine::new(store, Config::default());

        let whole = engine.rollup(&RollupRequest::default()).unwrap();

        let s = rollup_stream(engine, RollupRequest::default());
        pin_mut!(s);
        let mut streamed = Vec::new();
        while let Some(chunk) = s.next().await {
            streamed.extend(chunk.unwrap());
        }

        assert_eq!(whole, streamed);
    }

    #[tokio::test]
    async fn zero_bucket_surfaces_the_error() {
        let store = Store::new();
        store.append(root("t1", 0)).unwrap();
        let engine = QueryEngine::new(store, Config::default());

        let s = rollup_stream(
            engine,
            RollupRequest {
                bucket: StdDuration::from_secs(0),
                ..RollupRequest::default()
            },
        );
        pin_mut!(s);
        let first = s.next().await.unwrap();
        assert!(first.is_err());
    }
}
