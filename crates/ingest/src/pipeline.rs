use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;
use traceloom_store::{Appended, Store};

use crate::decode::{RawEvaluation, RawSpan, decode_evaluation, decode_span, evaluation_from_span};

/// Batched async ingestion: producers hand over raw records, writers decode
/// and append on a size or interval trigger. Conflicts are logged per
/// record and never stall the batch.
#[derive(Clone)]
pub struct Pipeline {
    spans_tx: mpsc::Sender<Vec<RawSpan>>,
    evals_tx: mpsc::Sender<Vec<RawEvaluation>>,
}

pub struct PipelineConfig {
    pub channel_capacity: usize,
    pub flush_interval: Duration,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            flush_interval: Duration::from_millis(200),
            batch_size: 2048,
        }
    }
}

impl Pipeline {
    pub fn new(store: Store, cfg: PipelineConfig) -> Self {
        let (spans_tx, spans_rx) = mpsc::channel(cfg.channel_capacity);
        let (evals_tx, evals_rx) = mpsc::channel(cfg.channel_capacity);

        tokio::spawn(run_span_writer(
            store.clone(),
            spans_rx,
            cfg.batch_size,
            cfg.flush_interval,
        ));
        tokio::spawn(run_evaluation_writer(
            store,
            evals_rx,
            cfg.batch_size,
            cfg.flush_interval,
        ));

        Self { spans_tx, evals_tx }
    }

    pub async fn submit_spans(&self, spans: Vec<RawSpan>) {
        if self.spans_tx.send(spans).await.is_err() {
            warn!("span pipeline dropped batch: receiver closed");
        }
    }

    pub async fn submit_evaluations(&self, evaluations: Vec<RawEvaluation>) {
        if self.evals_tx.send(evaluations).await.is_err() {
            warn!("evaluation pipeline dropped batch: receiver closed");
        }
    }
}

async fn run_span_writer(
    store: Store,
    mut rx: mpsc::Receiver<Vec<RawSpan>>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    let mut buffer = Vec::new();
    loop {
        tokio::select! {
            Some(batch) = rx.recv() => {
                buffer.extend(batch);
                if buffer.len() >= batch_size {
                    flush_spans(&store, &mut buffer);
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_spans(&store, &mut buffer);
                }
            }
            else => break,
        }
    }
}

async fn run_evaluation_writer(
    store: Store,
    mut rx: mpsc::Receiver<Vec<RawEvaluation>>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    let mut buffer = Vec::new();
    loop {
        tokio::select! {
            Some(batch) = rx.recv() => {
                buffer.extend(batch);
                if buffer.len() >= batch_size {
                    flush_evaluations(&store, &mut buffer);
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_evaluations(&store, &mut buffer);
                }
            }
            else => break,
        }
    }
}

fn flush_spans(store: &Store, buffer: &mut Vec<RawSpan>) {
    for raw in buffer.drain(..) {
        match store.append(decode_span(&raw)) {
            // Lower only on first insert; a duplicate must not double-count
            // the score it carries.
            Ok(Appended::Inserted) => {
                if let Some(record) = evaluation_from_span(&raw)
                    && let Err(e) = store.append_evaluation(record)
                {
                    warn!(error = %e, "failed to lower evaluation span");
                }
            }
            Ok(Appended::Duplicate) => {}
            Err(e) => warn!(error = %e, span_id = %raw.span_id, "dropped span from batch"),
        }
    }
}

fn flush_evaluations(store: &Store, buffer: &mut Vec<RawEvaluation>) {
    for raw in buffer.drain(..) {
        if let Err(e) = store.append_evaluation(decode_evaluation(&raw)) {
            warn!(error = %e, "failed to write evaluation record");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::decode::keys;

    fn raw_span(span_id: &str) -> RawSpan {
        RawSpan {
            trace_id: "t1".into(),
            span_id: span_id.into(),
            parent_span_id: None,
            kind: "entry".into(),
            name: "weather_chat_function".into(),
            start_time: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            duration_ticks: 21_505_000,
            success: true,
            attributes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn pipeline_writes_spans() {
        let store = Store::new();
        let pipeline = Pipeline::new(
            store.clone(),
            PipelineConfig {
                channel_capacity: 8,
                flush_interval: Duration::from_millis(10),
                batch_size: 4,
            },
        );

        pipeline.submit_spans(vec![raw_span("s1")]).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.status().spans_count, 1);
    }

    #[tokio::test]
    async fn pipeline_flushes_on_batch_size() {
        let store = Store::new();
        let pipeline = Pipeline::new(
            store.clone(),
            PipelineConfig {
                channel_capacity: 8,
                flush_interval: Duration::from_secs(5),
                batch_size: 2,
            },
        );

        pipeline
            .submit_spans(vec![raw_span("s1"), raw_span("s2")])
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.status().spans_count, 2);
    }

    #[tokio::test]
    async fn evaluation_spans_are_lowered_during_flush() {
        let store = Store::new();
        let pipeline = Pipeline::new(
            store.clone(),
            PipelineConfig {
                channel_capacity: 8,
                flush_interval: Duration::from_millis(10),
                batch_size: 16,
            },
        );

        let mut eval_span = raw_span("e1");
        eval_span.kind = "evaluation".into();
        eval_span.name = "gen_ai.evaluation.relevance".into();
        eval_span.attributes = HashMap::from([
            (keys::EVALUATION_SCORE.to_string(), json!(0.9)),
            (keys::RESPONSE_ID.to_string(), json!("resp_42")),
        ]);
        pipeline.submit_spans(vec![eval_span]).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let (_, evals) = store.by_correlation_key("resp_42");
        assert_eq!(evals.len(), 1);
        assert_eq!(evals[0].evaluator_name, "relevance");
    }

    #[tokio::test]
    async fn duplicate_spans_in_batch_do_not_block_others() {
        let store = Store::new();
        let pipeline = Pipeline::new(
            store.clone(),
            PipelineConfig {
                channel_capacity: 8,
                flush_interval: Duration::from_millis(10),
                batch_size: 16,
            },
        );

        pipeline
            .submit_spans(vec![raw_span("s1"), raw_span("s1"), raw_span("s2")])
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.status().spans_count, 2);
    }
}
