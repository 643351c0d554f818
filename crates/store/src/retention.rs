use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use traceloom_core::error::{Result, TraceloomError};

use crate::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub spans_removed: usize,
    pub evaluations_removed: usize,
}

impl Store {
    /// Drop spans older than `ttl` and evaluation records older than
    /// `ttl + late_arrival`, keeping scores joinable for the late-arrival
    /// window after their trace has aged out.
    pub fn run_retention(&self, ttl: Duration, late_arrival: Duration) -> Result<RetentionReport> {
        let spans_removed = self.prune_spans(ttl)?;
        let evaluations_removed = self.prune_evaluations(ttl + late_arrival)?;
        Ok(RetentionReport {
            spans_removed,
            evaluations_removed,
        })
    }

    pub fn prune_spans(&self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|e| TraceloomError::Internal(format!("ttl conversion failed: {e}")))?;

        let expired = self
            .spans
            .iter()
            .filter(|entry| entry.value().start_time < cutoff)
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();

        for span_id in &expired {
            self.spans.remove(span_id);
        }

        self.traces.retain(|_, ids| {
            ids.retain(|id| self.spans.contains_key(id));
            !ids.is_empty()
        });
        self.corr_spans.retain(|_, ids| {
            ids.retain(|id| self.spans.contains_key(id));
            !ids.is_empty()
        });

        Ok(expired.len())
    }

    pub fn prune_evaluations(&self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|e| TraceloomError::Internal(format!("ttl conversion failed: {e}")))?;

        let mut removed = 0;
        self.evaluations.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.timestamp >= cutoff);
            removed += before - records.len();
            !records.is_empty()
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use traceloom_core::model::evaluation::EvaluationRecord;
    use traceloom_core::model::span::{SpanAttrs, SpanKind, SpanRecord};

    use crate::Store;

    #[test]
    fn ttl_prunes_old_spans_and_indexes() {
        let store = Store::new();
        store
            .append(SpanRecord {
                trace_id: "t1".into(),
                span_id: "s1".into(),
                parent_span_id: None,
                kind: SpanKind::Entry,
                name: "old".into(),
                start_time: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
                duration_ticks: 0,
                success: true,
                attrs: SpanAttrs {
                    response_id: Some("resp_old".into()),
                    ..SpanAttrs::default()
                },
            })
            .unwrap();

        let removed = store.prune_spans(Duration::from_secs(60)).unwrap();
        assert_eq!(removed, 1);

        let status = store.status();
        assert_eq!(status.spans_count, 0);
        assert_eq!(status.traces_count, 0);
        let (spans, _) = store.by_correlation_key("resp_old");
        assert!(spans.is_empty());
    }

    #[test]
    fn recent_records_survive_retention() {
        let store = Store::new();
        store
            .append_evaluation(EvaluationRecord {
                correlation_key: "resp_1".into(),
                evaluator_name: "relevance".into(),
                score: 0.9,
                comments: None,
                timestamp: Utc::now(),
            })
            .unwrap();

        let report = store
            .run_retention(Duration::from_secs(3600), Duration::from_secs(300))
            .unwrap();
        assert_eq!(report.evaluations_removed, 0);
        assert_eq!(store.status().evaluations_count, 1);
    }

    #[test]
    fn evaluations_outlive_spans_by_the_late_window() {
        let store = Store::new();
        let old = Utc::now() - chrono::Duration::seconds(90);
        store
            .append_evaluation(EvaluationRecord {
                correlation_key: "resp_1".into(),
                evaluator_name: "coherence".into(),
                score: 0.8,
                comments: None,
                timestamp: old,
            })
            .unwrap();

        // 60s ttl alone would prune it; the 60s late window keeps it.
        let report = store
            .run_retention(Duration::from_secs(60), Duration::from_secs(60))
            .unwrap();
        assert_eq!(report.evaluations_removed, 0);

        let report = store
            .run_retention(Duration::from_secs(60), Duration::from_secs(0))
            .unwrap();
        assert_eq!(report.evaluations_removed, 1);
    }
}
