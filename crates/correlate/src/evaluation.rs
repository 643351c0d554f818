use std::collections::BTreeMap;

use traceloom_core::model::evaluation::EvaluationRecord;
use traceloom_core::model::rollup::{EvaluationSummary, EvaluatorStats};

/// Summarize the evaluation records joined to one correlation key.
///
/// The join is outer: an empty slice yields an empty summary, never an
/// error. Out-of-range scores stay in the raw record list but are excluded
/// from every aggregate. Because the input only ever grows, re-running this
/// later produces a superset of the earlier result.
pub fn summarize(records: &[EvaluationRecord]) -> EvaluationSummary {
    let mut retained = records.to_vec();
    retained.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.evaluator_name.cmp(&b.evaluator_name))
    });

    let invalid_count = retained.iter().filter(|r| !r.is_valid()).count();

    let mut by_evaluator: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in retained.iter().filter(|r| r.is_valid()) {
        by_evaluator
            .entry(record.evaluator_name.clone())
            .or_default()
            .push(record.score);
    }

    let evaluators = by_evaluator
        .into_iter()
        .map(|(evaluator_name, scores)| stats_for(evaluator_name, &scores))
        .collect::<Vec<_>>();

    // Mean of per-evaluator means, so a chatty evaluator with many scores
    // carries the same weight as one that scored once.
    let avg_score = if evaluators.is_empty() {
        None
    } else {
        Some(evaluators.iter().map(|e| e.avg).sum::<f64>() / evaluators.len() as f64)
    };

    EvaluationSummary {
        eval_count: retained.len(),
        invalid_count,
        avg_score,
        evaluators,
        records: retained,
    }
}

pub fn stats_for(evaluator_name: String, scores: &[f64]) -> EvaluatorStats {
    let count = scores.len();
    let avg = scores.iter().sum::<f64>() / count as f64;
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = scores.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / count as f64;

    EvaluatorStats {
        evaluator_name,
        count,
        avg,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn record(evaluator: &str, score: f64, offset_s: i64) -> EvaluationRecord {
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        EvaluationRecord {
            correlation_key: "resp_42".into(),
            evaluator_name: evaluator.into(),
            score,
            comments: None,
            timestamp: base + Duration::seconds(offset_s),
        }
    }

    #[test]
    fn empty_input_yields_empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.eval_count, 0);
        assert_eq!(summary.invalid_count, 0);
        assert!(summary.avg_score.is_none());
        assert!(summary.evaluators.is_empty());
    }

    #[test]
    fn evaluator_mean_is_arithmetic_and_order_invariant() {
        let forward = summarize(&[
            record("relevance", 0.8, 0),
            record("relevance", 0.6, 1),
            record("relevance", 1.0, 2),
        ]);
        let reversed = summarize(&[
            record("relevance", 1.0, 2),
            record("relevance", 0.6, 1),
            record("relevance", 0.8, 0),
        ]);

        let stats = &forward.evaluators[0];
        assert!((stats.avg - 0.8).abs() < 1e-12);
        assert_eq!(stats.min, 0.6);
        assert_eq!(stats.max, 1.0);
        assert_eq!(forward.evaluators, reversed.evaluators);
        assert_eq!(forward.avg_score, reversed.avg_score);
    }

    #[test]
    fn overall_average_is_mean_of_means() {
        // relevance mean 0.5 over three scores, coherence 0.9 over one:
        // a sample-weighted mean would be 0.6, mean-of-means is 0.7.
        let summary = summarize(&[
            record("relevance", 0.4, 0),
            record("relevance", 0.5, 1),
            record("relevance", 0.6, 2),
            record("coherence", 0.9, 3),
        ]);
        assert!((summary.avg_score.unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn invalid_scores_are_retained_but_excluded() {
        let summary = summarize(&[record("relevance", 0.9, 0), record("relevance", 1.5, 1)]);
        assert_eq!(summary.eval_count, 2);
        assert_eq!(summary.invalid_count, 1);
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.evaluators[0].count, 1);
        assert_eq!(summary.evaluators[0].avg, 0.9);
    }

    #[test]
    fn stddev_is_population() {
        let summary = summarize(&[record("relevance", 0.4, 0), record("relevance", 0.8, 1)]);
        // Mean 0.6, deviations ±0.2 -> population stddev 0.2.
        assert!((summary.evaluators[0].stddev - 0.2).abs() < 1e-12);
    }

    #[test]
    fn later_run_is_a_superset_of_the_earlier() {
        let early = vec![record("relevance", 0.9, 0)];
        let mut late = early.clone();
        late.push(record("groundedness", 0.95, 180));

        let before = summarize(&early);
        let after = summarize(&late);

        assert!(after.eval_count > before.eval_count);
        for evaluator in &before.evaluators {
            assert!(
                after
                    .evaluators
                    .iter()
                    .any(|e| e.evaluator_name == evaluator.evaluator_name)
            );
        }
    }
}
