use futures::Stream;
use traceloom_core::config::Config;
use traceloom_core::error::Result;
use traceloom_core::filter::TimeWindow;
use traceloom_core::model::rollup::{EvaluatorStats, KindStats, TraceDetail, TraceSummary};
use traceloom_core::model::span::SpanRecord;
use traceloom_core::query::{
    AttributeCount, HistogramBucket, HistogramRequest, PercentileRequest, PercentileRow,
    RollupRequest, RollupRow, SlowTracesRequest, StatusResponse, TopAttributesRequest,
};
use traceloom_ingest::decode::{decode_evaluation, decode_span, evaluation_from_span};
use traceloom_ingest::{Pipeline, PipelineConfig, RawEvaluation, RawSpan};
use traceloom_rollup::QueryEngine;
use traceloom_rollup::stream::rollup_stream;
use traceloom_store::retention::RetentionReport;
use traceloom_store::{Appended, Store};

/// The engine facade: span/evaluation ingestion on one side, rollup queries
/// on the other. Cloning is cheap and clones share the same store.
#[derive(Clone)]
pub struct Engine {
    store: Store,
    query: QueryEngine,
    cfg: Config,
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        Self::with_store(Store::new(), cfg)
    }

    pub fn with_store(store: Store, cfg: Config) -> Self {
        let query = QueryEngine::new(store.clone(), cfg.clone());
        Self { store, query, cfg }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Decode and append one span. Evaluation spans are additionally lowered
    /// into evaluation records, but only on first insert so re-submission
    /// stays a strict no-op.
    pub fn submit_span(&self, raw: &RawSpan) -> Result<Appended> {
        let appended = self.store.append(decode_span(raw))?;
        if appended == Appended::Inserted
            && let Some(record) = evaluation_from_span(raw)
        {
            self.store.append_evaluation(record)?;
        }
        Ok(appended)
    }

    /// Append a pre-typed span record.
    pub fn submit_span_record(&self, span: SpanRecord) -> Result<Appended> {
        self.store.append(span)
    }

    pub fn submit_evaluation(&self, raw: &RawEvaluation) -> Result<()> {
        self.store.append_evaluation(decode_evaluation(raw))
    }

    /// Batched async ingestion sharing this engine's store.
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(PipelineConfig::default())
    }

    pub fn pipeline_with(&self, cfg: PipelineConfig) -> Pipeline {
        Pipeline::new(self.store.clone(), cfg)
    }

    pub fn trace_detail(&self, trace_id: &str) -> Result<TraceDetail> {
        self.query.trace_detail(trace_id)
    }

    pub fn trace_summaries(&self, window: &TimeWindow) -> Vec<TraceSummary> {
        self.query.trace_summaries(window)
    }

    pub fn rollup(&self, req: &RollupRequest) -> Result<Vec<RollupRow>> {
        self.query.rollup(req)
    }

    /// Per-bucket chunks of the same rollup, for long ranges consumed
    /// incrementally.
    pub fn rollup_chunks(
        &self,
        req: RollupRequest,
    ) -> impl Stream<Item = Result<Vec<RollupRow>>> + use<> {
        rollup_stream(self.query.clone(), req)
    }

    pub fn percentiles(&self, req: &PercentileRequest) -> Result<Vec<PercentileRow>> {
        self.query.percentiles(req)
    }

    pub fn kind_breakdown(&self, window: &TimeWindow) -> Result<Vec<KindStats>> {
        self.query.kind_breakdown(window)
    }

    pub fn slow_traces(&self, req: &SlowTracesRequest) -> Vec<TraceSummary> {
        self.query.slow_traces(req)
    }

    pub fn evaluator_summary(&self, window: &TimeWindow) -> Vec<EvaluatorStats> {
        self.query.evaluator_summary(window)
    }

    pub fn top_attribute_values(&self, req: &TopAttributesRequest) -> Result<Vec<AttributeCount>> {
        self.query.top_attribute_values(req)
    }

    pub fn histogram(&self, req: &HistogramRequest) -> Result<Vec<HistogramBucket>> {
        self.query.histogram(req)
    }

    pub fn status(&self) -> StatusResponse {
        self.store.status()
    }

    /// Apply the configured retention: spans age out after the TTL,
    /// evaluation records after the TTL plus the late-arrival window.
    pub fn run_retention(&self) -> Result<RetentionReport> {
        self.store
            .run_retention(self.cfg.retention_ttl, self.cfg.late_arrival_window)
    }
}
