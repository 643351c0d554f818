pub mod engine;
pub mod telemetry;

pub use engine::Engine;
pub use traceloom_core::config::Config;
pub use traceloom_core::error::{Result, TraceloomError};
pub use traceloom_core::filter::TimeWindow;
pub use traceloom_ingest::{Pipeline, PipelineConfig, RawEvaluation, RawSpan};
pub use traceloom_store::Appended;
