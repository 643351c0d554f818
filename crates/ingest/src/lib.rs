pub mod decode;
pub mod pipeline;

pub use decode::{RawEvaluation, RawSpan};
pub use pipeline::{Pipeline, PipelineConfig};
