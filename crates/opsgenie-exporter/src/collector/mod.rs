//! Collection pipeline.
//!
//! - `pipeline`: one fetch + aggregate run per resource type
//! - `orchestrator`: timer loop, concurrent fan-out, join barrier, commits

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{self_names, Collector, CollectorSettings, PollReport};
pub use pipeline::{run_pipeline, PipelineOutput, Resource};
