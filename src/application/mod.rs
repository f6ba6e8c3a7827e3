//! Application layer - the detection pipeline

pub mod pipeline;

pub use pipeline::{AnomalyPipeline, PipelineStats, ProcessOutcome};
