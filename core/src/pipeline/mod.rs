// callflow/src/pipeline/mod.rs

//! Defines the `PipelineDefinition`, its construction and validation, the
//! per-sample `PipelineExecutor`, and the built-in pipeline presets.

pub mod definition;
pub mod execution;
pub mod presets;

pub use definition::{ArtifactDef, PipelineDefinition};
pub use execution::PipelineExecutor;
pub use presets::PipelinePreset;
