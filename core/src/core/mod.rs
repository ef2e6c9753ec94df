// callflow/src/core/mod.rs

pub mod outcome;
pub mod sample;
pub mod stage;
pub mod template;

// Re-export key types for easier access from other callflow modules (and lib.rs)
pub use outcome::{ExecutionResult, SampleFailure, SampleResult, SampleSuccess};
pub use sample::{derive_sample_name, ReadLayout, SampleUnit};
pub use stage::{StageDef, StageInput, StageOutput, Threads};
pub use template::{arg, args, flagged, spread, Arg, TemplateVars};
