// src/lib.rs

//! Callflow: an ASYNC orchestrator that turns sequencing reads into per-sample
//! and cohort-level variant calls by chaining external tools.
//!
//! A run goes through these phases:
//!  - `SampleDiscovery` groups the read files of an input directory into samples.
//!  - `ResourceAllocator` splits the thread budget into a per-worker quota.
//!  - `ParallelScheduler` runs a `PipelineExecutor` per sample on a bounded
//!    pool of workers, each stage being one external tool (or a pipe chain).
//!  - After the completion barrier, `MergeStage` combines the outputs of the
//!    samples that succeeded into a cohort callset.
//!
//! `Orchestrator` wires the phases together. External programs are only
//! reached through the `ToolExecutor` trait, so a run can be driven by a
//! mock in tests.

pub mod allocator;
pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod pipeline;
pub mod runner;
pub mod scheduler;

// --- Re-exports for the Public API ---

pub use crate::allocator::{Allocation, ResourceAllocator};
pub use crate::config::RunConfig;
pub use crate::core::{
  arg, args, flagged, spread, Arg, ExecutionResult, ReadLayout, SampleFailure, SampleResult, SampleSuccess,
  SampleUnit, StageDef, TemplateVars, Threads,
};
pub use crate::discovery::SampleDiscovery;
pub use crate::error::{CallflowError, CallflowResult, DiscoveryError, MergeError};
pub use crate::merge::{CohortMergeDef, CohortMergeInput, ExcludedSample, MergeReport, MergeStage, MergedCallSet};
pub use crate::orchestrator::{Orchestrator, RunSummary, EXIT_FATAL, EXIT_OK, EXIT_PARTIAL};
pub use crate::pipeline::{PipelineDefinition, PipelineExecutor, PipelinePreset};
pub use crate::runner::{Invocation, ProcessExecutor, Sink, StageFailure, StageRunner, ToolExecutor};
pub use crate::scheduler::{BatchOutcome, CompletionBarrier, ParallelScheduler, SchedulerPhase};
