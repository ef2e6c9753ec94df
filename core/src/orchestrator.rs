// callflow/src/orchestrator.rs

//! Wires one run end to end: discovery, allocation, preparation, the
//! per-sample fan-out and, after the completion barrier, the cohort merge.

use crate::allocator::{Allocation, ResourceAllocator};
use crate::discovery::SampleDiscovery;
use crate::error::{CallflowError, CallflowResult, MergeError};
use crate::merge::{excluded_samples, ExcludedSample, MergeReport, MergeStage};
use crate::pipeline::definition::PipelineDefinition;
use crate::pipeline::execution::{run_standalone, PipelineExecutor};
use crate::runner::{StageRunner, ToolExecutor};
use crate::scheduler::{BatchOutcome, ParallelScheduler};
use crate::RunConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{event, instrument, Level};

/// Process exit status for a run whose samples all succeeded.
pub const EXIT_OK: i32 = 0;
/// Exit status for a fatal error.
pub const EXIT_FATAL: i32 = 1;
/// Exit status for a run that finished with some samples excluded.
pub const EXIT_PARTIAL: i32 = 2;

/// Everything a completed run reports.
#[derive(Debug)]
pub struct RunSummary {
  pub pipeline: String,
  pub config: RunConfig,
  pub allocation: Allocation,
  /// Preparation stages that actually ran (skipped ones are not listed).
  pub prepared: Vec<String>,
  pub batch: BatchOutcome,
  pub merge: Option<MergeReport>,
  /// A merge sub-step that failed after some samples succeeded. The
  /// per-sample outcomes above are still valid.
  pub merge_error: Option<CallflowError>,
  pub duration: Duration,
}

impl RunSummary {
  pub fn excluded(&self) -> Vec<ExcludedSample> {
    match &self.merge {
      Some(report) => report.excluded.clone(),
      None => excluded_samples(&self.batch),
    }
  }

  /// `EXIT_FATAL` when the merge failed, `EXIT_OK` when every sample
  /// succeeded, `EXIT_PARTIAL` otherwise.
  pub fn exit_code(&self) -> i32 {
    if self.merge_error.is_some() {
      EXIT_FATAL
    } else if self.batch.all_succeeded() {
      EXIT_OK
    } else {
      EXIT_PARTIAL
    }
  }
}

pub struct Orchestrator {
  config: RunConfig,
  definition: Arc<PipelineDefinition>,
  runner: StageRunner,
}

impl Orchestrator {
  pub fn new(config: RunConfig, definition: PipelineDefinition, executor: Arc<dyn ToolExecutor>) -> Self {
    Self {
      config,
      definition: Arc::new(definition),
      runner: StageRunner::new(executor),
    }
  }

  pub fn config(&self) -> &RunConfig {
    &self.config
  }

  pub fn definition(&self) -> &PipelineDefinition {
    &self.definition
  }

  /// Runs the whole batch.
  ///
  /// Returns `Err` only for fatal conditions: bad configuration, discovery
  /// or allocation failures, a failed preparation stage, or a batch where
  /// no sample succeeded. Individual sample failures are part of the
  /// returned summary, and so is a merge sub-step failure that happens
  /// after some samples succeeded.
  #[instrument(
    name = "Orchestrator::run",
    skip_all,
    fields(pipeline = %self.definition.name()),
    err(Display)
  )]
  pub async fn run(&self) -> CallflowResult<RunSummary> {
    let started = Instant::now();
    self.definition.validate()?;
    self.config.validate()?;
    let config = self.config.absolutize()?;

    let samples = SampleDiscovery::from_config(&config, self.definition.read_layout()).discover()?;
    let allocation = ResourceAllocator::from_config(&config)?;
    let samples = self.definition.bind(samples, &config)?;

    for dir in self.definition.output_dirs(&samples, &config) {
      std::fs::create_dir_all(&dir).map_err(|e| CallflowError::io(&dir, e))?;
    }

    let prepared = if config.run_prepare {
      self.prepare(&config).await?
    } else {
      event!(Level::INFO, "Preparation stages disabled for this run.");
      Vec::new()
    };

    let executor = PipelineExecutor::new(self.definition.clone(), self.runner.clone(), &config, allocation.quota);
    let scheduler = ParallelScheduler::new(executor, allocation.parallelism);
    let batch = scheduler.dispatch(samples)?.wait().await?;

    let mut merge_error = None;
    let merge = match self.definition.merge() {
      Some(def) => match MergeStage::new(def.clone(), self.runner.clone(), &config).run(&batch).await {
        Ok(report) => Some(report),
        Err(err @ CallflowError::Merge(MergeError::NoSuccessfulSamples { .. })) => return Err(err),
        Err(err) => {
          event!(Level::ERROR, stage = ?err.stage(), error = %err, "Cohort merge failed.");
          merge_error = Some(err);
          None
        }
      },
      None if batch.succeeded.is_empty() => {
        return Err(CallflowError::BatchFailed {
          failed: batch.failed_names(),
        });
      }
      None => None,
    };

    let summary = RunSummary {
      pipeline: self.definition.name().to_string(),
      config,
      allocation,
      prepared,
      batch,
      merge,
      merge_error,
      duration: started.elapsed(),
    };
    event!(
      Level::INFO,
      succeeded = summary.batch.succeeded.len(),
      failed = summary.batch.failed.len(),
      exit_code = summary.exit_code(),
      elapsed_ms = summary.duration.as_millis() as u64,
      "Run finished."
    );
    Ok(summary)
  }

  async fn prepare(&self, config: &RunConfig) -> CallflowResult<Vec<String>> {
    let vars = PipelineDefinition::run_vars(config);
    let mut ran = Vec::new();
    for stage in self.definition.prepare_stages() {
      event!(Level::INFO, stage = %stage.name, "Running preparation stage.");
      let executed = run_standalone(&self.runner, stage, &vars, config.total_threads)
        .await
        .map_err(|failure| CallflowError::Preflight {
          stage: stage.name.clone(),
          source: Box::new(failure.error),
        })?;
      if executed {
        ran.push(stage.name.clone());
      }
    }
    Ok(ran)
  }
}
