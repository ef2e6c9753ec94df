// callflow/src/merge.rs

//! Cohort-level fan-in: combines the per-sample outputs of every successful
//! sample into one intermediate artifact, then converts it into the final
//! callset.
//!
//! `MergeStage::run` takes a `BatchOutcome`, which only exists once the
//! scheduler's completion barrier has been passed.

use crate::core::stage::StageDef;
use crate::core::template::TemplateVars;
use crate::error::{CallflowResult, MergeError};
use crate::pipeline::definition::PipelineDefinition;
use crate::pipeline::execution::run_standalone;
use crate::runner::StageRunner;
use crate::scheduler::BatchOutcome;
use crate::RunConfig;
use std::path::{Path, PathBuf};
use tracing::{event, instrument, Level};

/// How a pipeline's per-sample outputs are merged.
///
/// Merge stages can use `{inputs}` (list of per-sample artifacts),
/// `{intermediate}`, `{final}`, `{reference}`, `{cohort}`, `{out}` and
/// `{threads}` (the whole run budget, as no worker is active anymore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortMergeDef {
  /// Artifact key of the per-sample file fed into the merge.
  pub input_artifact: String,
  /// Path template of the combined intermediate, relative to the output root.
  pub intermediate: String,
  /// Path template of the final callset, relative to the output root.
  pub final_output: String,
  pub prepare: Option<StageDef>,
  pub combine: StageDef,
  pub convert: StageDef,
}

/// Per-sample artifacts drawn only from successful samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortMergeInput {
  /// `(sample name, artifact path)`, in dispatch order.
  pub entries: Vec<(String, PathBuf)>,
}

impl CohortMergeInput {
  pub fn from_batch(batch: &BatchOutcome, artifact: &str) -> CallflowResult<Self> {
    if batch.succeeded.is_empty() {
      return Err(
        MergeError::NoSuccessfulSamples {
          failed: batch.failed_names(),
        }
        .into(),
      );
    }

    let entries = batch
      .succeeded
      .iter()
      .map(|success| {
        success
          .sample
          .output(artifact)
          .map(|path| (success.sample.name.clone(), path.to_path_buf()))
          .ok_or_else(|| MergeError::MissingInput {
            sample: success.sample.name.clone(),
            artifact: artifact.to_string(),
          })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { entries })
  }

  pub fn paths(&self) -> Vec<&Path> {
    self.entries.iter().map(|(_, p)| p.as_path()).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedCallSet {
  pub intermediate: PathBuf,
  pub final_calls: PathBuf,
}

/// A sample left out of the merge and the stage where it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedSample {
  pub sample: String,
  pub stage: Option<String>,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
  pub merged: MergedCallSet,
  pub included: Vec<String>,
  pub excluded: Vec<ExcludedSample>,
}

pub struct MergeStage {
  def: CohortMergeDef,
  runner: StageRunner,
  run_vars: TemplateVars,
  config_output: PathBuf,
  total_threads: usize,
}

impl MergeStage {
  pub fn new(def: CohortMergeDef, runner: StageRunner, config: &RunConfig) -> Self {
    Self {
      def,
      runner,
      run_vars: PipelineDefinition::run_vars(config),
      config_output: config.output_dir.clone(),
      total_threads: config.total_threads,
    }
  }

  pub fn merged_paths(&self) -> CallflowResult<MergedCallSet> {
    Ok(MergedCallSet {
      intermediate: self
        .config_output
        .join(self.run_vars.render_text("merge", &self.def.intermediate)?),
      final_calls: self
        .config_output
        .join(self.run_vars.render_text("merge", &self.def.final_output)?),
    })
  }

  /// Merges the successful subset of `batch`.
  ///
  /// Fails with `MergeError::NoSuccessfulSamples` when nothing succeeded.
  /// Failed samples are listed in the report's `excluded`, never dropped
  /// silently.
  #[instrument(
    name = "MergeStage::run",
    skip_all,
    fields(succeeded = batch.succeeded.len(), failed = batch.failed.len()),
    err(Display)
  )]
  pub async fn run(&self, batch: &BatchOutcome) -> CallflowResult<MergeReport> {
    let input = CohortMergeInput::from_batch(batch, &self.def.input_artifact)?;
    let excluded = excluded_samples(batch);
    for ex in &excluded {
      event!(Level::WARN, sample = %ex.sample, stage = ?ex.stage, "Sample excluded from the cohort merge.");
    }

    let merged = self.merged_paths()?;
    let mut vars = self.run_vars.clone();
    vars
      .set_list("inputs", input.paths().iter().map(|p| p.display().to_string()))
      .set_path("intermediate", &merged.intermediate)
      .set_path("final", &merged.final_calls);

    if let Some(prepare) = &self.def.prepare {
      self.run_step(prepare, &vars).await?;
    }
    self.run_step(&self.def.combine, &vars).await?;
    ensure_output(&self.def.combine.name, &merged.intermediate)?;
    self.run_step(&self.def.convert, &vars).await?;
    ensure_output(&self.def.convert.name, &merged.final_calls)?;

    event!(
      Level::INFO,
      included = input.len(),
      excluded = excluded.len(),
      final_calls = %merged.final_calls.display(),
      "Cohort merge completed."
    );
    Ok(MergeReport {
      merged,
      included: input.entries.into_iter().map(|(name, _)| name).collect(),
      excluded,
    })
  }

  async fn run_step(&self, step: &StageDef, vars: &TemplateVars) -> CallflowResult<()> {
    run_standalone(&self.runner, step, vars, self.total_threads)
      .await
      .map_err(|failure| MergeError::StepFailed {
        step: step.name.clone(),
        source: Box::new(failure.error),
      })?;
    Ok(())
  }
}

pub fn excluded_samples(batch: &BatchOutcome) -> Vec<ExcludedSample> {
  batch
    .failed
    .iter()
    .map(|f| ExcludedSample {
      sample: f.sample.name.clone(),
      stage: f.stage.clone(),
      reason: f.error.to_string(),
    })
    .collect()
}

fn ensure_output(step: &str, path: &Path) -> CallflowResult<()> {
  if path.exists() {
    Ok(())
  } else {
    Err(
      MergeError::MissingOutput {
        step: step.to_string(),
        path: path.to_path_buf(),
      }
      .into(),
    )
  }
}
