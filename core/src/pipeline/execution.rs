// callflow/src/pipeline/execution.rs

//! Contains the `PipelineExecutor`, which runs one sample's pipeline to
//! completion or to its first failing stage.

use crate::core::outcome::{ExecutionResult, SampleFailure, SampleResult, SampleSuccess};
use crate::core::sample::SampleUnit;
use crate::core::stage::StageDef;
use crate::core::template::TemplateVars;
use crate::error::CallflowError;
use crate::pipeline::definition::PipelineDefinition;
use crate::runner::{StageFailure, StageRunner};
use crate::RunConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{event, instrument, span, Instrument, Level};

/// Runs a `PipelineDefinition` for one sample at a time.
///
/// An executor holds no per-sample state, so one instance is shared by every
/// worker of a run.
#[derive(Clone)]
pub struct PipelineExecutor {
  definition: Arc<PipelineDefinition>,
  runner: StageRunner,
  run_vars: TemplateVars,
  quota: usize,
}

enum ChainOutcome {
  Skipped,
  Completed {
    executions: Vec<ExecutionResult>,
    produced: Vec<PathBuf>,
  },
}

impl PipelineExecutor {
  pub fn new(definition: Arc<PipelineDefinition>, runner: StageRunner, config: &RunConfig, quota: usize) -> Self {
    Self {
      definition,
      runner,
      run_vars: PipelineDefinition::run_vars(config),
      quota,
    }
  }

  pub fn quota(&self) -> usize {
    self.quota
  }

  /// Executes every stage for `sample`, strictly in order.
  ///
  /// Never returns an error: any stage failure becomes a
  /// `SampleResult::Failed` naming the stage, and the remaining stages are
  /// skipped.
  #[instrument(
    name = "PipelineExecutor::run",
    skip_all,
    fields(
      sample = %sample.name,
      pipeline = %self.definition.name(),
      quota = self.quota,
    )
  )]
  pub async fn run(&self, sample: SampleUnit) -> SampleResult {
    event!(Level::DEBUG, "Sample pipeline starting.");
    let started = Instant::now();
    let vars = self.definition.sample_vars(&sample, &self.run_vars);

    let mut executions = Vec::new();
    let mut artifacts: Vec<PathBuf> = Vec::new();
    let mut completed_stages = Vec::new();

    for (chain_idx, range) in self.definition.chains().into_iter().enumerate() {
      let stages = &self.definition.stages()[range];
      let head = stages[0].name.as_str();
      let chain_span = span!(
        Level::INFO,
        "pipeline_stage_execution",
        stage = head,
        chain_index = chain_idx,
        links = stages.len()
      );

      match self.run_chain(stages, &vars).instrument(chain_span).await {
        Ok(ChainOutcome::Skipped) => {
          completed_stages.push(head.to_string());
        }
        Ok(ChainOutcome::Completed { executions: results, produced }) => {
          executions.extend(results);
          for path in produced {
            if !artifacts.contains(&path) {
              artifacts.push(path);
            }
          }
          completed_stages.extend(stages.iter().map(|s| s.name.clone()));
        }
        Err(failure) => {
          let stage = failure.error.stage().unwrap_or(head).to_string();
          event!(Level::ERROR, stage = %stage, error = %failure.error, "Sample pipeline failed; skipping remaining stages.");
          return SampleResult::Failed(SampleFailure {
            sample,
            stage: Some(stage),
            execution: failure.execution,
            error: failure.error,
            completed_stages,
            duration: started.elapsed(),
          });
        }
      }
    }

    event!(Level::INFO, artifacts = artifacts.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Sample pipeline completed.");
    SampleResult::Succeeded(SampleSuccess {
      sample,
      artifacts,
      executions,
      duration: started.elapsed(),
    })
  }

  async fn run_chain(&self, stages: &[StageDef], vars: &TemplateVars) -> Result<ChainOutcome, StageFailure> {
    if let [stage] = stages {
      if let Some(marker) = &stage.skip_if_present {
        let marker = PathBuf::from(vars.render_text(&stage.name, marker)?);
        if marker.exists() {
          event!(Level::INFO, stage = %stage.name, marker = %marker.display(), "Stage skipped; its output is already present.");
          return Ok(ChainOutcome::Skipped);
        }
      }
    }

    // Later stages depend on persisted artifacts, not just on the pipe.
    for stage in stages {
      for path in stage.render_paths(vars, &stage.requires)? {
        if !path.exists() {
          return Err(
            CallflowError::MissingArtifact {
              stage: stage.name.clone(),
              path,
            }
            .into(),
          );
        }
      }
    }

    let invocations = stages
      .iter()
      .map(|stage| stage.invocation(vars, self.quota))
      .collect::<Result<Vec<_>, CallflowError>>()?;

    let executions = self.runner.run(&invocations).await?;

    let mut produced = Vec::new();
    for invocation in &invocations {
      for path in &invocation.produces {
        if !path.exists() {
          return Err(
            CallflowError::MissingArtifact {
              stage: invocation.stage.clone(),
              path: path.clone(),
            }
            .into(),
          );
        }
        produced.push(path.clone());
      }
    }

    Ok(ChainOutcome::Completed { executions, produced })
  }
}

/// Runs one stage outside any sample, e.g. a preparation or merge step.
///
/// Honors `skip_if_present` and checks `requires`/`produces`. Returns
/// `Ok(false)` when the stage was skipped.
pub(crate) async fn run_standalone(
  runner: &StageRunner,
  stage: &StageDef,
  vars: &TemplateVars,
  threads: usize,
) -> Result<bool, StageFailure> {
  if let Some(marker) = &stage.skip_if_present {
    let marker = PathBuf::from(vars.render_text(&stage.name, marker)?);
    if marker.exists() {
      event!(Level::INFO, stage = %stage.name, marker = %marker.display(), "Stage skipped; its output is already present.");
      return Ok(false);
    }
  }
  for path in stage.render_paths(vars, &stage.requires)? {
    if !path.exists() {
      return Err(
        CallflowError::MissingArtifact {
          stage: stage.name.clone(),
          path,
        }
        .into(),
      );
    }
  }

  let invocation = stage.invocation(vars, threads)?;
  runner.run(std::slice::from_ref(&invocation)).await?;
  if let Some(path) = invocation.produces.iter().find(|p| !p.exists()) {
    return Err(
      CallflowError::MissingArtifact {
        stage: stage.name.clone(),
        path: path.clone(),
      }
      .into(),
    );
  }
  Ok(true)
}
