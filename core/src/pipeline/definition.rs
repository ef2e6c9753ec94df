// callflow/src/pipeline/definition.rs

//! Contains the `PipelineDefinition` struct and methods for its construction,
//! structural modification and validation.

use crate::core::sample::{ReadLayout, SampleUnit};
use crate::core::stage::StageDef;
use crate::core::template::TemplateVars;
use crate::error::{CallflowError, CallflowResult, DiscoveryError};
use crate::merge::CohortMergeDef;
use crate::RunConfig;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::PathBuf;

/// Variable names filled in by the orchestrator; artifacts may not reuse them.
pub const RESERVED_VARS: &[&str] = &[
  "sample",
  "reads",
  "read1",
  "read2",
  "reference",
  "reference_dict",
  "out",
  "threads",
  "cohort",
  "inputs",
  "intermediate",
  "final",
];

/// A per-sample output declared by a pipeline, as a path template relative
/// to the output root (e.g. `bam/{sample}.bam`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDef {
  pub key: String,
  pub template: String,
}

/// The ordered per-sample workflow, shared read-only by every worker of a run.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
  pub(crate) name: String,
  pub(crate) read_layout: ReadLayout,
  pub(crate) artifacts: Vec<ArtifactDef>,
  /// Run once per run, before any sample is dispatched.
  pub(crate) prepare: Vec<StageDef>,
  pub(crate) stages: Vec<StageDef>,
  pub(crate) merge: Option<CohortMergeDef>,
}

impl PipelineDefinition {
  pub fn new(name: impl Into<String>, read_layout: ReadLayout, stages: Vec<StageDef>) -> Self {
    Self {
      name: name.into(),
      read_layout,
      artifacts: Vec::new(),
      prepare: Vec::new(),
      stages,
      merge: None,
    }
  }

  pub fn with_artifact(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
    self.artifacts.push(ArtifactDef {
      key: key.into(),
      template: template.into(),
    });
    self
  }

  pub fn with_prepare(mut self, stage: StageDef) -> Self {
    self.prepare.push(stage);
    self
  }

  pub fn with_merge(mut self, merge: CohortMergeDef) -> Self {
    self.merge = Some(merge);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn read_layout(&self) -> ReadLayout {
    self.read_layout
  }

  pub fn stages(&self) -> &[StageDef] {
    &self.stages
  }

  pub fn stage_names(&self) -> Vec<&str> {
    self.stages.iter().map(|s| s.name.as_str()).collect()
  }

  pub fn artifacts(&self) -> &[ArtifactDef] {
    &self.artifacts
  }

  pub fn prepare_stages(&self) -> &[StageDef] {
    &self.prepare
  }

  pub fn merge(&self) -> Option<&CohortMergeDef> {
    self.merge.as_ref()
  }

  /// Checks stage naming, pipe pairing and artifact declarations.
  pub fn validate(&self) -> CallflowResult<()> {
    if self.stages.is_empty() {
      return Err(CallflowError::config(format!("pipeline '{}' has no stages", self.name)));
    }

    let mut names = HashSet::new();
    for stage in self.stages.iter().chain(&self.prepare) {
      if !names.insert(stage.name.as_str()) {
        return Err(CallflowError::config(format!("duplicate stage name '{}'", stage.name)));
      }
    }

    for (idx, stage) in self.stages.iter().enumerate() {
      let prev_pipes = idx > 0 && self.stages[idx - 1].is_pipe_source();
      if stage.is_pipe_sink() != prev_pipes {
        return Err(CallflowError::config(format!(
          "stage '{}' must read from a pipe exactly when the previous stage writes to one",
          stage.name
        )));
      }
      if stage.skip_if_present.is_some() && (stage.is_pipe_sink() || stage.is_pipe_source()) {
        return Err(CallflowError::config(format!(
          "stage '{}' is pipe-linked and cannot be skipped on its own",
          stage.name
        )));
      }
    }
    if let Some(last) = self.stages.last() {
      if last.is_pipe_source() {
        return Err(CallflowError::config(format!(
          "last stage '{}' pipes its output but nothing reads it",
          last.name
        )));
      }
    }
    if let Some(bad) = self.prepare.iter().find(|s| s.is_pipe_sink() || s.is_pipe_source()) {
      return Err(CallflowError::config(format!(
        "preparation stage '{}' cannot be pipe-linked",
        bad.name
      )));
    }

    let mut keys = HashSet::new();
    for artifact in &self.artifacts {
      if RESERVED_VARS.contains(&artifact.key.as_str()) {
        return Err(CallflowError::config(format!(
          "artifact key '{}' clashes with a built-in variable",
          artifact.key
        )));
      }
      if !keys.insert(artifact.key.as_str()) {
        return Err(CallflowError::config(format!("duplicate artifact key '{}'", artifact.key)));
      }
    }

    if let Some(merge) = &self.merge {
      if !keys.contains(merge.input_artifact.as_str()) {
        return Err(CallflowError::config(format!(
          "merge input '{}' is not a declared artifact",
          merge.input_artifact
        )));
      }
    }
    Ok(())
  }

  /// Groups stage indices into chains: a run of pipe-linked stages, or a
  /// single stage.
  pub fn chains(&self) -> Vec<Range<usize>> {
    let mut chains = Vec::new();
    let mut start = 0;
    for (idx, stage) in self.stages.iter().enumerate() {
      if !stage.is_pipe_source() {
        chains.push(start..idx + 1);
        start = idx + 1;
      }
    }
    chains
  }

  /// Variables shared by every sample of a run.
  pub fn run_vars(config: &RunConfig) -> TemplateVars {
    let mut vars = TemplateVars::new();
    vars
      .set_path("reference", &config.reference)
      .set("reference_dict", config.reference.with_extension("dict").display().to_string())
      .set("out", config.output_dir.display().to_string())
      .set("cohort", config.cohort_name.clone());
    vars
  }

  /// Variables for one bound sample: the run variables plus the sample
  /// name, its reads and every declared artifact path.
  pub fn sample_vars(&self, sample: &SampleUnit, run_vars: &TemplateVars) -> TemplateVars {
    let mut vars = run_vars.clone();
    vars.set("sample", sample.name.clone());
    vars.set_list("reads", sample.reads.iter().map(|p| p.display().to_string()));
    if let Some(read1) = sample.reads.first() {
      vars.set_path("read1", read1);
    }
    if let Some(read2) = sample.reads.get(1) {
      vars.set_path("read2", read2);
    }
    for (key, path) in &sample.outputs {
      vars.set_path(key, path);
    }
    vars
  }

  /// Derives every declared artifact path for each sample.
  ///
  /// Fails if two samples would write the same path, or if a sample's read
  /// count does not match the pipeline's layout.
  pub fn bind(&self, samples: Vec<SampleUnit>, config: &RunConfig) -> CallflowResult<Vec<SampleUnit>> {
    let run_vars = Self::run_vars(config);
    let mut owners: HashMap<PathBuf, String> = HashMap::new();
    let mut bound = Vec::with_capacity(samples.len());

    for mut sample in samples {
      if sample.reads.len() != self.read_layout.files_per_sample() {
        return Err(CallflowError::config(format!(
          "sample '{}' has {} read files but pipeline '{}' expects {}",
          sample.name,
          sample.reads.len(),
          self.name,
          self.read_layout.files_per_sample()
        )));
      }

      let mut vars = run_vars.clone();
      vars.set("sample", sample.name.clone());
      for artifact in &self.artifacts {
        let relative = vars.render_text(&format!("artifact:{}", artifact.key), &artifact.template)?;
        let path = config.output_path(relative);
        // Later artifacts may refer to earlier ones, e.g. `{bam}.bai`.
        vars.set_path(&artifact.key, &path);
        if let Some(owner) = owners.insert(path.clone(), sample.name.clone()) {
          if owner != sample.name {
            return Err(
              DiscoveryError::OutputCollision {
                first: owner,
                second: sample.name.clone(),
                path,
              }
              .into(),
            );
          }
        }
        sample.outputs.insert(artifact.key.clone(), path);
      }
      bound.push(sample);
    }
    Ok(bound)
  }

  /// Directories that must exist before any worker starts.
  pub fn output_dirs(&self, samples: &[SampleUnit], config: &RunConfig) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = samples
      .iter()
      .flat_map(|s| s.outputs.values())
      .filter_map(|p| p.parent().map(PathBuf::from))
      .chain(std::iter::once(config.output_dir.clone()))
      .collect();
    dirs.sort();
    dirs.dedup();
    dirs
  }
}
