// callflow/src/error.rs
use anyhow::Error as AnyhowError;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons the input location could not be turned into a sample list.
#[derive(Debug, Error)]
pub enum DiscoveryError {
  #[error("No read files matching {suffixes:?} found under '{}'", location.display())]
  NoSamples { location: PathBuf, suffixes: Vec<String> },

  #[error("Input location '{}' could not be scanned: {source}", location.display())]
  Unreadable {
    location: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("Paired-end input has an odd number of read files ({count}); the last one is '{}'", last.display())]
  UnpairedReads { count: usize, last: PathBuf },

  #[error("Read files '{}' and '{}' are adjacent but derive different sample names ('{first_name}' vs '{second_name}')", first.display(), second.display())]
  PairMismatch {
    first: PathBuf,
    second: PathBuf,
    first_name: String,
    second_name: String,
  },

  #[error("Sample name '{name}' is derived from both '{}' and '{}'", first.display(), second.display())]
  DuplicateSample { name: String, first: PathBuf, second: PathBuf },

  #[error("No sample name can be derived from '{}'", path.display())]
  InvalidSampleName { path: PathBuf },

  #[error("Samples '{first}' and '{second}' would both write '{}'", path.display())]
  OutputCollision { first: String, second: String, path: PathBuf },
}

/// Failures of the cohort-level fan-in.
#[derive(Debug, Error)]
pub enum MergeError {
  #[error("No sample succeeded; nothing to merge (failed: {failed:?})")]
  NoSuccessfulSamples { failed: Vec<String> },

  #[error("Sample '{sample}' has no '{artifact}' artifact to merge")]
  MissingInput { sample: String, artifact: String },

  #[error("Merge step '{step}' failed: {source}")]
  StepFailed {
    step: String,
    #[source]
    source: Box<CallflowError>,
  },

  #[error("Merge step '{step}' finished but '{}' does not exist", path.display())]
  MissingOutput { step: String, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum CallflowError {
  #[error("Discovery failed: {0}")]
  Discovery(#[from] DiscoveryError),

  #[error("Invalid allocation (threads={total_threads}, parallelism={parallelism}): {message}")]
  Allocation {
    total_threads: usize,
    parallelism: usize,
    message: String,
  },

  #[error("Pipe chain failed at stage '{stage}' (exit code {exit_code:?}): {stderr}")]
  ChainFailure {
    stage: String,
    exit_code: Option<i32>,
    stderr: String,
  },

  #[error("Stage '{stage}' failed (exit code {exit_code:?}): {stderr}")]
  StageFailed {
    stage: String,
    exit_code: Option<i32>,
    stderr: String,
  },

  #[error("Stage '{stage}' could not start '{program}': {source}")]
  Spawn {
    stage: String,
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Stage '{stage}' needs '{}' which does not exist", path.display())]
  MissingArtifact { stage: String, path: PathBuf },

  #[error("Template for stage '{stage}' references unknown placeholder '{placeholder}'")]
  Template { stage: String, placeholder: String },

  #[error("Preparation stage '{stage}' failed: {source}")]
  Preflight {
    stage: String,
    #[source]
    source: Box<CallflowError>,
  },

  #[error("Merge failed: {0}")]
  Merge(#[from] MergeError),

  #[error("Every sample failed and the pipeline has no merge step (failed: {failed:?})")]
  BatchFailed { failed: Vec<String> },

  #[error("I/O error on '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("Error in external tool collaborator. Source: {source}")]
  External {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal callflow error: {0}")]
  Internal(String),
}

impl CallflowError {
  /// Name of the stage this error is attributed to, when it has one.
  pub fn stage(&self) -> Option<&str> {
    match self {
      CallflowError::ChainFailure { stage, .. }
      | CallflowError::StageFailed { stage, .. }
      | CallflowError::Spawn { stage, .. }
      | CallflowError::MissingArtifact { stage, .. }
      | CallflowError::Template { stage, .. }
      | CallflowError::Preflight { stage, .. } => Some(stage),
      CallflowError::Merge(MergeError::StepFailed { step, .. }) => Some(step),
      _ => None,
    }
  }

  /// Exit code of the failing external invocation, if the error came from one.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      CallflowError::ChainFailure { exit_code, .. } | CallflowError::StageFailed { exit_code, .. } => *exit_code,
      CallflowError::Preflight { source, .. } => source.exit_code(),
      CallflowError::Merge(MergeError::StepFailed { source, .. }) => source.exit_code(),
      _ => None,
    }
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    CallflowError::Io {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn config(message: impl Into<String>) -> Self {
    CallflowError::Configuration {
      message: message.into(),
    }
  }
}

// Collaborators may report failures with anyhow; keep an already-typed error intact.
impl From<AnyhowError> for CallflowError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<CallflowError>() {
      Ok(callflow_err) => callflow_err,
      Err(err) => CallflowError::External { source: err },
    }
  }
}

pub type CallflowResult<T, E = CallflowError> = std::result::Result<T, E>;
