// callflow/src/config.rs

//! The immutable run configuration handed to every component at construction.

use crate::error::{CallflowError, CallflowResult};
use std::path::{Path, PathBuf};

pub const DEFAULT_TOTAL_THREADS: usize = 4;
pub const DEFAULT_PARALLELISM: usize = 1;
pub const DEFAULT_COHORT_NAME: &str = "cohort";
pub const DEFAULT_STDERR_TAIL_BYTES: usize = 64 * 1024;
pub const DEFAULT_READ_SUFFIXES: &[&str] = &[".fastq", ".fastq.gz", ".fq", ".fq.gz"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
  pub input_dir: PathBuf,
  pub reference: PathBuf,
  pub output_dir: PathBuf,
  pub total_threads: usize,
  pub parallelism: usize,
  pub read_suffixes: Vec<String>,
  pub cohort_name: String,
  /// Run the pipeline's one-off preparation stages (e.g. image pulls).
  pub run_prepare: bool,
  pub stderr_tail_bytes: usize,
}

impl RunConfig {
  pub fn new(input_dir: impl Into<PathBuf>, reference: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
    Self {
      input_dir: input_dir.into(),
      reference: reference.into(),
      output_dir: output_dir.into(),
      total_threads: DEFAULT_TOTAL_THREADS,
      parallelism: DEFAULT_PARALLELISM,
      read_suffixes: DEFAULT_READ_SUFFIXES.iter().map(|s| s.to_string()).collect(),
      cohort_name: DEFAULT_COHORT_NAME.to_string(),
      run_prepare: true,
      stderr_tail_bytes: DEFAULT_STDERR_TAIL_BYTES,
    }
  }

  pub fn with_threads(mut self, total_threads: usize) -> Self {
    self.total_threads = total_threads;
    self
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism;
    self
  }

  pub fn with_read_suffixes<I, S>(mut self, suffixes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.read_suffixes = suffixes.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_cohort_name(mut self, name: impl Into<String>) -> Self {
    self.cohort_name = name.into();
    self
  }

  pub fn with_prepare(mut self, run_prepare: bool) -> Self {
    self.run_prepare = run_prepare;
    self
  }

  pub fn with_stderr_tail_bytes(mut self, bytes: usize) -> Self {
    self.stderr_tail_bytes = bytes;
    self
  }

  /// Checks the settings that do not belong to a specific component.
  /// Thread and parallelism values are checked by the allocator.
  pub fn validate(&self) -> CallflowResult<()> {
    if self.read_suffixes.iter().all(|s| s.is_empty()) {
      return Err(CallflowError::config("at least one read file suffix is required"));
    }
    if self.cohort_name.is_empty() || self.cohort_name.contains(std::path::MAIN_SEPARATOR) {
      return Err(CallflowError::config(format!(
        "cohort name '{}' must be a non-empty file name",
        self.cohort_name
      )));
    }
    if self.output_dir.as_os_str().is_empty() {
      return Err(CallflowError::config("output location must not be empty"));
    }
    Ok(())
  }

  /// Returns a copy with absolute input, reference and output paths.
  /// Container mounts and child processes with another working directory
  /// need them.
  pub fn absolutize(&self) -> CallflowResult<Self> {
    let abs = |p: &Path| std::path::absolute(p).map_err(|e| CallflowError::io(p, e));
    Ok(Self {
      input_dir: abs(&self.input_dir)?,
      reference: abs(&self.reference)?,
      output_dir: abs(&self.output_dir)?,
      ..self.clone()
    })
  }

  pub fn output_path(&self, relative: impl AsRef<Path>) -> PathBuf {
    self.output_dir.join(relative)
  }
}
