// callflow/src/core/outcome.rs

//! Outcomes of a single invocation (`ExecutionResult`) and of one sample's
//! full pipeline run (`SampleResult`).

use crate::core::sample::SampleUnit;
use crate::error::CallflowError;
use std::path::PathBuf;
use std::time::Duration;

/// Signal number a writer receives when its reader has gone away.
pub const BROKEN_PIPE_SIGNAL: i32 = 13;

/// Result of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
  pub stage: String,
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  pub signal: Option<i32>,
  /// Tail of the captured standard error.
  pub stderr: String,
  pub duration: Duration,
  /// Set when the orchestrator itself killed the process because an
  /// upstream link of its chain failed.
  pub killed: bool,
}

impl ExecutionResult {
  pub fn succeeded(stage: impl Into<String>, duration: Duration) -> Self {
    Self {
      stage: stage.into(),
      exit_code: Some(0),
      signal: None,
      stderr: String::new(),
      duration,
      killed: false,
    }
  }

  pub fn failed(stage: impl Into<String>, exit_code: i32, stderr: impl Into<String>, duration: Duration) -> Self {
    Self {
      stage: stage.into(),
      exit_code: Some(exit_code),
      signal: None,
      stderr: stderr.into(),
      duration,
      killed: false,
    }
  }

  pub fn success(&self) -> bool {
    self.exit_code == Some(0) && !self.killed
  }

  /// True when the process died writing into a pipe whose reader had exited.
  pub fn is_broken_pipe(&self) -> bool {
    self.signal == Some(BROKEN_PIPE_SIGNAL) || self.exit_code == Some(128 + BROKEN_PIPE_SIGNAL)
  }
}

/// A sample whose pipeline ran to completion.
#[derive(Debug, Clone)]
pub struct SampleSuccess {
  pub sample: SampleUnit,
  /// Every artifact the pipeline produced, in stage order.
  pub artifacts: Vec<PathBuf>,
  pub executions: Vec<ExecutionResult>,
  pub duration: Duration,
}

/// A sample whose pipeline stopped at a failing stage.
#[derive(Debug)]
pub struct SampleFailure {
  pub sample: SampleUnit,
  /// `None` only when the worker itself died outside any stage.
  pub stage: Option<String>,
  /// The failing invocation's result, when an invocation ran.
  pub execution: Option<ExecutionResult>,
  pub error: CallflowError,
  /// Stages that completed before the failure.
  pub completed_stages: Vec<String>,
  pub duration: Duration,
}

/// Terminal outcome of one `PipelineExecutor` run.
#[derive(Debug)]
pub enum SampleResult {
  Succeeded(SampleSuccess),
  Failed(SampleFailure),
}

impl SampleResult {
  pub fn sample(&self) -> &SampleUnit {
    match self {
      SampleResult::Succeeded(s) => &s.sample,
      SampleResult::Failed(f) => &f.sample,
    }
  }

  pub fn name(&self) -> &str {
    &self.sample().name
  }

  pub fn is_success(&self) -> bool {
    matches!(self, SampleResult::Succeeded(_))
  }
}
