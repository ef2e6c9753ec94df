// callflow/src/runner/mod.rs

//! The "run external tool" seam.
//!
//! Everything the orchestrator knows about external programs goes through
//! `ToolExecutor::execute`. A call runs one *chain*: a single invocation, or
//! several invocations whose stdout feeds the next one's stdin. `StageRunner`
//! wraps an executor and turns the per-link results into typed failures.

pub mod process;

use crate::core::outcome::ExecutionResult;
use crate::error::{CallflowError, CallflowResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub use process::ProcessExecutor;

/// Where an invocation's stdout goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
  Discard,
  /// Captured to this path once the invocation succeeds.
  File(PathBuf),
  /// Connected to the next invocation's stdin.
  Pipe,
}

/// A fully rendered external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub stage: String,
  pub program: String,
  pub args: Vec<String>,
  /// Thread count this invocation was rendered with.
  pub threads: usize,
  pub stdin: Option<PathBuf>,
  pub stdout: Sink,
  /// Files the stage is expected to leave behind.
  pub produces: Vec<PathBuf>,
}

impl Invocation {
  pub fn new(stage: impl Into<String>, program: impl Into<String>) -> Self {
    Self {
      stage: stage.into(),
      program: program.into(),
      args: Vec::new(),
      threads: 1,
      stdin: None,
      stdout: Sink::Discard,
      produces: Vec::new(),
    }
  }

  /// The command line, for logs.
  pub fn command_line(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// The opaque interface to external tools.
///
/// Implementations run every link of `chain`, connecting each link's stdout
/// to the next link's stdin, and return one result per link that was started,
/// in chain order. Links are started in order. When a link fails, later links
/// that were already started are killed and reported with `killed` set; links
/// that were never started have no result. `Err` is reserved for links that
/// could not be started at all.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
  async fn execute(&self, chain: &[Invocation]) -> CallflowResult<Vec<ExecutionResult>>;
}

/// A failed chain: the typed error plus the result of the link it blames.
#[derive(Debug)]
pub struct StageFailure {
  pub error: CallflowError,
  pub execution: Option<ExecutionResult>,
}

impl From<StageFailure> for CallflowError {
  fn from(failure: StageFailure) -> Self {
    failure.error
  }
}

impl From<CallflowError> for StageFailure {
  fn from(error: CallflowError) -> Self {
    StageFailure { error, execution: None }
  }
}

/// Runs chains through a `ToolExecutor` and checks every exit status.
#[derive(Clone)]
pub struct StageRunner {
  executor: Arc<dyn ToolExecutor>,
}

impl StageRunner {
  pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
    Self { executor }
  }

  #[instrument(
    name = "StageRunner::run",
    skip_all,
    fields(
      head = chain.first().map(|i| i.stage.as_str()).unwrap_or_default(),
      links = chain.len(),
    )
  )]
  pub async fn run(&self, chain: &[Invocation]) -> Result<Vec<ExecutionResult>, StageFailure> {
    check_links(chain)?;
    for invocation in chain {
      event!(Level::DEBUG, stage = %invocation.stage, threads = invocation.threads, command = %invocation.command_line(), "Launching invocation.");
    }

    let results = self.executor.execute(chain).await?;

    if let Some(blamed) = blame(&results) {
      event!(
        Level::WARN,
        stage = %blamed.stage,
        exit_code = ?blamed.exit_code,
        signal = ?blamed.signal,
        "Invocation failed."
      );
      let error = if chain.len() > 1 {
        CallflowError::ChainFailure {
          stage: blamed.stage.clone(),
          exit_code: blamed.exit_code,
          stderr: blamed.stderr.clone(),
        }
      } else {
        CallflowError::StageFailed {
          stage: blamed.stage.clone(),
          exit_code: blamed.exit_code,
          stderr: blamed.stderr.clone(),
        }
      };
      return Err(StageFailure {
        error,
        execution: Some(blamed.clone()),
      });
    }

    if results.len() != chain.len() {
      return Err(
        CallflowError::Internal(format!(
          "executor reported {} results for a chain of {} links without a failure",
          results.len(),
          chain.len()
        ))
        .into(),
      );
    }
    Ok(results)
  }
}

fn check_links(chain: &[Invocation]) -> CallflowResult<()> {
  let Some((last, inner)) = chain.split_last() else {
    return Err(CallflowError::Internal("empty invocation chain".to_string()));
  };
  if let Some(bad) = inner.iter().find(|i| i.stdout != Sink::Pipe) {
    return Err(CallflowError::Internal(format!(
      "stage '{}' is followed by a piped stage but does not pipe its output",
      bad.stage
    )));
  }
  if last.stdout == Sink::Pipe {
    return Err(CallflowError::Internal(format!(
      "stage '{}' pipes its output but nothing reads it",
      last.stage
    )));
  }
  Ok(())
}

/// Picks the link responsible for a failed chain: the first link that failed
/// on its own, preferring one that did not merely die on a broken pipe.
fn blame(results: &[ExecutionResult]) -> Option<&ExecutionResult> {
  let genuine = || results.iter().filter(|r| !r.success() && !r.killed);
  genuine()
    .find(|r| !r.is_broken_pipe())
    .or_else(|| genuine().next())
    .or_else(|| results.iter().find(|r| !r.success()))
}
