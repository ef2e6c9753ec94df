// callflow/src/core/stage.rs

//! Defines the structure for a single stage within a pipeline.

use crate::core::template::{Arg, TemplateVars};
use crate::error::CallflowResult;
use crate::runner::{Invocation, Sink};
use std::path::PathBuf;

/// Thread requirement of a stage, resolved against the per-worker quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {
  /// Use the whole per-worker quota.
  #[default]
  Quota,
  /// Use a fixed count, never more than the quota.
  Fixed(usize),
}

impl Threads {
  pub fn resolve(self, quota: usize) -> usize {
    let quota = quota.max(1);
    match self {
      Threads::Quota => quota,
      Threads::Fixed(n) => n.clamp(1, quota),
    }
  }
}

/// Where a stage's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageInput {
  /// Inputs are passed as arguments; stdin is empty.
  #[default]
  Args,
  /// Stdin is read from a file (path template).
  File(String),
  /// Stdin is the previous stage's stdout.
  Pipe,
}

/// Where a stage's standard output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageOutput {
  /// The tool writes its own output files; stdout is discarded.
  #[default]
  Managed,
  /// Stdout is captured to a file (path template).
  File(String),
  /// Stdout feeds the next stage's stdin.
  Pipe,
}

/// Definition of a pipeline stage: one external tool invocation template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDef {
  pub name: String,
  pub program: String,
  pub args: Vec<Arg>,
  pub input: StageInput,
  pub output: StageOutput,
  pub threads: Threads,
  /// Path templates that must exist before the stage starts.
  pub requires: Vec<String>,
  /// Path templates that must exist after the stage succeeds.
  pub produces: Vec<String>,
  /// If this path template exists, the stage is skipped.
  pub skip_if_present: Option<String>,
}

impl StageDef {
  pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      program: program.into(),
      args: Vec::new(),
      input: StageInput::Args,
      output: StageOutput::Managed,
      threads: Threads::Quota,
      requires: Vec::new(),
      produces: Vec::new(),
      skip_if_present: None,
    }
  }

  pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
    self.args.extend(args);
    self
  }

  pub fn stdin_from(mut self, path_template: impl Into<String>) -> Self {
    self.input = StageInput::File(path_template.into());
    self
  }

  pub fn stdout_to(mut self, path_template: impl Into<String>) -> Self {
    self.output = StageOutput::File(path_template.into());
    self
  }

  /// Connects this stage's stdout to the next stage's stdin.
  pub fn pipe_to_next(mut self) -> Self {
    self.output = StageOutput::Pipe;
    self
  }

  /// Reads stdin from the previous stage's stdout.
  pub fn from_pipe(mut self) -> Self {
    self.input = StageInput::Pipe;
    self
  }

  pub fn threads(mut self, threads: Threads) -> Self {
    self.threads = threads;
    self
  }

  pub fn requires(mut self, path_template: impl Into<String>) -> Self {
    self.requires.push(path_template.into());
    self
  }

  pub fn produces(mut self, path_template: impl Into<String>) -> Self {
    self.produces.push(path_template.into());
    self
  }

  pub fn skip_if_present(mut self, path_template: impl Into<String>) -> Self {
    self.skip_if_present = Some(path_template.into());
    self
  }

  pub fn is_pipe_source(&self) -> bool {
    self.output == StageOutput::Pipe
  }

  pub fn is_pipe_sink(&self) -> bool {
    self.input == StageInput::Pipe
  }

  pub(crate) fn render_paths(&self, vars: &TemplateVars, templates: &[String]) -> CallflowResult<Vec<PathBuf>> {
    templates
      .iter()
      .map(|t| vars.render_text(&self.name, t).map(PathBuf::from))
      .collect()
  }

  /// Renders this stage into a concrete invocation for the given variables
  /// and per-worker quota. `{threads}` is set to the resolved thread count.
  pub(crate) fn invocation(&self, vars: &TemplateVars, quota: usize) -> CallflowResult<Invocation> {
    let threads = self.threads.resolve(quota);
    let mut vars = vars.clone();
    vars.set("threads", threads.to_string());

    let stdin = match &self.input {
      StageInput::File(t) => Some(PathBuf::from(vars.render_text(&self.name, t)?)),
      StageInput::Args | StageInput::Pipe => None,
    };
    let stdout = match &self.output {
      StageOutput::Managed => Sink::Discard,
      StageOutput::File(t) => Sink::File(PathBuf::from(vars.render_text(&self.name, t)?)),
      StageOutput::Pipe => Sink::Pipe,
    };

    Ok(Invocation {
      stage: self.name.clone(),
      program: vars.render_text(&self.name, &self.program)?,
      args: vars.render_args(&self.name, &self.args)?,
      threads,
      stdin,
      stdout,
      produces: self.render_paths(&vars, &self.produces)?,
    })
  }
}
