// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper.

use async_trait::async_trait;
use callflow::{
  args, CallflowResult, ExecutionResult, Invocation, PipelineDefinition, ReadLayout, RunConfig, Sink, StageDef,
  ToolExecutor,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::Level;

// --- Helper for Tracing Setup (call once per test run if needed) ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Mock Tool Executor ---

/// A scripted failure: the first link whose stage is `stage` and whose
/// command line contains `needle` exits with `exit_code`.
#[derive(Debug, Clone)]
struct FailureRule {
  stage: String,
  needle: String,
  exit_code: i32,
}

/// Stands in for external tools.
///
/// Links run in chain order. A failing link ends the chain: links after it
/// are never started. Succeeding links create the files they are expected to
/// produce (and their stdout file, if any).
#[derive(Debug, Default)]
pub struct MockExecutor {
  calls: Mutex<Vec<Invocation>>,
  failures: Mutex<Vec<FailureRule>>,
  delay: Duration,
  skip_outputs: bool,
  active: AtomicUsize,
  peak_active: AtomicUsize,
  threads_in_use: AtomicUsize,
  peak_threads: AtomicUsize,
}

impl MockExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every chain holds its slot for `delay`, so overlapping workers are observable.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Succeeding links leave no files behind.
  pub fn without_outputs(mut self) -> Self {
    self.skip_outputs = true;
    self
  }

  pub fn fail_stage(self, stage: &str, needle: &str, exit_code: i32) -> Self {
    self.failures.lock().push(FailureRule {
      stage: stage.to_string(),
      needle: needle.to_string(),
      exit_code,
    });
    self
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().len()
  }

  pub fn stages_called(&self) -> Vec<String> {
    self.calls.lock().iter().map(|i| i.stage.clone()).collect()
  }

  /// Invocations of `stage` whose command line mentions `needle`.
  pub fn calls_matching(&self, stage: &str, needle: &str) -> Vec<Invocation> {
    self
      .calls
      .lock()
      .iter()
      .filter(|i| i.stage == stage && i.command_line().contains(needle))
      .cloned()
      .collect()
  }

  pub fn peak_active(&self) -> usize {
    self.peak_active.load(Ordering::SeqCst)
  }

  pub fn peak_threads(&self) -> usize {
    self.peak_threads.load(Ordering::SeqCst)
  }

  fn failure_for(&self, invocation: &Invocation) -> Option<i32> {
    let line = invocation.command_line();
    self
      .failures
      .lock()
      .iter()
      .find(|rule| rule.stage == invocation.stage && line.contains(&rule.needle))
      .map(|rule| rule.exit_code)
  }
}

#[async_trait]
impl ToolExecutor for MockExecutor {
  async fn execute(&self, chain: &[Invocation]) -> CallflowResult<Vec<ExecutionResult>> {
    let threads = chain.iter().map(|i| i.threads).max().unwrap_or(0);
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak_active.fetch_max(now, Ordering::SeqCst);
    let in_use = self.threads_in_use.fetch_add(threads, Ordering::SeqCst) + threads;
    self.peak_threads.fetch_max(in_use, Ordering::SeqCst);

    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }

    let mut results = Vec::with_capacity(chain.len());
    for invocation in chain {
      self.calls.lock().push(invocation.clone());
      if let Some(code) = self.failure_for(invocation) {
        results.push(ExecutionResult::failed(
          invocation.stage.clone(),
          code,
          format!("{} failed", invocation.program),
          Duration::from_millis(1),
        ));
        break;
      }
      if !self.skip_outputs {
        for path in &invocation.produces {
          touch(path);
        }
        if let Sink::File(path) = &invocation.stdout {
          touch(path);
        }
      }
      results.push(ExecutionResult::succeeded(invocation.stage.clone(), Duration::from_millis(1)));
    }

    self.threads_in_use.fetch_sub(threads, Ordering::SeqCst);
    self.active.fetch_sub(1, Ordering::SeqCst);
    Ok(results)
  }
}

pub fn touch(path: &Path) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, b"").unwrap();
}

// --- Workspace fixtures ---

/// Input, reference and output locations inside a temporary directory.
pub struct Workspace {
  pub root: tempfile::TempDir,
  pub input: PathBuf,
  pub reference: PathBuf,
  pub output: PathBuf,
}

impl Workspace {
  pub fn new() -> Self {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("reads");
    let output = root.path().join("out");
    let reference = root.path().join("ref").join("genome.fasta");
    std::fs::create_dir_all(&input).unwrap();
    touch(&reference);
    Self {
      root,
      input,
      reference,
      output,
    }
  }

  /// Creates empty read files with the given names.
  pub fn with_reads(self, names: &[&str]) -> Self {
    for name in names {
      touch(&self.input.join(name));
    }
    self
  }

  pub fn config(&self) -> RunConfig {
    RunConfig::new(&self.input, &self.reference, &self.output)
  }
}

// --- Small pipelines for executor-level tests ---

/// align | sort -> index, with the same artifact layout as the nanopore preset.
pub fn align_sort_index() -> PipelineDefinition {
  PipelineDefinition::new(
    "test-align",
    ReadLayout::SingleEnd,
    vec![
      StageDef::new("align", "aligner")
        .args(args(["-t", "{threads}", "{reference}", "{read1}"]))
        .pipe_to_next(),
      StageDef::new("sort", "sorter")
        .args(args(["-o", "{bam}", "-@", "{threads}"]))
        .from_pipe()
        .produces("{bam}"),
      StageDef::new("index", "indexer")
        .args(args(["{bam}"]))
        .requires("{bam}")
        .produces("{bai}"),
    ],
  )
  .with_artifact("bam", "bam/{sample}.bam")
  .with_artifact("bai", "{bam}.bai")
}
