// callflow/src/scheduler.rs

//! Dispatches `SampleUnit`s onto a bounded pool of workers and exposes a
//! completion barrier over their results.
//!
//! Phases move strictly `Idle -> Dispatching -> AllCompleted`. Samples are
//! admitted in submission order as slots free up; at most `parallelism`
//! executors are ever active.

use crate::core::outcome::{SampleFailure, SampleResult, SampleSuccess};
use crate::core::sample::SampleUnit;
use crate::error::{CallflowError, CallflowResult};
use crate::pipeline::execution::PipelineExecutor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{event, Instrument, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
  Idle,
  Dispatching,
  AllCompleted,
}

/// Every sample's terminal result, split by outcome. Only obtainable from
/// `CompletionBarrier::wait`.
#[derive(Debug)]
pub struct BatchOutcome {
  pub succeeded: Vec<SampleSuccess>,
  pub failed: Vec<SampleFailure>,
  /// Highest number of executors observed running at once.
  pub peak_active: usize,
}

impl BatchOutcome {
  pub fn total(&self) -> usize {
    self.succeeded.len() + self.failed.len()
  }

  pub fn all_succeeded(&self) -> bool {
    self.failed.is_empty()
  }

  pub fn failed_names(&self) -> Vec<String> {
    self.failed.iter().map(|f| f.sample.name.clone()).collect()
  }

  pub fn succeeded_names(&self) -> Vec<String> {
    self.succeeded.iter().map(|s| s.sample.name.clone()).collect()
  }

  fn from_results(results: Vec<SampleResult>, peak_active: usize) -> Self {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for result in results {
      match result {
        SampleResult::Succeeded(s) => succeeded.push(s),
        SampleResult::Failed(f) => failed.push(f),
      }
    }
    Self {
      succeeded,
      failed,
      peak_active,
    }
  }
}

#[derive(Default)]
struct ActivityCounter {
  active: AtomicUsize,
  peak: AtomicUsize,
}

impl ActivityCounter {
  fn enter(self: &Arc<Self>) -> ActiveGuard {
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    ActiveGuard(self.clone())
  }
}

// Decrements on drop so a panicking worker still frees its slot in the count.
struct ActiveGuard(Arc<ActivityCounter>);

impl Drop for ActiveGuard {
  fn drop(&mut self) {
    self.0.active.fetch_sub(1, Ordering::SeqCst);
  }
}

pub struct ParallelScheduler {
  executor: PipelineExecutor,
  parallelism: usize,
  phase: Arc<Mutex<SchedulerPhase>>,
  activity: Arc<ActivityCounter>,
}

impl ParallelScheduler {
  pub fn new(executor: PipelineExecutor, parallelism: usize) -> Self {
    Self {
      executor,
      parallelism: parallelism.max(1),
      phase: Arc::new(Mutex::new(SchedulerPhase::Idle)),
      activity: Arc::new(ActivityCounter::default()),
    }
  }

  pub fn phase(&self) -> SchedulerPhase {
    *self.phase.lock()
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism
  }

  /// Number of executors currently running.
  pub fn active(&self) -> usize {
    self.activity.active.load(Ordering::SeqCst)
  }

  /// Starts dispatching `samples` in order and returns the barrier that
  /// resolves once every one of them has a terminal result.
  ///
  /// Must be called from within a tokio runtime. A scheduler dispatches
  /// exactly once.
  pub fn dispatch(&self, samples: Vec<SampleUnit>) -> CallflowResult<CompletionBarrier> {
    {
      let mut phase = self.phase.lock();
      if *phase != SchedulerPhase::Idle {
        return Err(CallflowError::config(format!(
          "scheduler already dispatched (phase {:?})",
          *phase
        )));
      }
      *phase = SchedulerPhase::Dispatching;
    }

    let total = samples.len();
    event!(Level::INFO, samples = total, parallelism = self.parallelism, "Dispatching samples.");

    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let executor = self.executor.clone();
    let activity = self.activity.clone();
    let driver_span = tracing::info_span!("scheduler_dispatch", samples = total, parallelism = self.parallelism);

    let driver = tokio::spawn(
      async move {
        let mut handles: Vec<(SampleUnit, JoinHandle<SampleResult>)> = Vec::with_capacity(total);
        for sample in samples {
          let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
              // The semaphore is owned here and never closed.
              let failed = worker_failure(sample.clone(), format!("worker slot unavailable: {e}"));
              handles.push((sample, tokio::spawn(async move { failed })));
              continue;
            }
          };
          event!(Level::DEBUG, sample = %sample.name, "Sample admitted.");

          let executor = executor.clone();
          let activity = activity.clone();
          let worker_sample = sample.clone();
          let handle = tokio::spawn(async move {
            let _permit = permit;
            let _active = activity.enter();
            executor.run(worker_sample).await
          });
          handles.push((sample, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (sample, handle) in handles {
          match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
              event!(Level::ERROR, sample = %sample.name, error = %e, "Worker task died.");
              results.push(worker_failure(sample, format!("worker task died: {e}")));
            }
          }
        }
        results
      }
      .instrument(driver_span),
    );

    Ok(CompletionBarrier {
      driver,
      phase: self.phase.clone(),
      activity: self.activity.clone(),
    })
  }
}

fn worker_failure(sample: SampleUnit, message: String) -> SampleResult {
  SampleResult::Failed(SampleFailure {
    sample,
    stage: None,
    execution: None,
    error: CallflowError::Internal(message),
    completed_stages: Vec::new(),
    duration: Duration::ZERO,
  })
}

/// Resolves once every dispatched sample has reached a terminal result.
///
/// Waiting consumes the barrier, so a partial set of results is never
/// observable.
pub struct CompletionBarrier {
  driver: JoinHandle<Vec<SampleResult>>,
  phase: Arc<Mutex<SchedulerPhase>>,
  activity: Arc<ActivityCounter>,
}

impl CompletionBarrier {
  pub async fn wait(self) -> CallflowResult<BatchOutcome> {
    let results = self
      .driver
      .await
      .map_err(|e| CallflowError::Internal(format!("dispatch driver died: {e}")))?;
    *self.phase.lock() = SchedulerPhase::AllCompleted;

    let outcome = BatchOutcome::from_results(results, self.activity.peak.load(Ordering::SeqCst));
    event!(
      Level::INFO,
      succeeded = outcome.succeeded.len(),
      failed = outcome.failed.len(),
      peak_active = outcome.peak_active,
      "All samples reached a terminal result."
    );
    Ok(outcome)
  }
}
