// callflow/src/allocator.rs

//! Partitions the run's thread budget across parallel workers, once, up front.

use crate::error::{CallflowError, CallflowResult};
use tracing::{event, Level};

/// The outcome of partitioning `total_threads` across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
  pub total_threads: usize,
  /// Number of workers that may run at once.
  pub parallelism: usize,
  /// Thread count handed to each worker's tools.
  pub quota: usize,
}

impl Allocation {
  /// Threads never handed to any worker. Kept idle rather than redistributed.
  pub fn unused(&self) -> usize {
    self.total_threads - self.quota * self.parallelism
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceAllocator;

impl ResourceAllocator {
  /// Computes `quota = floor(total / parallelism)`, at least 1.
  ///
  /// A parallelism larger than the budget is clamped to the budget so that
  /// `quota * parallelism <= total` always holds.
  pub fn allocate(total_threads: usize, parallelism: usize) -> CallflowResult<Allocation> {
    if total_threads == 0 || parallelism == 0 {
      return Err(CallflowError::Allocation {
        total_threads,
        parallelism,
        message: "thread budget and parallelism must both be positive".to_string(),
      });
    }

    let effective = if parallelism > total_threads {
      event!(
        Level::WARN,
        requested = parallelism,
        effective = total_threads,
        "Parallelism exceeds the thread budget; clamping to one thread per worker."
      );
      total_threads
    } else {
      parallelism
    };

    let allocation = Allocation {
      total_threads,
      parallelism: effective,
      quota: (total_threads / effective).max(1),
    };
    event!(
      Level::DEBUG,
      total_threads,
      parallelism = allocation.parallelism,
      quota = allocation.quota,
      unused = allocation.unused(),
      "Thread budget partitioned."
    );
    Ok(allocation)
  }

  pub fn from_config(config: &crate::RunConfig) -> CallflowResult<Allocation> {
    Self::allocate(config.total_threads, config.parallelism)
  }
}
