// tests/allocation_tests.rs
mod common;

use callflow::{CallflowError, ResourceAllocator};
use common::*;

#[test]
fn quota_partitions_budget_without_oversubscription() {
  setup_tracing();
  for total in 1..=32 {
    for parallelism in 1..=total {
      let a = ResourceAllocator::allocate(total, parallelism).unwrap();
      assert!(a.quota >= 1, "T={total} P={parallelism}");
      assert!(a.quota * a.parallelism <= total, "T={total} P={parallelism} quota={}", a.quota);
      assert_eq!(a.parallelism, parallelism);
      assert_eq!(a.quota, total / parallelism);
    }
  }
}

#[test]
fn remainder_threads_stay_unused() {
  let a = ResourceAllocator::allocate(10, 3).unwrap();
  assert_eq!(a.quota, 3);
  assert_eq!(a.unused(), 1);
}

#[test]
fn default_configuration_gives_one_worker_with_whole_budget() {
  let a = ResourceAllocator::allocate(4, 1).unwrap();
  assert_eq!((a.parallelism, a.quota), (1, 4));
}

#[test]
fn parallelism_above_budget_is_clamped() {
  setup_tracing();
  let a = ResourceAllocator::allocate(2, 8).unwrap();
  assert_eq!(a.parallelism, 2);
  assert_eq!(a.quota, 1);
  assert!(a.quota * a.parallelism <= a.total_threads);
}

#[test]
fn zero_values_are_allocation_errors() {
  assert!(matches!(
    ResourceAllocator::allocate(0, 1),
    Err(CallflowError::Allocation { total_threads: 0, .. })
  ));
  assert!(matches!(
    ResourceAllocator::allocate(4, 0),
    Err(CallflowError::Allocation { parallelism: 0, .. })
  ));
}

#[test]
fn allocation_reads_run_config() {
  let ws = Workspace::new();
  let config = ws.config().with_threads(8).with_parallelism(2);
  let a = ResourceAllocator::from_config(&config).unwrap();
  assert_eq!(a.quota, 4);
}
