// tests/executor_tests.rs
mod common;

use callflow::{
  args, CallflowError, PipelineDefinition, PipelineExecutor, ReadLayout, SampleResult, SampleUnit, StageDef,
  StageRunner, Threads,
};
use common::*;
use std::sync::Arc;

struct Fixture {
  ws: Workspace,
  mock: Arc<MockExecutor>,
  executor: PipelineExecutor,
  sample: SampleUnit,
}

fn fixture(definition: PipelineDefinition, mock: MockExecutor, quota: usize) -> Fixture {
  let ws = Workspace::new().with_reads(&["s1.fastq"]);
  let config = ws.config();
  let mock = Arc::new(mock);
  let sample = definition
    .bind(vec![SampleUnit::new("s1", vec![ws.input.join("s1.fastq")])], &config)
    .unwrap()
    .remove(0);
  let executor = PipelineExecutor::new(Arc::new(definition), StageRunner::new(mock.clone()), &config, quota);
  Fixture {
    ws,
    mock,
    executor,
    sample,
  }
}

#[tokio::test]
async fn stages_run_in_order_with_rendered_arguments() {
  setup_tracing();
  let f = fixture(align_sort_index(), MockExecutor::new(), 3);

  let result = f.executor.run(f.sample.clone()).await;
  let SampleResult::Succeeded(success) = result else {
    panic!("expected success");
  };
  assert_eq!(f.mock.stages_called(), vec!["align", "sort", "index"]);
  assert_eq!(success.executions.len(), 3);
  assert_eq!(success.artifacts, vec![f.ws.output.join("bam/s1.bam"), f.ws.output.join("bam/s1.bam.bai")]);

  let calls = f.mock.calls();
  let reference = f.ws.reference.display().to_string();
  let read = f.ws.input.join("s1.fastq").display().to_string();
  assert_eq!(calls[0].args, vec!["-t", "3", reference.as_str(), read.as_str()]);
  assert!(calls.iter().all(|c| c.threads == 3));
}

#[tokio::test]
async fn failing_stage_stops_the_sample() {
  setup_tracing();
  let f = fixture(align_sort_index(), MockExecutor::new().fail_stage("sort", "", 2), 1);

  let SampleResult::Failed(failure) = f.executor.run(f.sample.clone()).await else {
    panic!("expected failure");
  };
  assert_eq!(failure.stage.as_deref(), Some("sort"));
  assert!(matches!(failure.error, CallflowError::ChainFailure { exit_code: Some(2), .. }));
  assert_eq!(failure.execution.and_then(|e| e.exit_code), Some(2));
  assert!(failure.completed_stages.is_empty());
  assert!(!f.mock.stages_called().contains(&"index".to_string()));
}

#[tokio::test]
async fn upstream_failure_never_starts_downstream() {
  setup_tracing();
  let f = fixture(align_sort_index(), MockExecutor::new().fail_stage("align", "s1", 1), 2);

  let result = f.executor.run(f.sample.clone()).await;
  assert!(!result.is_success());
  assert_eq!(f.mock.stages_called(), vec!["align"]);
}

#[tokio::test]
async fn missing_required_artifact_fails_before_invocation() {
  setup_tracing();
  let def = PipelineDefinition::new(
    "t",
    ReadLayout::SingleEnd,
    vec![StageDef::new("call", "caller").requires("{out}/{sample}.bam")],
  );
  let f = fixture(def, MockExecutor::new(), 1);

  let SampleResult::Failed(failure) = f.executor.run(f.sample.clone()).await else {
    panic!("expected failure");
  };
  assert!(matches!(failure.error, CallflowError::MissingArtifact { ref stage, .. } if stage == "call"));
  assert!(failure.execution.is_none());
  assert_eq!(f.mock.call_count(), 0);
}

#[tokio::test]
async fn missing_produced_artifact_fails_the_stage() {
  setup_tracing();
  let def = PipelineDefinition::new(
    "t",
    ReadLayout::SingleEnd,
    vec![StageDef::new("call", "caller").produces("{out}/{sample}.vcf")],
  );
  let f = fixture(def, MockExecutor::new().without_outputs(), 1);

  let SampleResult::Failed(failure) = f.executor.run(f.sample.clone()).await else {
    panic!("expected failure");
  };
  assert!(matches!(failure.error, CallflowError::MissingArtifact { ref path, .. } if path.ends_with("s1.vcf")));
  assert_eq!(f.mock.call_count(), 1);
}

#[tokio::test]
async fn stage_with_existing_marker_is_skipped() {
  setup_tracing();
  let def = PipelineDefinition::new(
    "t",
    ReadLayout::SingleEnd,
    vec![
      StageDef::new("index_reference", "indexer")
        .args(args(["{reference}"]))
        .skip_if_present("{reference}.fai"),
      StageDef::new("align", "aligner").args(args(["{read1}"])),
    ],
  );
  let f = fixture(def, MockExecutor::new(), 1);
  touch(&f.ws.reference.with_extension("fasta.fai"));

  let result = f.executor.run(f.sample.clone()).await;
  assert!(result.is_success());
  assert_eq!(f.mock.stages_called(), vec!["align"]);
}

#[tokio::test]
async fn fixed_thread_stages_are_capped_by_quota() {
  setup_tracing();
  let def = PipelineDefinition::new(
    "t",
    ReadLayout::SingleEnd,
    vec![
      StageDef::new("light", "tool").threads(Threads::Fixed(1)),
      StageDef::new("greedy", "tool").threads(Threads::Fixed(64)),
    ],
  );
  let f = fixture(def, MockExecutor::new(), 4);

  assert!(f.executor.run(f.sample.clone()).await.is_success());
  let threads: Vec<_> = f.mock.calls().iter().map(|c| c.threads).collect();
  assert_eq!(threads, vec![1, 4]);
}

#[tokio::test]
async fn unknown_placeholder_fails_the_stage() {
  setup_tracing();
  let def = PipelineDefinition::new(
    "t",
    ReadLayout::SingleEnd,
    vec![StageDef::new("align", "aligner").args(args(["{nope}"]))],
  );
  let f = fixture(def, MockExecutor::new(), 1);

  let SampleResult::Failed(failure) = f.executor.run(f.sample.clone()).await else {
    panic!("expected failure");
  };
  assert_eq!(failure.stage.as_deref(), Some("align"));
  assert!(matches!(failure.error, CallflowError::Template { .. }));
}
