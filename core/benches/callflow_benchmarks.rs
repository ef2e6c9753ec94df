use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use callflow::{
  arg, flagged, spread, CallflowResult, ExecutionResult, Invocation, ParallelScheduler, PipelineExecutor,
  PipelinePreset, RunConfig, SampleUnit, StageRunner, TemplateVars, ToolExecutor,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime; // To run async code within Criterion

// --- Executor that only measures orchestration overhead ---
struct NoopExecutor;

#[async_trait]
impl ToolExecutor for NoopExecutor {
  async fn execute(&self, chain: &[Invocation]) -> CallflowResult<Vec<ExecutionResult>> {
    for invocation in chain {
      for path in &invocation.produces {
        let _ = std::fs::write(path, b"");
      }
    }
    Ok(chain.iter().map(|i| ExecutionResult::succeeded(i.stage.clone(), Duration::ZERO)).collect())
  }
}

fn bench_template_rendering(c: &mut Criterion) {
  let mut group = c.benchmark_group("TemplateRendering");

  for inputs in [1usize, 16, 256].iter() {
    let mut vars = TemplateVars::new();
    vars
      .set("reference", "/data/ref/genome.fasta")
      .set("intermediate", "/data/out/cohort.g.vcf")
      .set("threads", "8")
      .set_list("inputs", (0..*inputs).map(|i| format!("/data/out/pepper/s{i}/s{i}.g.vcf.gz")));
    let template = vec![
      arg("CombineGVCFs"),
      flagged("-V", "inputs"),
      arg("-R"),
      arg("{reference}"),
      arg("-O"),
      arg("{intermediate}"),
      spread("inputs"),
    ];

    group.throughput(Throughput::Elements(*inputs as u64));
    group.bench_with_input(BenchmarkId::new("combine_args", inputs), inputs, |b, _| {
      b.iter(|| vars.render_args("combine", &template).unwrap())
    });
  }
  group.finish();
}

fn bench_sample_binding(c: &mut Criterion) {
  let mut group = c.benchmark_group("SampleBinding");
  let definition = PipelinePreset::OntVariants.definition();
  let config = RunConfig::new("/data/reads", "/data/ref/genome.fasta", "/data/out");

  for samples in [10usize, 100, 1000].iter() {
    let units: Vec<SampleUnit> = (0..*samples)
      .map(|i| SampleUnit::new(format!("s{i}"), vec![PathBuf::from(format!("/data/reads/s{i}.fastq"))]))
      .collect();
    group.throughput(Throughput::Elements(*samples as u64));
    group.bench_with_input(BenchmarkId::new("bind", samples), samples, |b, _| {
      b.iter(|| definition.bind(units.clone(), &config).unwrap())
    });
  }
  group.finish();
}

fn bench_scheduler_dispatch(c: &mut Criterion) {
  let mut group = c.benchmark_group("SchedulerDispatch");
  let rt = Runtime::new().unwrap();
  let dir = tempfile::tempdir().unwrap();
  let config = RunConfig::new(dir.path().join("reads"), dir.path().join("genome.fasta"), dir.path().join("out"));
  std::fs::write(&config.reference, b"").unwrap();

  let definition = PipelinePreset::OntVariants.definition();
  let units: Vec<SampleUnit> = (0..64)
    .map(|i| SampleUnit::new(format!("s{i}"), vec![dir.path().join(format!("s{i}.fastq"))]))
    .collect();
  let samples = definition.bind(units, &config).unwrap();
  for out_dir in definition.output_dirs(&samples, &config) {
    std::fs::create_dir_all(out_dir).unwrap();
  }
  let definition = Arc::new(definition);
  let runner = StageRunner::new(Arc::new(NoopExecutor));

  for parallelism in [1usize, 4, 16].iter() {
    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_with_input(BenchmarkId::new("64_samples", parallelism), parallelism, |b, &p| {
      b.to_async(&rt).iter_batched(
        || {
          let executor = PipelineExecutor::new(definition.clone(), runner.clone(), &config, 1);
          (ParallelScheduler::new(executor, p), samples.clone())
        },
        |(scheduler, samples)| async move { scheduler.dispatch(samples).unwrap().wait().await.unwrap() },
        criterion::BatchSize::SmallInput,
      );
    });
  }
  group.finish();
}

criterion_group!(
  benches,
  bench_template_rendering,
  bench_sample_binding,
  bench_scheduler_dispatch
);
criterion_main!(benches);
