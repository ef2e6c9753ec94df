// callflow-cli/src/main.rs

mod config;
mod errors;
mod report;

use crate::config::AppConfig;
use crate::errors::Result as AppResult;
use crate::report::RunReport;

use callflow::{Orchestrator, PipelinePreset, ProcessExecutor, EXIT_FATAL};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> ExitCode {
  // RUST_LOG overrides the default level.
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_span_events(FmtSpan::CLOSE)
    .with_writer(std::io::stderr)
    .init();

  let app_config = AppConfig::load();
  match run(app_config).await {
    Ok(code) => ExitCode::from(code as u8),
    Err(e) => {
      tracing::error!(error = %e, stage = ?e.stage(), "Run aborted.");
      ExitCode::from(EXIT_FATAL as u8)
    }
  }
}

async fn run(app_config: AppConfig) -> AppResult<i32> {
  let preset = PipelinePreset::from(app_config.preset);
  let run_config = app_config.run_config();
  tracing::info!(
    preset = %preset,
    input = %run_config.input_dir.display(),
    output = %run_config.output_dir.display(),
    threads = run_config.total_threads,
    parallelism = run_config.parallelism,
    "Starting callflow run."
  );

  let executor = Arc::new(ProcessExecutor::from_config(&run_config));
  let orchestrator = Orchestrator::new(run_config, preset.definition(), executor);
  let summary = orchestrator.run().await?;

  for failure in &summary.batch.failed {
    tracing::warn!(
      sample = %failure.sample.name,
      stage = ?failure.stage,
      error = %failure.error,
      "Sample failed."
    );
  }
  if let Some(err) = &summary.merge_error {
    tracing::error!(error = %err, stage = ?err.stage(), "Cohort merge failed; sample outcomes are kept in the run summary.");
  }
  if let Some(merge) = &summary.merge {
    tracing::info!(final_calls = %merge.merged.final_calls.display(), included = merge.included.len(), "Cohort callset written.");
  }

  let summary_path = app_config.summary_path(&summary.config);
  RunReport::from_summary(&summary).write(&summary_path)?;
  tracing::info!(path = %summary_path.display(), "Run summary written.");

  Ok(summary.exit_code())
}
