// callflow-cli/src/report.rs

//! The JSON run summary written next to the outputs.

use anyhow::Context;
use callflow::RunSummary;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct RunReport {
  pub pipeline: String,
  pub exit_code: i32,
  pub elapsed_secs: f64,
  pub allocation: AllocationReport,
  pub prepared: Vec<String>,
  pub samples: Vec<SampleReport>,
  pub merge: Option<MergeReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub merge_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AllocationReport {
  pub total_threads: usize,
  pub parallelism: usize,
  pub quota: usize,
  pub peak_active: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
  Succeeded,
  Failed,
}

#[derive(Debug, Serialize)]
pub struct SampleReport {
  pub sample: String,
  pub status: SampleStatus,
  pub reads: Vec<PathBuf>,
  pub elapsed_secs: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failed_stage: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exit_code: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct MergeReport {
  pub intermediate: PathBuf,
  pub final_calls: PathBuf,
  pub included: Vec<String>,
  pub excluded: Vec<String>,
}

impl RunReport {
  pub fn from_summary(summary: &RunSummary) -> Self {
    let succeeded = summary.batch.succeeded.iter().map(|s| SampleReport {
      sample: s.sample.name.clone(),
      status: SampleStatus::Succeeded,
      reads: s.sample.reads.clone(),
      elapsed_secs: s.duration.as_secs_f64(),
      failed_stage: None,
      exit_code: None,
      error: None,
      artifacts: s.artifacts.clone(),
    });
    let failed = summary.batch.failed.iter().map(|f| SampleReport {
      sample: f.sample.name.clone(),
      status: SampleStatus::Failed,
      reads: f.sample.reads.clone(),
      elapsed_secs: f.duration.as_secs_f64(),
      failed_stage: f.stage.clone(),
      exit_code: f.execution.as_ref().and_then(|e| e.exit_code).or_else(|| f.error.exit_code()),
      error: Some(f.error.to_string()),
      artifacts: Vec::new(),
    });
    let mut samples: Vec<SampleReport> = succeeded.chain(failed).collect();
    samples.sort_by(|a, b| a.sample.cmp(&b.sample));

    Self {
      pipeline: summary.pipeline.clone(),
      exit_code: summary.exit_code(),
      elapsed_secs: summary.duration.as_secs_f64(),
      allocation: AllocationReport {
        total_threads: summary.allocation.total_threads,
        parallelism: summary.allocation.parallelism,
        quota: summary.allocation.quota,
        peak_active: summary.batch.peak_active,
      },
      prepared: summary.prepared.clone(),
      samples,
      merge: summary.merge.as_ref().map(|m| MergeReport {
        intermediate: m.merged.intermediate.clone(),
        final_calls: m.merged.final_calls.clone(),
        included: m.included.clone(),
        excluded: m.excluded.iter().map(|e| e.sample.clone()).collect(),
      }),
      merge_error: summary.merge_error.as_ref().map(ToString::to_string),
    }
  }

  pub fn write(&self, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(self).context("serializing run summary")?;
    std::fs::write(path, json).with_context(|| format!("writing run summary to '{}'", path.display()))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use callflow::{
    Allocation, BatchOutcome, CallflowError, ExecutionResult, MergeError, RunConfig, SampleFailure, SampleSuccess,
    SampleUnit,
  };
  use std::time::Duration;

  fn summary() -> RunSummary {
    let ok = SampleSuccess {
      sample: SampleUnit::new("s1", vec![PathBuf::from("in/s1.fastq")]),
      artifacts: vec![PathBuf::from("out/bam/s1.bam")],
      executions: Vec::new(),
      duration: Duration::from_secs(2),
    };
    let failed = SampleFailure {
      sample: SampleUnit::new("s0", vec![PathBuf::from("in/s0.fastq")]),
      stage: Some("align".to_string()),
      execution: Some(ExecutionResult::failed("align", 1, "bad input", Duration::from_secs(1))),
      error: CallflowError::ChainFailure {
        stage: "align".to_string(),
        exit_code: Some(1),
        stderr: "bad input".to_string(),
      },
      completed_stages: Vec::new(),
      duration: Duration::from_secs(1),
    };
    RunSummary {
      pipeline: "ont-variants".to_string(),
      config: RunConfig::new("in", "ref.fa", "out"),
      allocation: Allocation {
        total_threads: 4,
        parallelism: 2,
        quota: 2,
      },
      prepared: Vec::new(),
      batch: BatchOutcome {
        succeeded: vec![ok],
        failed: vec![failed],
        peak_active: 2,
      },
      merge: None,
      merge_error: None,
      duration: Duration::from_secs(3),
    }
  }

  #[test]
  fn report_lists_failures_with_stage_and_exit_code() {
    let report = RunReport::from_summary(&summary());
    assert_eq!(report.exit_code, callflow::EXIT_PARTIAL);
    assert_eq!(report.samples.len(), 2);

    let failed = &report.samples[0];
    assert_eq!(failed.sample, "s0");
    assert_eq!(failed.failed_stage.as_deref(), Some("align"));
    assert_eq!(failed.exit_code, Some(1));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["samples"][0]["status"], "failed");
    assert_eq!(json["samples"][1]["status"], "succeeded");
    assert!(json["samples"][1].get("failed_stage").is_none());
  }

  #[test]
  fn report_is_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_summary.json");
    RunReport::from_summary(&summary()).write(&path).unwrap();

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["allocation"]["quota"], 2);
  }

  #[test]
  fn failed_merge_keeps_sample_outcomes_and_is_fatal() {
    let mut summary = summary();
    summary.merge_error = Some(CallflowError::Merge(MergeError::StepFailed {
      step: "combine_gvcfs".to_string(),
      source: Box::new(CallflowError::StageFailed {
        stage: "combine_gvcfs".to_string(),
        exit_code: Some(3),
        stderr: String::new(),
      }),
    }));

    let report = RunReport::from_summary(&summary);
    assert_eq!(report.exit_code, callflow::EXIT_FATAL);
    assert_eq!(report.samples.len(), 2);
    let json = serde_json::to_value(&report).unwrap();
    assert!(json["merge_error"].as_str().unwrap().contains("combine_gvcfs"));
  }
}
