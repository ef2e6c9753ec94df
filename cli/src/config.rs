// callflow-cli/src/config.rs

use callflow::config::{DEFAULT_COHORT_NAME, DEFAULT_PARALLELISM, DEFAULT_TOTAL_THREADS};
use callflow::{PipelinePreset, RunConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
  /// Nanopore alignment, per-sample variant calling and cohort merge.
  OntVariants,
  /// Paired-end short-read assembly with mapping QC.
  ShortReadAssembly,
}

impl From<PresetArg> for PipelinePreset {
  fn from(arg: PresetArg) -> Self {
    match arg {
      PresetArg::OntVariants => PipelinePreset::OntVariants,
      PresetArg::ShortReadAssembly => PipelinePreset::ShortReadAssembly,
    }
  }
}

/// Runs a read-to-variants pipeline over every sample in a directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "callflow", version, about)]
pub struct AppConfig {
  /// Directory containing the read files.
  #[arg(short = 'i', long, env = "CALLFLOW_INPUT")]
  pub input: PathBuf,

  /// Reference genome (FASTA).
  #[arg(short = 'r', long, env = "CALLFLOW_REFERENCE")]
  pub reference: PathBuf,

  /// Output directory; created if missing.
  #[arg(short = 'o', long, env = "CALLFLOW_OUTPUT")]
  pub output: PathBuf,

  /// Total thread budget shared by all workers.
  #[arg(short = 't', long, env = "CALLFLOW_THREADS", default_value_t = DEFAULT_TOTAL_THREADS)]
  pub threads: usize,

  /// Number of samples processed at once.
  #[arg(short = 'p', long, env = "CALLFLOW_PARALLELISM", default_value_t = DEFAULT_PARALLELISM)]
  pub parallelism: usize,

  #[arg(long, env = "CALLFLOW_PRESET", value_enum, default_value_t = PresetArg::OntVariants)]
  pub preset: PresetArg,

  /// Base name of the cohort outputs (`<name>.g.vcf`, `<name>.vcf`).
  #[arg(long, env = "CALLFLOW_COHORT_NAME", default_value = DEFAULT_COHORT_NAME)]
  pub cohort_name: String,

  /// Read file suffixes to pick up; repeat or comma-separate. Defaults to
  /// the usual FASTQ suffixes.
  #[arg(long = "suffix", env = "CALLFLOW_SUFFIXES", value_delimiter = ',')]
  pub suffixes: Vec<String>,

  /// Skip one-off preparation stages such as container image pulls.
  #[arg(long, env = "CALLFLOW_SKIP_PREPARE")]
  pub skip_prepare: bool,

  /// Where to write the JSON run summary. Defaults to
  /// `<output>/run_summary.json`.
  #[arg(long, env = "CALLFLOW_SUMMARY")]
  pub summary: Option<PathBuf>,
}

impl AppConfig {
  /// Loads `.env` if present, then parses the command line.
  pub fn load() -> Self {
    dotenvy::dotenv().ok();
    Self::parse()
  }

  /// Thread and parallelism values are passed through as given; the
  /// library's allocator rejects invalid ones.
  pub fn run_config(&self) -> RunConfig {
    let mut config = RunConfig::new(&self.input, &self.reference, &self.output)
      .with_threads(self.threads)
      .with_parallelism(self.parallelism)
      .with_cohort_name(self.cohort_name.clone())
      .with_prepare(!self.skip_prepare);
    if !self.suffixes.is_empty() {
      config = config.with_read_suffixes(self.suffixes.iter().cloned());
    }
    config
  }

  pub fn summary_path(&self, config: &RunConfig) -> PathBuf {
    self
      .summary
      .clone()
      .unwrap_or_else(|| config.output_path("run_summary.json"))
  }
}
