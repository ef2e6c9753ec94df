// callflow/src/core/sample.rs

//! Defines `SampleUnit`, the unit of work scheduled per biological sample.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How read files map onto samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadLayout {
  /// One read file per sample.
  #[default]
  SingleEnd,
  /// Two adjacent read files (R1/R2) per sample.
  PairedEnd,
}

impl ReadLayout {
  pub fn files_per_sample(self) -> usize {
    match self {
      ReadLayout::SingleEnd => 1,
      ReadLayout::PairedEnd => 2,
    }
  }
}

/// One sample's input reads plus the output paths derived for it.
///
/// `outputs` is empty straight out of discovery and is filled in when the
/// sample is bound to a `PipelineDefinition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleUnit {
  pub name: String,
  pub reads: Vec<PathBuf>,
  pub outputs: BTreeMap<String, PathBuf>,
}

impl SampleUnit {
  pub fn new(name: impl Into<String>, reads: Vec<PathBuf>) -> Self {
    Self {
      name: name.into(),
      reads,
      outputs: BTreeMap::new(),
    }
  }

  pub fn is_paired(&self) -> bool {
    self.reads.len() == 2
  }

  /// Path of a declared artifact, e.g. `output("bam")`.
  pub fn output(&self, key: &str) -> Option<&Path> {
    self.outputs.get(key).map(PathBuf::as_path)
  }
}

/// Derives a sample name from a read file name: the part before the first
/// `.`, then before the first `_`. `S01_R1.fastq.gz` becomes `S01`.
///
/// Returns `None` when nothing is left.
pub fn derive_sample_name(path: &Path) -> Option<String> {
  let file_name = path.file_name()?.to_str()?;
  let stem = file_name.split('.').next().unwrap_or_default();
  let name = stem.split('_').next().unwrap_or_default();
  if name.is_empty() {
    None
  } else {
    Some(name.to_string())
  }
}
