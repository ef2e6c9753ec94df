// callflow/src/discovery.rs

//! Turns an input location into the ordered list of `SampleUnit`s for a run.

use crate::core::sample::{derive_sample_name, ReadLayout, SampleUnit};
use crate::error::{CallflowResult, DiscoveryError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{event, instrument, Level};

/// Scans a directory tree for read files and groups them into samples.
#[derive(Debug, Clone)]
pub struct SampleDiscovery {
  location: PathBuf,
  suffixes: Vec<String>,
  layout: ReadLayout,
}

impl SampleDiscovery {
  pub fn new(location: impl Into<PathBuf>, suffixes: &[String], layout: ReadLayout) -> Self {
    Self {
      location: location.into(),
      suffixes: suffixes.iter().filter(|s| !s.is_empty()).cloned().collect(),
      layout,
    }
  }

  pub fn from_config(config: &crate::RunConfig, layout: ReadLayout) -> Self {
    Self::new(&config.input_dir, &config.read_suffixes, layout)
  }

  /// Returns every matching read file under the location, sorted by path.
  pub fn read_files(&self) -> CallflowResult<Vec<PathBuf>> {
    if !self.location.is_dir() {
      event!(Level::WARN, location = %self.location.display(), "Input location is not a directory.");
      return Err(self.no_samples().into());
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(&self.location).follow_links(true) {
      let entry = entry.map_err(|source| DiscoveryError::Unreadable {
        location: self.location.clone(),
        source,
      })?;
      let path = entry.path();
      if entry.file_type().is_file() && self.matches(path) {
        files.push(path.to_path_buf());
      }
    }
    files.sort();
    Ok(files)
  }

  /// Discovers samples. Same directory contents always give the same list.
  #[instrument(
    name = "SampleDiscovery::discover",
    skip_all,
    fields(location = %self.location.display(), layout = ?self.layout),
    err(Display)
  )]
  pub fn discover(&self) -> CallflowResult<Vec<SampleUnit>> {
    let files = self.read_files()?;
    if files.is_empty() {
      return Err(self.no_samples().into());
    }

    let samples = match self.layout {
      ReadLayout::SingleEnd => files
        .into_iter()
        .map(|path| Ok(SampleUnit::new(name_of(&path)?, vec![path])))
        .collect::<Result<Vec<_>, DiscoveryError>>()?,
      ReadLayout::PairedEnd => pair_adjacent(files)?,
    };

    ensure_unique(&samples)?;
    event!(Level::INFO, samples = samples.len(), "Samples discovered.");
    Ok(samples)
  }

  fn matches(&self, path: &Path) -> bool {
    path
      .file_name()
      .and_then(|n| n.to_str())
      .map_or(false, |name| self.suffixes.iter().any(|s| name.ends_with(s.as_str())))
  }

  fn no_samples(&self) -> DiscoveryError {
    DiscoveryError::NoSamples {
      location: self.location.clone(),
      suffixes: self.suffixes.clone(),
    }
  }
}

fn name_of(path: &Path) -> Result<String, DiscoveryError> {
  derive_sample_name(path).ok_or_else(|| DiscoveryError::InvalidSampleName {
    path: path.to_path_buf(),
  })
}

// Sorted R1/R2 files sit next to each other; both must name the same sample.
fn pair_adjacent(files: Vec<PathBuf>) -> Result<Vec<SampleUnit>, DiscoveryError> {
  if files.len() % 2 != 0 {
    return Err(DiscoveryError::UnpairedReads {
      count: files.len(),
      last: files.last().cloned().unwrap_or_default(),
    });
  }

  let mut samples = Vec::with_capacity(files.len() / 2);
  for pair in files.chunks_exact(2) {
    let (first, second) = (&pair[0], &pair[1]);
    let first_name = name_of(first)?;
    let second_name = name_of(second)?;
    if first_name != second_name {
      return Err(DiscoveryError::PairMismatch {
        first: first.clone(),
        second: second.clone(),
        first_name,
        second_name,
      });
    }
    samples.push(SampleUnit::new(first_name, pair.to_vec()));
  }
  Ok(samples)
}

fn ensure_unique(samples: &[SampleUnit]) -> Result<(), DiscoveryError> {
  let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(samples.len());
  for sample in samples {
    let first_read = sample.reads[0].as_path();
    if let Some(previous) = seen.insert(sample.name.as_str(), first_read) {
      return Err(DiscoveryError::DuplicateSample {
        name: sample.name.clone(),
        first: previous.to_path_buf(),
        second: first_read.to_path_buf(),
      });
    }
  }
  Ok(())
}
