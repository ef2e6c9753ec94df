// callflow-cli/src/errors.rs

use callflow::CallflowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Callflow Run Error: {source}")]
  Run {
    #[from]
    source: CallflowError,
  },

  #[error("Internal Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<CallflowError>() {
      Ok(source) => AppError::Run { source },
      Err(err) => AppError::Internal(format!("{err:#}")),
    }
  }
}

impl AppError {
  /// The stage a fatal run error is attributed to, for the final log line.
  pub fn stage(&self) -> Option<&str> {
    match self {
      AppError::Run { source } => source.stage(),
      _ => None,
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
