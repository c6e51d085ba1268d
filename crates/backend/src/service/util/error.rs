//! Error type for orchestrator operations.
//!
//! Failures are reported per file; nothing here is fatal to the process.
//! [`IndexError::kind`] buckets each error so callers can decide between
//! retrying later, surfacing a setup problem, or flagging a data-integrity risk.

use std::path::PathBuf;

use crate::{context::files::extract::ExtractError, db::DbError, embedding::EmbeddingError};

/// Coarse error classes used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// File temporarily unreadable, network hiccup, store unreachable
  TransientIo,
  /// No reachable embedding provider, missing credential, wrong vector size
  Configuration,
  /// Old vectors were deleted but the replacement write failed
  Consistency,
  Other,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Embedding error: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("Vector store error: {0}")]
  Store(#[from] DbError),
  #[error("Extraction error: {0}")]
  Extract(#[from] ExtractError),
  /// Delete+insert did not complete after all attempts
  #[error("Failed to replace vectors for {} after {attempts} attempts: {source}", .path.display())]
  Consistency {
    path: PathBuf,
    attempts: u32,
    #[source]
    source: DbError,
  },
  #[error("Path is outside the project root: {}", .0.display())]
  InvalidPath(PathBuf),
}

impl IndexError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Io(_) => ErrorKind::TransientIo,
      Self::Embedding(e) => match e {
        EmbeddingError::NoApiKey | EmbeddingError::Unavailable { .. } => ErrorKind::Configuration,
        EmbeddingError::Status { status, .. } if *status == 401 || *status == 403 => ErrorKind::Configuration,
        _ => ErrorKind::TransientIo,
      },
      Self::Store(DbError::DimensionMismatch { .. }) => ErrorKind::Configuration,
      Self::Store(DbError::Lance(_) | DbError::Io(_)) => ErrorKind::TransientIo,
      Self::Store(_) => ErrorKind::Other,
      Self::Extract(ExtractError::Io(_)) => ErrorKind::TransientIo,
      Self::Extract(_) => ErrorKind::Other,
      Self::Consistency { .. } => ErrorKind::Consistency,
      Self::InvalidPath(_) => ErrorKind::Other,
    }
  }
}
