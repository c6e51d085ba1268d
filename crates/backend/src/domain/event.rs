use std::path::PathBuf;

use super::project::Project;

/// Kind of filesystem change delivered to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
  Add,
  Change,
  Unlink,
}

impl std::fmt::Display for FileEventKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FileEventKind::Add => write!(f, "add"),
      FileEventKind::Change => write!(f, "change"),
      FileEventKind::Unlink => write!(f, "unlink"),
    }
  }
}

/// A settled file event for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
  pub kind: FileEventKind,
  /// Absolute path of the file
  pub path: PathBuf,
  pub project: Project,
}

impl FileEvent {
  pub fn new(kind: FileEventKind, path: impl Into<PathBuf>, project: Project) -> Self {
    Self {
      kind,
      path: path.into(),
      project,
    }
  }
}
