//! Messages exchanged between the watcher, the indexer actor and its callers

use std::{path::PathBuf, sync::Arc};

use crate::{
  context::files::ignore::IgnoreRuleSet,
  domain::{event::FileEvent, project::Project},
  service::{code::IndexOutcome, util::IndexError},
};

// ============================================================================
// Indexer Actor Messages
// ============================================================================

/// A unit of work for the IndexerActor
#[derive(Debug)]
pub enum IndexJob {
  /// A settled file event
  Event(FileEvent),
  /// Drop vectors of files the given rule set now ignores
  Cleanup { project: Project, rules: Arc<IgnoreRuleSet> },
  /// A directory disappeared; drop vectors of the files that were under it
  RemoveTree { project: Project, dir: PathBuf },
  /// Stop accepting jobs and wait for running ones
  Shutdown,
}

impl IndexJob {
  pub fn event(event: FileEvent) -> Self {
    Self::Event(event)
  }
}

/// Completion report for one job, delivered on the actor's result channel
#[derive(Debug)]
pub enum JobReport {
  File {
    event: FileEvent,
    result: Result<IndexOutcome, IndexError>,
  },
  Cleanup {
    project: Project,
    result: Result<usize, IndexError>,
  },
  /// Files removed under a deleted directory
  Tree {
    project: Project,
    dir: PathBuf,
    result: Result<usize, IndexError>,
  },
}

impl JobReport {
  pub fn is_ok(&self) -> bool {
    match self {
      JobReport::File { result, .. } => result.is_ok(),
      JobReport::Cleanup { result, .. } | JobReport::Tree { result, .. } => result.is_ok(),
    }
  }

  pub fn error(&self) -> Option<&IndexError> {
    match self {
      JobReport::File { result, .. } => result.as_ref().err(),
      JobReport::Cleanup { result, .. } | JobReport::Tree { result, .. } => result.as_ref().err(),
    }
  }
}
