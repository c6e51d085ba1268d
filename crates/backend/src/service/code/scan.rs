//! Project file discovery for full index passes.

use std::{
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use tracing::trace;
use walkdir::WalkDir;

use crate::{
  context::files::{ignore::IgnoreRuleSet, is_binary_extension},
  domain::project::normalize_path,
};

/// Result of scanning a project for indexable files.
#[derive(Debug, Clone)]
pub struct ScanResult {
  /// Files that pass the ignore rules and are not binary by extension
  pub files: Vec<PathBuf>,
  /// Total bytes across all files
  pub total_bytes: u64,
  /// Time taken to scan
  pub duration: Duration,
}

/// Walk `root`, pruning ignored directories, and collect candidate files.
///
/// Symlinks are not followed. Files the walker cannot read are skipped.
pub fn scan_project(root: &Path, rules: &IgnoreRuleSet) -> ScanResult {
  scan_tree(root, root, rules)
}

/// Same as [`scan_project`] but starting at `dir`, a directory under `root`.
/// Ignore rules still match against paths relative to `root`.
pub fn scan_tree(root: &Path, dir: &Path, rules: &IgnoreRuleSet) -> ScanResult {
  let start = Instant::now();
  let mut files = Vec::new();
  let mut total_bytes: u64 = 0;

  let walker = WalkDir::new(dir).follow_links(false).into_iter().filter_entry(|entry| {
    if entry.depth() == 0 {
      return true;
    }
    let Ok(relative) = entry.path().strip_prefix(root) else {
      return false;
    };
    !rules.is_ignored(&normalize_path(relative), entry.file_type().is_dir())
  });

  for entry in walker.filter_map(Result::ok) {
    if !entry.file_type().is_file() || is_binary_extension(entry.path()) {
      continue;
    }
    if let Ok(metadata) = entry.metadata() {
      total_bytes += metadata.len();
    }
    files.push(entry.into_path());
  }

  trace!(dir = %dir.display(), files = files.len(), "Scanned tree");

  ScanResult {
    files,
    total_bytes,
    duration: start.elapsed(),
  }
}
