//! Layered ignore rules
//!
//! Three layers are compiled into one `ignore::gitignore::Gitignore` matcher,
//! in this order:
//!
//! 1. Built-in defaults ([`DEFAULT_PATTERNS`])
//! 2. The repository `.gitignore`
//! 3. The project override file (`.vecsyncignore` by default)
//!
//! The matcher uses last-match-wins, so a later layer can re-include (`!pat`)
//! or exclude a path matched by an earlier one. Loading never fails: a missing
//! or unreadable file contributes no patterns and is logged.
//!
//! [`IgnoreEvaluator`] holds the active [`IgnoreRuleSet`] behind an `Arc` and
//! swaps it wholesale on reload, so readers never see a partial rule set.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::project::normalize_str;

/// Repository-style ignore file name
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Patterns that apply to every project
pub const DEFAULT_PATTERNS: &[&str] = &[
  // version control
  ".git/",
  ".hg/",
  ".svn/",
  // dependencies
  "node_modules/",
  "bower_components/",
  ".venv/",
  "venv/",
  "__pypackages__/",
  // build output
  "target/",
  "dist/",
  "build/",
  "out/",
  ".next/",
  ".nuxt/",
  "coverage/",
  // editors and OS
  ".idea/",
  ".vscode/",
  "*.swp",
  "*.swo",
  "*~",
  ".DS_Store",
  "Thumbs.db",
  // logs and caches
  "*.log",
  "logs/",
  ".cache/",
  "__pycache__/",
  ".pytest_cache/",
  ".mypy_cache/",
  "*.pyc",
  // lockfiles
  "package-lock.json",
  "yarn.lock",
  "pnpm-lock.yaml",
  "Cargo.lock",
  "poetry.lock",
  "Gemfile.lock",
  "composer.lock",
  // our own state
  ".vecsync/",
];

// ============================================================================
// IgnoreRuleSet
// ============================================================================

/// Which layers contributed to a rule set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedLayers {
  pub gitignore: bool,
  pub override_file: bool,
}

/// Immutable compiled ignore rules for one project root
#[derive(Debug)]
pub struct IgnoreRuleSet {
  root: PathBuf,
  matcher: Gitignore,
  layers: LoadedLayers,
}

impl IgnoreRuleSet {
  /// Load the layered rules for `root`.
  ///
  /// `override_name` is the project override file name, resolved against `root`.
  pub fn load(root: &Path, override_name: &str) -> Self {
    let mut builder = GitignoreBuilder::new(root);
    let mut layers = LoadedLayers::default();

    for pattern in DEFAULT_PATTERNS {
      if let Err(e) = builder.add_line(None, pattern) {
        warn!(pattern, err = %e, "Invalid default ignore pattern");
      }
    }

    layers.gitignore = add_ignore_file(&mut builder, &root.join(GITIGNORE_FILE));
    layers.override_file = add_ignore_file(&mut builder, &root.join(override_name));

    let matcher = match builder.build() {
      Ok(matcher) => matcher,
      Err(e) => {
        warn!(root = %root.display(), err = %e, "Failed to compile ignore rules, using defaults only");
        defaults_only(root)
      }
    };

    debug!(
      root = %root.display(),
      gitignore = layers.gitignore,
      override_file = layers.override_file,
      patterns = matcher.num_ignores() + matcher.num_whitelists(),
      "Ignore rules loaded"
    );

    Self {
      root: root.to_path_buf(),
      matcher,
      layers,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn layers(&self) -> &LoadedLayers {
    &self.layers
  }

  /// Check a path relative to the project root.
  ///
  /// Back-slashes are normalized first. A path is ignored when it or any of
  /// its parent directories matches an ignore pattern that is not overridden
  /// by a later whitelist pattern.
  pub fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
    let normalized = normalize_str(relative);
    let mut trimmed = normalized.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
      trimmed = rest;
    }
    let trimmed = trimmed.trim_start_matches('/');
    if trimmed.is_empty() {
      return false;
    }

    self
      .matcher
      .matched_path_or_any_parents(Path::new(trimmed), is_dir)
      .is_ignore()
  }
}

/// Add one ignore file to the builder. Returns whether it contributed patterns.
fn add_ignore_file(builder: &mut GitignoreBuilder, path: &Path) -> bool {
  if !path.is_file() {
    debug!(path = %path.display(), "Ignore file not present");
    return false;
  }

  // add() keeps every valid line and reports the rest
  if let Some(err) = builder.add(path) {
    warn!(path = %path.display(), err = %err, "Error reading ignore file, continuing with partial rules");
  }
  true
}

fn defaults_only(root: &Path) -> Gitignore {
  let mut builder = GitignoreBuilder::new(root);
  for pattern in DEFAULT_PATTERNS {
    let _ = builder.add_line(None, pattern);
  }
  builder.build().unwrap_or_else(|_| Gitignore::empty())
}

// ============================================================================
// IgnoreEvaluator
// ============================================================================

/// Shared, reloadable handle to a project's active rule set
#[derive(Debug)]
pub struct IgnoreEvaluator {
  root: PathBuf,
  override_name: String,
  active: RwLock<Arc<IgnoreRuleSet>>,
}

impl IgnoreEvaluator {
  pub fn new(root: &Path, override_name: &str) -> Self {
    let rules = IgnoreRuleSet::load(root, override_name);
    Self {
      root: root.to_path_buf(),
      override_name: override_name.to_string(),
      active: RwLock::new(Arc::new(rules)),
    }
  }

  /// Snapshot of the active rule set
  pub fn current(&self) -> Arc<IgnoreRuleSet> {
    self.active.read().clone()
  }

  /// Rebuild the rules from disk and swap them in
  pub fn reload(&self) -> Arc<IgnoreRuleSet> {
    let rules = Arc::new(IgnoreRuleSet::load(&self.root, &self.override_name));
    *self.active.write() = rules.clone();
    info!(root = %self.root.display(), "Ignore rules reloaded");
    rules
  }

  pub fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
    self.current().is_ignored(relative, is_dir)
  }

  /// Check an absolute path. Paths outside the root are never ignored.
  pub fn is_ignored_path(&self, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(&self.root) else {
      return false;
    };
    self.is_ignored(&relative.to_string_lossy(), path.is_dir())
  }

  /// Paths of the two ignore files backing the rule set
  pub fn ignore_file_paths(&self) -> [PathBuf; 2] {
    [self.root.join(GITIGNORE_FILE), self.root.join(&self.override_name)]
  }

  /// Whether `path` is one of the ignore files themselves
  pub fn is_ignore_file(&self, path: &Path) -> bool {
    self.ignore_file_paths().iter().any(|p| p == path)
  }
}
