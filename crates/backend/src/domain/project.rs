use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Convert a path to the forward-slash form used for matching and payloads.
pub fn normalize_path(path: &Path) -> String {
  normalize_str(&path.to_string_lossy())
}

/// Forward-slash form of a path string.
pub fn normalize_str(path: &str) -> String {
  path.replace('\\', "/")
}

/// A watched project: a name and the root directory it covers.
///
/// Each project maps to exactly one vector-store collection, named from the
/// project name by [`Project::collection`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
  name: String,
  root: PathBuf,
}

impl Project {
  pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      name: name.into(),
      root: lexical_normalize(&root).unwrap_or(root),
    }
  }

  /// Build a project named after its root directory.
  ///
  /// The root is canonicalized when possible so watcher paths and payload
  /// paths agree.
  pub fn from_root(root: &Path) -> Self {
    let root = root
      .canonicalize()
      .ok()
      .or_else(|| lexical_normalize(root))
      .unwrap_or_else(|| root.to_path_buf());
    let name = root
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "root".to_string());
    Self { name, root }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Collection holding this project's code chunks: `project_<name>`.
  pub fn collection(&self) -> String {
    format!("project_{}", sanitize_collection_name(&self.name))
  }

  /// Absolute form of `path` inside the project.
  ///
  /// Relative paths are taken from the project root, not the process cwd.
  /// `.` and `..` are collapsed without touching the filesystem. Returns
  /// `None` when the result lies outside the root.
  pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
    let joined = if path.is_relative() {
      self.root.join(path)
    } else {
      path.to_path_buf()
    };
    lexical_normalize(&joined).filter(|p| p.starts_with(&self.root))
  }

  /// Normalized path of `path` relative to the project root.
  ///
  /// Accepts absolute paths under the root or paths relative to it.
  /// Returns `None` for anything that resolves outside the project.
  pub fn relative_path(&self, path: &Path) -> Option<String> {
    let resolved = self.resolve(path)?;
    resolved
      .strip_prefix(&self.root)
      .ok()
      .map(|rel| trim_relative(&normalize_path(rel)))
  }

  /// Same as [`Project::relative_path`] for a normalized payload path.
  pub fn relative_str(&self, path: &str) -> Option<String> {
    let root = normalize_path(&self.root);
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    let rest = rest.strip_prefix('/')?;
    Some(trim_relative(rest))
  }
}

/// Collapse `.` and `..` components. `None` when `..` climbs above the
/// first component.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          return None;
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  Some(out)
}

fn trim_relative(path: &str) -> String {
  let mut path = path;
  while let Some(rest) = path.strip_prefix("./") {
    path = rest;
  }
  path.trim_start_matches('/').to_string()
}

/// Lowercase the name and replace anything outside `[a-z0-9_-]` with `_`.
fn sanitize_collection_name(name: &str) -> String {
  let sanitized: String = name
    .chars()
    .map(|c| {
      let c = c.to_ascii_lowercase();
      if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' }
    })
    .collect();

  if sanitized.is_empty() {
    "default".to_string()
  } else {
    sanitized
  }
}
