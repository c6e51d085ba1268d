//! WatcherTask - debounced file watcher feeding the IndexerActor
//!
//! The watcher bridges notify's sync callback with the async actor system:
//! 1. notify's callback uses `blocking_send` to forward events to a channel
//! 2. The async task filters each path (ignore rules, binary extension) and
//!    records it in a [`DebounceQueue`]
//! 3. When a path's quiet period ends, one `IndexJob` is sent carrying the
//!    last event kind seen for it
//!
//! Each path is `Idle` (absent from the queue) or `Pending(kind, deadline)`.
//! A new event while pending overwrites the kind and pushes the deadline out.
//!
//! When a settled path is one of the ignore files, no file job is sent.
//! The rules are reloaded and a cleanup job is sent instead.
//!
//! Directories are expanded, not queued. A directory that appears (created or
//! renamed in) is walked with the active ignore rules and each file gets an
//! `Add`. A directory that goes away (removed or renamed out) sends a
//! `RemoveTree` job right away, since no per-file events may follow.
//!
//! # Lifecycle
//!
//! The watcher runs until the `CancellationToken` is triggered, the event
//! channel closes, or the indexer goes away. Pending events are cancelled,
//! not flushed, before the notify watcher is released.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use notify::{
  Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RemoveKind, RenameMode},
};
use tokio::{
  sync::mpsc,
  time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{handle::IndexerHandle, message::IndexJob};
use crate::{
  context::files::{ignore::IgnoreEvaluator, is_binary_extension},
  domain::{
    config::IndexConfig,
    event::{FileEvent, FileEventKind},
    project::{Project, normalize_path},
  },
  service::code::scan_tree,
};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct WatcherConfig {
  /// Quiet period before a path's event fires
  pub debounce: Duration,
  /// Poll interval when notify falls back to polling
  pub poll_interval: Duration,
}

impl WatcherConfig {
  pub fn from_index_config(index: &IndexConfig) -> Self {
    Self {
      debounce: Duration::from_millis(index.watcher_debounce_ms),
      poll_interval: Duration::from_secs(index.watcher_poll_secs.max(1)),
    }
  }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while starting the watcher
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch {}: {source}", .path.display())]
  Watch {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },
}

// ============================================================================
// Debounce Queue
// ============================================================================

#[derive(Debug, Clone)]
struct PendingEvent {
  path: PathBuf,
  kind: FileEventKind,
  deadline: Instant,
}

/// Per-path trailing-edge debounce.
///
/// Keyed by normalized path, so at most one pending event exists per file.
#[derive(Debug)]
pub struct DebounceQueue {
  window: Duration,
  pending: HashMap<String, PendingEvent>,
}

impl DebounceQueue {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      pending: HashMap::new(),
    }
  }

  /// Record an event, replacing any pending one for the same path
  pub fn record(&mut self, path: &Path, kind: FileEventKind, now: Instant) {
    let deadline = now + self.window;
    let key = normalize_path(path);
    match self.pending.get_mut(&key) {
      Some(existing) => {
        trace!(file = %key, from = %existing.kind, to = %kind, "Replacing pending event");
        existing.kind = kind;
        existing.deadline = deadline;
      }
      None => {
        self.pending.insert(
          key,
          PendingEvent {
            path: path.to_path_buf(),
            kind,
            deadline,
          },
        );
      }
    }
  }

  /// Remove and return every event whose deadline has passed, oldest first
  pub fn take_due(&mut self, now: Instant) -> Vec<(PathBuf, FileEventKind)> {
    let due: Vec<String> = self
      .pending
      .iter()
      .filter(|(_, p)| p.deadline <= now)
      .map(|(key, _)| key.clone())
      .collect();

    let mut fired: Vec<PendingEvent> = due.iter().filter_map(|key| self.pending.remove(key)).collect();
    fired.sort_by_key(|p| p.deadline);
    fired.into_iter().map(|p| (p.path, p.kind)).collect()
  }

  pub fn next_deadline(&self) -> Option<Instant> {
    self.pending.values().map(|p| p.deadline).min()
  }

  /// Drop every pending event. Returns how many were dropped.
  pub fn cancel_all(&mut self) -> usize {
    let count = self.pending.len();
    self.pending.clear();
    count
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }
}

/// Map a notify event to per-path file events.
///
/// Renames are split into an unlink of the old path and an add of the new one.
/// A removed folder is an unlink of the folder path.
fn classify_event(event: &Event) -> Vec<(PathBuf, FileEventKind)> {
  let all = |kind: FileEventKind| -> Vec<(PathBuf, FileEventKind)> {
    event.paths.iter().map(|p| (p.clone(), kind)).collect()
  };

  match event.kind {
    EventKind::Create(_) => all(FileEventKind::Add),
    EventKind::Remove(_) => all(FileEventKind::Unlink),
    EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(FileEventKind::Unlink),
    EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(FileEventKind::Add),
    EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => vec![
      (event.paths[0].clone(), FileEventKind::Unlink),
      (event.paths[1].clone(), FileEventKind::Add),
    ],
    // rename with unknown direction: whichever side still exists was the target
    EventKind::Modify(ModifyKind::Name(_)) => event
      .paths
      .iter()
      .map(|p| {
        let kind = if p.exists() { FileEventKind::Add } else { FileEventKind::Unlink };
        (p.clone(), kind)
      })
      .collect(),
    EventKind::Modify(_) => all(FileEventKind::Change),
    EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
  }
}

/// Whether an unlink from this event may stand for a whole directory.
/// Renames do not say what was renamed, so their sources count too.
fn may_remove_directory(event: &Event) -> bool {
  matches!(
    event.kind,
    EventKind::Remove(RemoveKind::Folder) | EventKind::Modify(ModifyKind::Name(_))
  )
}

// ============================================================================
// WatcherTask
// ============================================================================

pub struct WatcherTask {
  project: Project,
  config: WatcherConfig,
  evaluator: Arc<IgnoreEvaluator>,
  indexer: IndexerHandle,
  cancel: CancellationToken,
  // must outlive the event loop; dropped only after pending events are cancelled
  watcher: RecommendedWatcher,
  event_rx: mpsc::Receiver<Result<Event, notify::Error>>,
  queue: DebounceQueue,
}

impl WatcherTask {
  /// Start watching the project root recursively.
  ///
  /// The task is not started until `run()` is called.
  pub fn new(
    project: Project,
    config: WatcherConfig,
    evaluator: Arc<IgnoreEvaluator>,
    indexer: IndexerHandle,
    cancel: CancellationToken,
  ) -> Result<Self, WatchError> {
    let (event_tx, event_rx) = mpsc::channel::<Result<Event, notify::Error>>(1024);

    let notify_config = Config::default().with_poll_interval(config.poll_interval);
    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // runs on notify's thread; a closed channel means the task is gone
        let _ = event_tx.blocking_send(res);
      },
      notify_config,
    )
    .map_err(WatchError::Init)?;

    watcher
      .watch(project.root(), RecursiveMode::Recursive)
      .map_err(|source| WatchError::Watch {
        path: project.root().to_path_buf(),
        source,
      })?;

    info!(root = %project.root().display(), debounce_ms = config.debounce.as_millis(), "File watcher initialized");

    let queue = DebounceQueue::new(config.debounce);
    Ok(Self {
      project,
      config,
      evaluator,
      indexer,
      cancel,
      watcher,
      event_rx,
      queue,
    })
  }

  pub fn spawn(
    project: Project,
    config: WatcherConfig,
    evaluator: Arc<IgnoreEvaluator>,
    indexer: IndexerHandle,
    cancel: CancellationToken,
  ) -> Result<tokio::task::JoinHandle<()>, WatchError> {
    let task = Self::new(project, config, evaluator, indexer, cancel)?;
    Ok(tokio::spawn(task.run()))
  }

  pub async fn run(mut self) {
    info!(project = %self.project.name(), "WatcherTask started");

    loop {
      let next_deadline = self.queue.next_deadline();

      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              info!("WatcherTask shutting down (cancelled)");
              break;
          }

          _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
              if !self.fire_due().await {
                  info!("WatcherTask shutting down (indexer gone)");
                  break;
              }
          }

          event = self.event_rx.recv() => {
              match event {
                  Some(Ok(event)) => {
                      let removed_dirs = self.process_event(&event);
                      if !self.send_tree_removals(removed_dirs).await {
                          info!("WatcherTask shutting down (indexer gone)");
                          break;
                      }
                  }
                  Some(Err(e)) => warn!(err = %e, "Watcher error"),
                  None => {
                      info!("WatcherTask shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    let cancelled = self.queue.cancel_all();
    if cancelled > 0 {
      debug!(cancelled, "Cancelled pending events on shutdown");
    }
    drop(self.watcher);

    info!(project = %self.project.name(), "WatcherTask stopped");
  }

  /// Filter an event's paths and record the survivors. Returns directories
  /// that went away.
  fn process_event(&mut self, event: &Event) -> Vec<PathBuf> {
    let now = Instant::now();
    let mut removed_dirs = Vec::new();

    for (path, kind) in classify_event(event) {
      if self.evaluator.is_ignore_file(&path) {
        debug!(file = %path.display(), "Ignore file changed");
        self.queue.record(&path, kind, now);
        continue;
      }

      if kind == FileEventKind::Unlink && may_remove_directory(event) && !path.exists() {
        let ignored = self
          .project
          .relative_path(&path)
          .is_none_or(|relative| self.evaluator.is_ignored(&relative, true));
        if !ignored {
          removed_dirs.push(path.clone());
        }
        if matches!(event.kind, EventKind::Remove(RemoveKind::Folder)) {
          continue;
        }
      }

      if kind != FileEventKind::Unlink && path.is_dir() {
        self.record_directory(&path, now);
        continue;
      }

      // re-checked per event: rules may have been reloaded since the last one
      if self.evaluator.is_ignored_path(&path) {
        trace!(path = %path.display(), "Skipping ignored path");
        continue;
      }

      if is_binary_extension(&path) {
        trace!(path = %path.display(), "Skipping binary file");
        continue;
      }

      trace!(file = %path.display(), kind = %kind, "Event recorded");
      self.queue.record(&path, kind, now);
    }

    removed_dirs
  }

  /// Queue an `Add` for every indexable file under a directory that appeared
  fn record_directory(&mut self, dir: &Path, now: Instant) {
    if self.evaluator.is_ignored_path(dir) {
      trace!(path = %dir.display(), "Skipping ignored directory");
      return;
    }

    let rules = self.evaluator.current();
    let scan = scan_tree(self.project.root(), dir, &rules);
    debug!(dir = %dir.display(), files = scan.files.len(), "Directory appeared");
    for file in scan.files {
      self.queue.record(&file, FileEventKind::Add, now);
    }
  }

  /// Send a `RemoveTree` job per removed directory. Returns false once the
  /// indexer is gone.
  async fn send_tree_removals(&self, dirs: Vec<PathBuf>) -> bool {
    for dir in dirs {
      debug!(dir = %dir.display(), "Directory removed");
      let job = IndexJob::RemoveTree {
        project: self.project.clone(),
        dir,
      };
      if self.indexer.send(job).await.is_err() {
        return false;
      }
    }
    true
  }

  /// Send jobs for settled paths. Returns false once the indexer is gone.
  async fn fire_due(&mut self) -> bool {
    for (path, kind) in self.queue.take_due(Instant::now()) {
      let job = if self.evaluator.is_ignore_file(&path) {
        let rules = self.evaluator.reload();
        IndexJob::Cleanup {
          project: self.project.clone(),
          rules,
        }
      } else {
        debug!(file = %path.display(), kind = %kind, "Event settled");
        IndexJob::event(FileEvent::new(kind, path, self.project.clone()))
      };

      if self.indexer.send(job).await.is_err() {
        return false;
      }
    }
    true
  }

  pub fn config(&self) -> &WatcherConfig {
    &self.config
  }
}
