//! WatcherTask integration tests against a real notify watcher.

#[cfg(test)]
mod tests {
  use std::{collections::HashSet, fs, path::PathBuf, sync::Arc, time::Duration};

  use tempfile::TempDir;
  use tokio::{sync::mpsc, time::sleep};
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::{
      __tests__::helpers::{assert_no_job, next_job},
      handle::IndexerHandle,
      message::IndexJob,
      watcher::{WatcherConfig, WatcherTask},
    },
    context::files::ignore::IgnoreEvaluator,
    domain::{event::FileEventKind, project::Project},
  };

  const OVERRIDE: &str = ".vecsyncignore";

  struct WatchedProject {
    _dir: TempDir,
    project: Project,
    jobs: mpsc::Receiver<IndexJob>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
  }

  async fn watch_project(setup: impl FnOnce(&Project)) -> WatchedProject {
    let dir = TempDir::new().unwrap();
    let project = Project::from_root(dir.path());
    setup(&project);

    let (tx, jobs) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let evaluator = Arc::new(IgnoreEvaluator::new(project.root(), OVERRIDE));
    let config = WatcherConfig {
      debounce: Duration::from_millis(50),
      poll_interval: Duration::from_secs(1),
    };

    let task = WatcherTask::spawn(project.clone(), config, evaluator, IndexerHandle::new(tx), cancel.clone())
      .expect("start watcher");
    // let the OS watch settle
    sleep(Duration::from_millis(100)).await;

    WatchedProject {
      _dir: dir,
      project,
      jobs,
      cancel,
      task,
    }
  }

  fn expect_event(job: IndexJob) -> (std::path::PathBuf, FileEventKind) {
    match job {
      IndexJob::Event(event) => (event.path, event.kind),
      other => panic!("expected IndexJob::Event, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_burst_of_writes_settles_once() {
    let mut w = watch_project(|p| fs::create_dir_all(p.root().join("src")).unwrap()).await;
    let file = w.project.root().join("src/lib.rs");

    for i in 0..5 {
      fs::write(&file, format!("pub fn v{i}() {{}}\n")).unwrap();
      sleep(Duration::from_millis(5)).await;
    }

    let (path, kind) = expect_event(next_job(&mut w.jobs).await);
    assert_eq!(path, file);
    assert!(matches!(kind, FileEventKind::Add | FileEventKind::Change), "got {kind}");
    assert_no_job(&mut w.jobs, Duration::from_millis(300)).await;

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  #[tokio::test]
  async fn test_remove_settles_as_unlink() {
    let mut w = watch_project(|p| fs::write(p.root().join("notes.md"), "# notes\n").unwrap()).await;
    let file = w.project.root().join("notes.md");

    fs::remove_file(&file).unwrap();

    let (path, kind) = expect_event(next_job(&mut w.jobs).await);
    assert_eq!(path, file);
    assert_eq!(kind, FileEventKind::Unlink);

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  #[tokio::test]
  async fn test_ignored_and_binary_paths_filtered() {
    let mut w = watch_project(|p| fs::create_dir_all(p.root().join("node_modules/dep")).unwrap()).await;

    fs::write(w.project.root().join("node_modules/dep/index.js"), "x").unwrap();
    fs::write(w.project.root().join("image.png"), [0x89, b'P', b'N', b'G']).unwrap();
    sleep(Duration::from_millis(20)).await;
    fs::write(w.project.root().join("keep.rs"), "fn keep() {}\n").unwrap();

    let (path, _) = expect_event(next_job(&mut w.jobs).await);
    assert_eq!(path, w.project.root().join("keep.rs"));
    assert_no_job(&mut w.jobs, Duration::from_millis(300)).await;

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  #[tokio::test]
  async fn test_ignore_file_change_triggers_cleanup() {
    let mut w = watch_project(|_| {}).await;

    fs::write(w.project.root().join(OVERRIDE), "generated/\n").unwrap();

    match next_job(&mut w.jobs).await {
      IndexJob::Cleanup { project, rules } => {
        assert_eq!(project, w.project);
        assert!(rules.is_ignored("generated/out.js", false));
      }
      other => panic!("expected IndexJob::Cleanup, got {other:?}"),
    }

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  /// Jobs until a `RemoveTree` for `dir` and an `Add` for each of `added`
  /// have been seen. Duplicates and unrelated jobs are skipped.
  async fn wait_for_tree_jobs(w: &mut WatchedProject, dir: &PathBuf, added: &[PathBuf]) {
    let mut tree_seen = false;
    let mut pending: HashSet<&PathBuf> = added.iter().collect();

    while !(tree_seen && pending.is_empty()) {
      match next_job(&mut w.jobs).await {
        IndexJob::RemoveTree { dir: removed, .. } if &removed == dir => tree_seen = true,
        IndexJob::Event(event) if event.kind == FileEventKind::Add => {
          pending.remove(&event.path);
        }
        _ => {}
      }
    }
  }

  #[tokio::test]
  async fn test_directory_rename_expands_and_removes() {
    let mut w = watch_project(|p| {
      fs::create_dir_all(p.root().join("src/nested")).unwrap();
      fs::write(p.root().join("src/a.rs"), "fn a() {}\n").unwrap();
      fs::write(p.root().join("src/nested/b.rs"), "fn b() {}\n").unwrap();
    })
    .await;
    let root = w.project.root().to_path_buf();

    fs::rename(root.join("src"), root.join("lib")).unwrap();

    wait_for_tree_jobs(&mut w, &root.join("src"), &[root.join("lib/a.rs"), root.join("lib/nested/b.rs")]).await;

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  #[tokio::test]
  async fn test_directory_delete_sends_remove_tree() {
    let mut w = watch_project(|p| {
      fs::create_dir_all(p.root().join("docs")).unwrap();
      fs::write(p.root().join("docs/guide.md"), "# guide\n").unwrap();
    })
    .await;
    let dir = w.project.root().join("docs");

    fs::remove_dir_all(&dir).unwrap();

    wait_for_tree_jobs(&mut w, &dir, &[]).await;

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  #[tokio::test]
  async fn test_ignored_directory_not_expanded() {
    let mut w = watch_project(|p| {
      fs::create_dir_all(p.root().join("staging/node_modules/dep")).unwrap();
      fs::write(p.root().join("staging/node_modules/dep/index.js"), "x").unwrap();
    })
    .await;
    let root = w.project.root().to_path_buf();

    fs::rename(root.join("staging/node_modules"), root.join("node_modules")).unwrap();
    sleep(Duration::from_millis(20)).await;
    fs::write(root.join("marker.rs"), "fn marker() {}\n").unwrap();

    // only the marker file: nothing from inside node_modules, no tree removal
    // for the ignored source
    loop {
      match next_job(&mut w.jobs).await {
        IndexJob::Event(event) if event.path == root.join("marker.rs") => break,
        IndexJob::Event(event) => assert!(
          !event.path.starts_with(root.join("node_modules")),
          "unexpected event for {}",
          event.path.display()
        ),
        IndexJob::RemoveTree { dir, .. } => panic!("unexpected tree removal for {}", dir.display()),
        other => panic!("unexpected job {other:?}"),
      }
    }

    w.cancel.cancel();
    w.task.await.unwrap();
  }

  #[tokio::test]
  async fn test_cancel_drops_pending_events() {
    let mut w = watch_project(|_| {}).await;

    // cancel inside the debounce window: the pending event must never fire
    fs::write(w.project.root().join("late.rs"), "fn late() {}\n").unwrap();
    sleep(Duration::from_millis(10)).await;
    w.cancel.cancel();
    w.task.await.unwrap();

    // the watcher held the only sender, so the channel is now closed and empty
    let remaining = tokio::time::timeout(Duration::from_millis(200), w.jobs.recv()).await;
    assert!(matches!(remaining, Ok(None)), "got {remaining:?}");
  }
}
