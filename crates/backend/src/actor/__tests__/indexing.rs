//! IndexerActor and ProjectRuntime tests.
//!
//! Runs jobs through the actor against the in-memory store and fake
//! embeddings, then the full watcher -> indexer -> store loop.

#[cfg(test)]
mod tests {
  use std::{fs, sync::Arc, time::Duration};

  use tokio::sync::mpsc;
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::{
      __tests__::helpers::wait_for_report,
      handle::SendError,
      indexer::{IndexerActor, IndexerConfig},
      message::JobReport,
      project::ProjectRuntime,
    },
    domain::{
      config::IndexConfig,
      event::{FileEvent, FileEventKind},
    },
    service::{
      __tests__::helpers::{TestContext, test_index_config},
      code::IndexOutcome,
    },
  };

  fn indexer_config() -> IndexerConfig {
    IndexerConfig {
      workers: 2,
      queue_capacity: 8,
      shutdown_grace: Duration::from_secs(2),
    }
  }

  #[tokio::test]
  async fn test_actor_reports_each_job() {
    let ctx = TestContext::new();
    let a = ctx.write("a.rs", "fn a() {}\n");
    let b = ctx.write("b.png", b"\x89PNG\r\n\x1a\n");

    let (report_tx, mut reports) = mpsc::channel(8);
    let (handle, task) = IndexerActor::spawn(indexer_config(), ctx.service.clone(), Some(report_tx), CancellationToken::new());

    handle.submit(FileEvent::new(FileEventKind::Add, a.clone(), ctx.project.clone())).await.unwrap();
    handle.submit(FileEvent::new(FileEventKind::Add, b.clone(), ctx.project.clone())).await.unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..2 {
      match reports.recv().await.expect("report") {
        JobReport::File { event, result } => outcomes.push((event.path, result.unwrap())),
        other => panic!("unexpected report {other:?}"),
      }
    }
    outcomes.sort_by(|x, y| x.0.cmp(&y.0));

    assert_eq!(outcomes[0], (a, IndexOutcome::Indexed { chunks: 1 }));
    assert!(matches!(outcomes[1].1, IndexOutcome::Skipped(_)));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
  }

  #[tokio::test]
  async fn test_failures_surface_on_report_channel() {
    let ctx = TestContext::new();
    let outside = tempfile::NamedTempFile::new().unwrap();

    let (report_tx, mut reports) = mpsc::channel(8);
    let (handle, task) = IndexerActor::spawn(indexer_config(), ctx.service.clone(), Some(report_tx), CancellationToken::new());

    handle
      .submit(FileEvent::new(FileEventKind::Change, outside.path(), ctx.project.clone()))
      .await
      .unwrap();

    let report = reports.recv().await.expect("report");
    assert!(!report.is_ok());
    assert!(report.error().is_some());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
  }

  #[tokio::test]
  async fn test_send_after_shutdown_fails() {
    let ctx = TestContext::new();
    let (handle, task) = IndexerActor::spawn(indexer_config(), ctx.service.clone(), None, CancellationToken::new());

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let err = handle
      .submit(FileEvent::new(FileEventKind::Add, ctx.root().join("x.rs"), ctx.project.clone()))
      .await
      .unwrap_err();
    assert!(matches!(err, SendError::ActorGone));
    assert!(handle.is_closed());
  }

  #[tokio::test]
  async fn test_cancellation_stops_actor() {
    let ctx = TestContext::new();
    let cancel = CancellationToken::new();
    let (handle, task) = IndexerActor::spawn(indexer_config(), ctx.service.clone(), None, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    assert!(handle.is_closed());
  }

  #[tokio::test]
  async fn test_runtime_watch_index_unlink_and_cleanup() {
    let ctx = TestContext::with_config(IndexConfig {
      watcher_debounce_ms: 50,
      ..test_index_config()
    });
    ctx.write("src/main.rs", "fn main() {}\n");
    let generated = ctx.write("generated/out.js", "export const x = 1;\n");

    let (report_tx, mut reports) = mpsc::channel(64);
    let mut runtime = ProjectRuntime::start(
      ctx.project.clone(),
      ctx.service.clone(),
      Some(report_tx),
      CancellationToken::new(),
    );

    let summary = runtime.index_all().await;
    assert_eq!(summary.files_indexed, 2);

    runtime.start_watcher().unwrap();
    assert!(runtime.is_watching());
    tokio::time::sleep(Duration::from_millis(100)).await;

    // new file is picked up and indexed
    let added = ctx.write("src/lib.rs", "pub fn lib() {}\n");
    let report = wait_for_report(&mut reports, |r| matches!(r, JobReport::File { event, .. } if event.path == added)).await;
    assert!(matches!(report, JobReport::File { result: Ok(IndexOutcome::Indexed { chunks: 1 }), .. }));
    assert_eq!(ctx.chunks_for(&added).await, 1);

    // deletion leaves no vectors behind
    fs::remove_file(&added).unwrap();
    wait_for_report(&mut reports, |r| {
      matches!(r, JobReport::File { event, result: Ok(IndexOutcome::Removed) } if event.path == added)
    })
    .await;
    assert_eq!(ctx.chunks_for(&added).await, 0);

    // editing the override file drops newly ignored files
    fs::write(ctx.root().join(".vecsyncignore"), "generated/\n").unwrap();
    let report = wait_for_report(&mut reports, |r| matches!(r, JobReport::Cleanup { .. })).await;
    assert!(matches!(report, JobReport::Cleanup { result: Ok(1), .. }));
    assert_eq!(ctx.chunks_for(&generated).await, 0);
    assert!(runtime.evaluator().is_ignored("generated/out.js", false));

    runtime.stop_watcher().await;
    assert!(!runtime.is_watching());
    runtime.shutdown().await;
  }

  #[tokio::test]
  async fn test_runtime_follows_directory_rename_and_delete() {
    let ctx = TestContext::with_config(IndexConfig {
      watcher_debounce_ms: 50,
      ..test_index_config()
    });
    let old = ctx.write("src/a.rs", "pub fn a() {}\n");
    let new = ctx.root().join("lib/a.rs");

    let (report_tx, mut reports) = mpsc::channel(64);
    let mut runtime = ProjectRuntime::start(
      ctx.project.clone(),
      ctx.service.clone(),
      Some(report_tx),
      CancellationToken::new(),
    );
    assert_eq!(runtime.index_all().await.files_indexed, 1);
    runtime.start_watcher().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    fs::rename(ctx.root().join("src"), ctx.root().join("lib")).unwrap();

    let (mut tree_done, mut added) = (false, false);
    while !(tree_done && added) {
      match wait_for_report(&mut reports, |_| true).await {
        JobReport::Tree { dir, result, .. } if dir == ctx.root().join("src") => {
          result.unwrap();
          tree_done = true;
        }
        JobReport::File { event, result } if event.path == new => {
          assert_eq!(result.unwrap(), IndexOutcome::Indexed { chunks: 1 });
          added = true;
        }
        _ => {}
      }
    }
    assert_eq!(ctx.chunks_for(&old).await, 0);
    assert_eq!(ctx.chunks_for(&new).await, 1);

    fs::remove_dir_all(ctx.root().join("lib")).unwrap();
    wait_for_report(&mut reports, |r| match r {
      JobReport::Tree { dir, result: Ok(1), .. } => *dir == ctx.root().join("lib"),
      JobReport::File { event, result: Ok(IndexOutcome::Removed) } => event.path == new,
      _ => false,
    })
    .await;
    assert_eq!(ctx.chunks_for(&new).await, 0);

    runtime.shutdown().await;
  }

  #[tokio::test]
  async fn test_start_watcher_twice_is_noop() {
    let ctx = TestContext::new();
    let mut runtime = ProjectRuntime::start(ctx.project.clone(), ctx.service.clone(), None, CancellationToken::new());

    runtime.start_watcher().unwrap();
    runtime.start_watcher().unwrap();
    assert!(runtime.is_watching());

    runtime.shutdown().await;
    assert_eq!(Arc::strong_count(&ctx.service), 1);
  }
}
