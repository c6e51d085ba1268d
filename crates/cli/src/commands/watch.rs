//! Watch command: keep the index in sync until interrupted

use anyhow::{Context, Result};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vecsync::{
  actor::{JobReport, ProjectRuntime},
  config::Config,
  service::code::IndexOutcome,
};

use super::open_pipeline;

/// Report channel depth; workers wait on a full channel
const REPORT_CAPACITY: usize = 256;

fn log_report(report: &JobReport) {
  match report {
    JobReport::File { event, result } => match result {
      Ok(IndexOutcome::Indexed { chunks }) => {
        info!(path = %event.path.display(), kind = %event.kind, chunks, "Indexed")
      }
      Ok(IndexOutcome::Removed) => info!(path = %event.path.display(), "Removed from index"),
      Ok(IndexOutcome::Skipped(reason)) => info!(path = %event.path.display(), %reason, "Skipped"),
      Err(e) => warn!(path = %event.path.display(), kind = %event.kind, err = %e, "Indexing failed"),
    },
    JobReport::Cleanup { project, result } => match result {
      Ok(removed) => info!(project = %project.name(), removed, "Ignore rules changed, index cleaned"),
      Err(e) => warn!(project = %project.name(), err = %e, "Ignore cleanup failed"),
    },
    JobReport::Tree { dir, result, .. } => match result {
      Ok(removed) => info!(dir = %dir.display(), removed, "Directory removed from index"),
      Err(e) => warn!(dir = %dir.display(), err = %e, "Failed to remove directory from index"),
    },
  }
}

/// Watch the project until Ctrl-C
pub async fn cmd_watch(root: &Path, config: Config, initial_scan: bool) -> Result<()> {
  let pipeline = open_pipeline(root, config).await?;

  let (report_tx, mut reports) = mpsc::channel(REPORT_CAPACITY);
  let cancel = CancellationToken::new();
  let mut runtime = ProjectRuntime::start(pipeline.project, pipeline.service, Some(report_tx), cancel.clone());

  if initial_scan {
    let summary = runtime.index_all().await;
    println!(
      "Indexed {} of {} files ({} failed, {} removed), {} chunks",
      summary.files_indexed, summary.files_scanned, summary.files_failed, summary.files_removed, summary.chunks_created
    );
  }

  runtime.start_watcher().context("Failed to start file watcher")?;
  println!("Watching {} (Ctrl-C to stop)", runtime.project().root().display());

  loop {
    tokio::select! {
      signal = tokio::signal::ctrl_c() => {
        if let Err(e) = signal {
          warn!(err = %e, "Failed to listen for Ctrl-C, stopping");
        }
        break;
      }
      report = reports.recv() => match report {
        Some(report) => log_report(&report),
        None => {
          warn!("Indexer stopped unexpectedly");
          break;
        }
      },
    }
  }

  info!("Shutting down watcher");
  // workers must not wait on a channel nobody reads anymore
  drop(reports);
  runtime.shutdown().await;
  cancel.cancel();
  Ok(())
}
