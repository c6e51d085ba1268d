//! Index command: full pass, single files or ignore cleanup

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use vecsync::{config::Config, context::files::ignore::IgnoreRuleSet, service::code::IndexOutcome};

use super::open_pipeline;

/// Index the project, or reindex `files` when any are given
pub async fn cmd_index(root: &Path, config: Config, files: &[PathBuf], cleanup: bool, json_output: bool) -> Result<()> {
  let pipeline = open_pipeline(root, config).await?;
  let project = &pipeline.project;
  let service = &pipeline.service;
  let rules = IgnoreRuleSet::load(project.root(), &pipeline.config.index.ignore_file_name);

  if cleanup {
    let removed = service
      .cleanup_ignored(project, &rules)
      .await
      .context("Failed to remove ignored files from the index")?;
    if json_output {
      println!("{}", json!({ "files_removed": removed }));
    } else {
      println!("Removed {} ignored file(s) from the index", removed);
    }
    return Ok(());
  }

  if files.is_empty() {
    let summary = service.index_project(project, &rules).await;
    info!(
      project = %project.name(),
      indexed = summary.files_indexed,
      failed = summary.files_failed,
      "Project indexed"
    );

    if json_output {
      let value = json!({
        "files_scanned": summary.files_scanned,
        "files_indexed": summary.files_indexed,
        "files_skipped": summary.files_skipped,
        "files_failed": summary.files_failed,
        "files_removed": summary.files_removed,
        "chunks_created": summary.chunks_created,
        "duration_ms": summary.duration.as_millis() as u64,
      });
      println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
      println!(
        "Indexed {} of {} files ({} skipped, {} failed, {} removed), {} chunks in {:.1}s",
        summary.files_indexed,
        summary.files_scanned,
        summary.files_skipped,
        summary.files_failed,
        summary.files_removed,
        summary.chunks_created,
        summary.duration.as_secs_f64()
      );
    }

    if summary.files_failed > 0 {
      anyhow::bail!("{} file(s) failed to index", summary.files_failed);
    }
    return Ok(());
  }

  let mut failed = 0usize;
  let mut results = Vec::with_capacity(files.len());

  for file in files {
    let path = if file.is_absolute() { file.clone() } else { root.join(file) };

    // a path that no longer exists is a deletion
    let result = if path.exists() {
      service.update_file(project, &path).await
    } else {
      service.remove_file(project, &path).await
    };

    let status = match &result {
      Ok(IndexOutcome::Indexed { chunks }) => format!("indexed ({} chunks)", chunks),
      Ok(IndexOutcome::Removed) => "removed".to_string(),
      Ok(IndexOutcome::Skipped(reason)) => format!("skipped ({})", reason),
      Err(e) => {
        failed += 1;
        error!(path = %path.display(), err = %e, "Failed to index file");
        format!("failed: {}", e)
      }
    };

    if json_output {
      results.push(json!({ "path": path.display().to_string(), "ok": result.is_ok(), "status": status }));
    } else {
      println!("{}: {}", path.display(), status);
    }
  }

  if json_output {
    println!("{}", serde_json::to_string_pretty(&results)?);
  }

  if failed > 0 {
    anyhow::bail!("{} file(s) failed to index", failed);
  }
  Ok(())
}
