//! Search command

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use vecsync::{
  code::{ScoredPoint, VectorPayload},
  config::Config,
  service::code::SearchParams,
};

use super::open_pipeline;

/// Lines of chunk content shown per hit
const PREVIEW_LINES: usize = 6;

#[derive(Serialize)]
struct SearchHit<'a> {
  score: f32,
  #[serde(flatten)]
  payload: &'a VectorPayload,
}

fn preview(content: &str) -> String {
  let mut lines: Vec<&str> = content.lines().take(PREVIEW_LINES).collect();
  if content.lines().nth(PREVIEW_LINES).is_some() {
    lines.push("...");
  }
  lines.join("\n   ")
}

fn print_hits(query: &str, hits: &[ScoredPoint]) {
  if hits.is_empty() {
    println!("No results for: {}", query);
    return;
  }

  println!("Found {} results:\n", hits.len());
  for (i, hit) in hits.iter().enumerate() {
    let p = &hit.payload;
    println!(
      "{}. {}:{}-{} (score {:.3})",
      i + 1,
      p.file_path,
      p.line_start,
      p.line_end,
      hit.score
    );
    println!("   {}", preview(&p.content));
    println!();
  }
}

/// Search the project's indexed chunks
pub async fn cmd_search(
  root: &Path,
  config: Config,
  query: &str,
  limit: usize,
  file_type: Option<&str>,
  json_output: bool,
) -> Result<()> {
  let pipeline = open_pipeline(root, config).await?;

  let mut params = SearchParams::new(query).with_limit(limit);
  if let Some(file_type) = file_type {
    params = params.with_file_type(file_type);
  }

  let hits = pipeline
    .service
    .search_code(&pipeline.project, &params)
    .await
    .context("Search failed")?;

  if json_output {
    let items: Vec<SearchHit<'_>> = hits
      .iter()
      .map(|hit| SearchHit {
        score: hit.score,
        payload: &hit.payload,
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&items)?);
  } else {
    print_hits(query, &hits);
  }

  Ok(())
}
