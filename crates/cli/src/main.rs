//! vecsync CLI - keep a semantic index of a source tree in sync

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vecsync::config::Config;

mod commands;
mod logging;

use commands::{cmd_index, cmd_search, cmd_watch};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "vecsync")]
#[command(about = "Incremental semantic indexing for source trees")]
#[command(after_help = "\
QUICK START:
  vecsync index                   # Index the current directory
  vecsync watch                   # Keep the index in sync with file changes
  vecsync search \"retry logic\"    # Search indexed chunks

CONFIG LOCATIONS:
  Project: .vecsync/config.toml
  User:    ~/.config/vecsync/config.toml")]
struct Cli {
  /// Project root (default: current directory)
  #[arg(short, long, global = true)]
  project: Option<PathBuf>,

  /// Log to a rolling file in the data directory instead of the console
  #[arg(long, global = true)]
  log_file: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Index the whole project, or only the given files
  #[command(after_help = "\
EXAMPLES:
  vecsync index                   # Full pass over the project
  vecsync index src/main.rs       # Reindex one file (removes it if deleted)
  vecsync index --cleanup         # Drop vectors for files that are now ignored")]
  Index {
    /// Files to reindex
    files: Vec<PathBuf>,
    /// Remove vectors of files matched by the current ignore rules
    #[arg(long)]
    cleanup: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Watch the project and reindex files as they change
  Watch {
    /// Skip the full pass before watching
    #[arg(long)]
    no_initial_scan: bool,
  },
  /// Search indexed chunks
  Search {
    /// Search query
    query: String,
    #[arg(short, long, default_value = "10")]
    limit: usize,
    /// Restrict hits to one file extension (rs, py, md, ...)
    #[arg(long = "type", name = "type")]
    file_type: Option<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn resolve_root(project: Option<&Path>) -> Result<PathBuf> {
  let root = match project {
    Some(path) => path.to_path_buf(),
    None => std::env::current_dir().context("Failed to read current directory")?,
  };
  root
    .canonicalize()
    .with_context(|| format!("Project root not found: {}", root.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let root = resolve_root(cli.project.as_deref())?;
  let config = Config::load_for_project(&root);

  // Keep the guard alive so buffered file logs are flushed on exit
  let _guard = init_logging(&config.log, cli.log_file);

  match cli.command {
    Commands::Index { files, cleanup, json } => cmd_index(&root, config, &files, cleanup, json).await,
    Commands::Watch { no_initial_scan } => cmd_watch(&root, config, !no_initial_scan).await,
    Commands::Search {
      query,
      limit,
      file_type,
      json,
    } => cmd_search(&root, config, &query, limit, file_type.as_deref(), json).await,
  }
}
