//! CLI command implementations

mod index;
mod search;
mod watch;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use vecsync::{
  config::Config, db::VectorStore, embedding::EmbeddingGateway, project::Project, service::code::IndexService,
};

pub use index::cmd_index;
pub use search::cmd_search;
pub use watch::cmd_watch;

/// Everything a command needs to talk to the pipeline
pub(crate) struct Pipeline {
  pub project: Project,
  pub config: Config,
  pub service: Arc<IndexService>,
}

/// Build the embedding gateway, open the vector store and wire the orchestrator
pub(crate) async fn open_pipeline(root: &Path, config: Config) -> Result<Pipeline> {
  let project = Project::from_root(root);

  let embedding = EmbeddingGateway::from_config(&config.embedding).context("Failed to configure embedding provider")?;
  let store = <dyn VectorStore>::from_config(&config.store)
    .await
    .context("Failed to open vector store")?;

  let service = IndexService::new(config.index.clone(), Arc::new(embedding), store);

  Ok(Pipeline {
    project,
    config,
    service: Arc::new(service),
  })
}
