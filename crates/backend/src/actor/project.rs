//! ProjectRuntime - wires the pipeline together for one project
//!
//! Owns the project's ignore evaluator, the IndexerActor handle and the
//! WatcherTask lifecycle. The orchestrator itself is shared (`Arc`) so the
//! same instance can serve searches and manual reindexes.
//!
//! ```text
//! notify -> WatcherTask -> IndexerActor -> IndexService -> [EmbeddingGateway, VectorStore]
//!                                               |
//!                                               v
//!                                     JobReport channel (optional)
//! ```

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
  handle::{IndexerHandle, SendError},
  indexer::{IndexerActor, IndexerConfig},
  message::JobReport,
  watcher::{WatchError, WatcherConfig, WatcherTask},
};
use crate::{
  context::files::ignore::IgnoreEvaluator,
  domain::{config::IndexConfig, event::FileEvent, project::Project},
  service::code::{IndexService, ProjectIndexSummary},
};

/// How long `stop_watcher` waits for the watcher task to exit
const WATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProjectRuntime {
  project: Project,
  config: IndexConfig,
  service: Arc<IndexService>,
  evaluator: Arc<IgnoreEvaluator>,
  indexer: IndexerHandle,
  indexer_task: JoinHandle<()>,
  cancel: CancellationToken,
  watcher_cancel: Option<CancellationToken>,
  watcher_handle: Option<JoinHandle<()>>,
}

impl ProjectRuntime {
  /// Load the project's ignore rules and spawn its IndexerActor.
  ///
  /// The watcher is not started; call [`ProjectRuntime::start_watcher`].
  pub fn start(
    project: Project,
    service: Arc<IndexService>,
    reports: Option<mpsc::Sender<JobReport>>,
    cancel: CancellationToken,
  ) -> Self {
    let config = service.config().clone();
    let evaluator = Arc::new(IgnoreEvaluator::new(project.root(), &config.ignore_file_name));

    let cancel = cancel.child_token();
    let (indexer, indexer_task) = IndexerActor::spawn(
      IndexerConfig::from_index_config(&config),
      service.clone(),
      reports,
      cancel.clone(),
    );

    info!(project = %project.name(), root = %project.root().display(), collection = %project.collection(), "Project runtime started");

    Self {
      project,
      config,
      service,
      evaluator,
      indexer,
      indexer_task,
      cancel,
      watcher_cancel: None,
      watcher_handle: None,
    }
  }

  pub fn project(&self) -> &Project {
    &self.project
  }

  pub fn service(&self) -> &Arc<IndexService> {
    &self.service
  }

  pub fn evaluator(&self) -> &Arc<IgnoreEvaluator> {
    &self.evaluator
  }

  pub fn indexer(&self) -> &IndexerHandle {
    &self.indexer
  }

  pub fn is_watching(&self) -> bool {
    self.watcher_cancel.is_some()
  }

  /// Queue one file event on the indexer
  pub async fn submit(&self, event: FileEvent) -> Result<(), SendError> {
    self.indexer.submit(event).await
  }

  /// Index every eligible file under the root with the current rules
  pub async fn index_all(&self) -> ProjectIndexSummary {
    let rules = self.evaluator.current();
    self.service.index_project(&self.project, &rules).await
  }

  /// Start the file watcher. A no-op when it is already running.
  pub fn start_watcher(&mut self) -> Result<(), WatchError> {
    if self.watcher_cancel.is_some() {
      debug!(project = %self.project.name(), "Watcher already running");
      return Ok(());
    }

    let cancel = self.cancel.child_token();
    let handle = WatcherTask::spawn(
      self.project.clone(),
      WatcherConfig::from_index_config(&self.config),
      self.evaluator.clone(),
      self.indexer.clone(),
      cancel.clone(),
    )?;

    self.watcher_handle = Some(handle);
    self.watcher_cancel = Some(cancel);

    info!(project = %self.project.name(), "Started watcher for {:?}", self.project.root());
    Ok(())
  }

  /// Stop the file watcher for this project
  pub async fn stop_watcher(&mut self) {
    if let Some(cancel) = self.watcher_cancel.take() {
      cancel.cancel();
      info!(project = %self.project.name(), "Stopped watcher for {:?}", self.project.root());
    }

    if let Some(handle) = self.watcher_handle.take()
      && tokio::time::timeout(WATCHER_STOP_TIMEOUT, handle).await.is_err()
    {
      warn!(project = %self.project.name(), "Watcher task did not exit in time");
    }
  }

  /// Stop the watcher, then let the indexer finish running jobs
  pub async fn shutdown(mut self) {
    self.stop_watcher().await;

    if self.indexer.shutdown().await.is_err() {
      debug!(project = %self.project.name(), "Indexer already stopped");
    }
    if let Err(e) = (&mut self.indexer_task).await {
      warn!(project = %self.project.name(), err = %e, "Indexer task ended abnormally");
    }

    self.cancel.cancel();
    info!(project = %self.project.name(), "Project runtime stopped");
  }
}
