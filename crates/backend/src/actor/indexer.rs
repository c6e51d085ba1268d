//! IndexerActor - bounded worker queue in front of the orchestrator
//!
//! Jobs arrive on a bounded `mpsc` channel, so producers (the watcher, a
//! manual reindex) wait when the queue is full. Each job runs as its own task
//! once it holds a semaphore permit, which caps how many files are in flight.
//! Outcomes go to an optional result channel instead of being dropped.
//!
//! ## Shutdown
//!
//! On `Shutdown`, cancellation or channel close the actor stops taking jobs,
//! discards whatever is still queued, and waits up to the grace period for
//! running jobs. Jobs still running after that are detached, not aborted, so
//! an in-flight store write is never cut in half.

use std::{sync::Arc, time::Duration};

use tokio::{
  sync::{OwnedSemaphorePermit, Semaphore, mpsc},
  task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
  handle::IndexerHandle,
  message::{IndexJob, JobReport},
};
use crate::{domain::config::IndexConfig, service::code::IndexService};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct IndexerConfig {
  /// Jobs allowed to run at once
  pub workers: usize,
  /// Capacity of the job queue
  pub queue_capacity: usize,
  /// How long shutdown waits for running jobs
  pub shutdown_grace: Duration,
}

impl IndexerConfig {
  pub fn from_index_config(index: &IndexConfig) -> Self {
    Self {
      workers: index.worker_count(),
      queue_capacity: index.queue_capacity.max(1),
      shutdown_grace: Duration::from_millis(index.shutdown_grace_ms),
    }
  }
}

// ============================================================================
// IndexerActor
// ============================================================================

/// The actor runs until one of:
/// - The CancellationToken is triggered
/// - An IndexJob::Shutdown message is received
/// - The job channel is closed
pub struct IndexerActor {
  config: IndexerConfig,
  service: Arc<IndexService>,
  job_rx: mpsc::Receiver<IndexJob>,
  reports: Option<mpsc::Sender<JobReport>>,
  cancel: CancellationToken,
  permits: Arc<Semaphore>,
  tasks: JoinSet<()>,
}

impl IndexerActor {
  pub fn new(
    config: IndexerConfig,
    service: Arc<IndexService>,
    job_rx: mpsc::Receiver<IndexJob>,
    reports: Option<mpsc::Sender<JobReport>>,
    cancel: CancellationToken,
  ) -> Self {
    let permits = Arc::new(Semaphore::new(config.workers.max(1)));
    Self {
      config,
      service,
      job_rx,
      reports,
      cancel,
      permits,
      tasks: JoinSet::new(),
    }
  }

  /// Spawn the actor and return a handle for sending jobs plus the actor task
  pub fn spawn(
    config: IndexerConfig,
    service: Arc<IndexService>,
    reports: Option<mpsc::Sender<JobReport>>,
    cancel: CancellationToken,
  ) -> (IndexerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let actor = Self::new(config, service, rx, reports, cancel);
    let task = tokio::spawn(actor.run());
    (IndexerHandle::new(tx), task)
  }

  /// Main actor loop
  pub async fn run(mut self) {
    info!(workers = self.config.workers, queue = self.config.queue_capacity, "IndexerActor started");

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              info!("IndexerActor shutting down (cancelled)");
              break;
          }

          Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
              log_join_result(joined);
          }

          job = self.job_rx.recv() => {
              match job {
                  Some(IndexJob::Shutdown) => {
                      info!("IndexerActor shutting down (requested)");
                      break;
                  }
                  Some(job) => {
                      let Some(permit) = self.acquire_permit().await else {
                          break;
                      };
                      self.start_job(job, permit);
                  }
                  None => {
                      info!("IndexerActor shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    self.drain().await;
    info!("IndexerActor stopped");
  }

  /// Wait for a free worker slot, reaping finished tasks meanwhile.
  /// `None` when cancelled while waiting.
  async fn acquire_permit(&mut self) -> Option<OwnedSemaphorePermit> {
    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => return None,

          permit = self.permits.clone().acquire_owned() => return permit.ok(),

          Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
              log_join_result(joined);
          }
      }
    }
  }

  fn start_job(&mut self, job: IndexJob, permit: OwnedSemaphorePermit) {
    let service = self.service.clone();
    let reports = self.reports.clone();

    self.tasks.spawn(async move {
      let _permit = permit;
      let report = match job {
        IndexJob::Event(event) => {
          let result = service.on_file_event(&event).await;
          JobReport::File { event, result }
        }
        IndexJob::Cleanup { project, rules } => {
          let result = service.cleanup_ignored(&project, &rules).await;
          if let Err(e) = &result {
            error!(project = %project.name(), err = %e, "Ignore cleanup failed");
          }
          JobReport::Cleanup { project, result }
        }
        IndexJob::RemoveTree { project, dir } => {
          let result = service.remove_tree(&project, &dir).await;
          if let Err(e) = &result {
            warn!(dir = %dir.display(), err = %e, "Failed to remove vectors under deleted directory");
          }
          JobReport::Tree { project, dir, result }
        }
        IndexJob::Shutdown => return,
      };

      if let Some(tx) = reports
        && tx.send(report).await.is_err()
      {
        debug!("Job report receiver dropped");
      }
    });
  }

  /// Stop intake, drop queued jobs, and give running ones the grace period
  async fn drain(&mut self) {
    self.job_rx.close();
    let mut discarded = 0usize;
    while self.job_rx.try_recv().is_ok() {
      discarded += 1;
    }
    if discarded > 0 {
      info!(discarded, "Discarded queued index jobs on shutdown");
    }

    let running = self.tasks.len();
    if running == 0 {
      return;
    }

    debug!(running, grace_ms = self.config.shutdown_grace.as_millis(), "Waiting for running index jobs");
    let tasks = &mut self.tasks;
    let waited = tokio::time::timeout(self.config.shutdown_grace, async {
      while let Some(joined) = tasks.join_next().await {
        log_join_result(joined);
      }
    })
    .await;

    if waited.is_err() {
      warn!(
        still_running = self.tasks.len(),
        "Shutdown grace period elapsed, leaving remaining index jobs to finish in the background"
      );
      self.tasks.detach_all();
    }
  }
}

fn log_join_result(joined: Result<(), tokio::task::JoinError>) {
  if let Err(e) = joined
    && e.is_panic()
  {
    error!(err = %e, "Index job panicked");
  }
}
