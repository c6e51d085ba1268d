//! Actor handles for communicating with actors
//!
//! Handles are cheap to clone and wrap the channel sender of the actor they
//! talk to.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::message::IndexJob;
use crate::{
  context::files::ignore::IgnoreRuleSet,
  domain::{event::FileEvent, project::Project},
};

// ============================================================================
// Indexer Handle
// ============================================================================

/// Handle to communicate with an IndexerActor
///
/// Jobs are fire-and-forget; completion is reported on the actor's result
/// channel when one was configured. `send` waits while the queue is full.
#[derive(Clone, Debug)]
pub struct IndexerHandle {
  pub tx: mpsc::Sender<IndexJob>,
}

impl IndexerHandle {
  /// Create a new handle from a sender
  pub fn new(tx: mpsc::Sender<IndexJob>) -> Self {
    Self { tx }
  }

  /// Send a job to the actor
  pub async fn send(&self, job: IndexJob) -> Result<(), SendError> {
    self.tx.send(job).await.map_err(|_| SendError::ActorGone)
  }

  pub async fn submit(&self, event: FileEvent) -> Result<(), SendError> {
    self.send(IndexJob::event(event)).await
  }

  pub async fn cleanup(&self, project: Project, rules: Arc<IgnoreRuleSet>) -> Result<(), SendError> {
    self.send(IndexJob::Cleanup { project, rules }).await
  }

  /// Request the indexer to shutdown
  pub async fn shutdown(&self) -> Result<(), SendError> {
    self.send(IndexJob::Shutdown).await
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to an actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,
}
