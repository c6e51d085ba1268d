//! Actor-based concurrency primitives
//!
//! Components communicate via message passing instead of shared state:
//!
//! - [`WatcherTask`]: watches the project tree, debounces events per path and
//!   feeds settled events to the indexer
//! - [`IndexerActor`]: bounded job queue with a fixed number of workers, each
//!   job handled by the shared [`IndexService`](crate::service::code::IndexService)
//! - [`ProjectRuntime`]: per-project wiring of the two, plus full reindex
//!
//! Job outcomes are delivered as [`JobReport`]s on an optional result channel.

pub mod handle;
pub mod indexer;
pub mod message;
mod project;
mod watcher;


pub use handle::{IndexerHandle, SendError};
pub use indexer::{IndexerActor, IndexerConfig};
pub use message::{IndexJob, JobReport};
pub use project::ProjectRuntime;
pub use watcher::{DebounceQueue, WatchError, WatcherConfig, WatcherTask};
