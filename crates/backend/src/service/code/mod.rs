//! Code indexing and search.
//!
//! - [`index`] - per-file event handling, cleanup and full project passes
//! - [`search`] - semantic search over indexed chunks
//! - [`scan`] - project file discovery

pub mod index;
pub mod scan;
pub mod search;

pub use index::{IndexOutcome, IndexService, ProjectIndexSummary, SkipReason};
pub use scan::{ScanResult, scan_project, scan_tree};
pub use search::SearchParams;
