//! Business logic services.
//!
//! - [`code`] - the indexing orchestrator and code search
//! - [`util`] - shared error type

pub mod code;
pub mod util;
