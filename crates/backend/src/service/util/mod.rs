//! Shared utilities for the service layer.

mod error;

pub use error::{ErrorKind, IndexError};
