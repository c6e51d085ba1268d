//! Domain types - core business entities
//!
//! Canonical types shared by the pipeline: configuration, projects, file
//! events and the stored vector model. They carry no persistence or I/O logic.

pub mod code;
pub mod config;
pub mod event;
pub mod project;
