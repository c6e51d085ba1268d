pub mod actor;
pub mod context;
pub mod db;
pub mod embedding;
pub mod service;

mod domain;
pub use domain::{code, config, event, project};

pub mod dirs;
