//! File-level context: ignore rules, classification, chunking and extraction.

pub mod files;
