//! Document text extraction seam
//!
//! PDF/Office parsing lives outside this crate. The orchestrator only needs
//! `extract(path) -> text + metadata`; callers plug an implementation in via
//! [`DocumentExtractor`]. Without one, extractable documents are skipped.

use std::path::Path;

use async_trait::async_trait;

use super::DocumentKind;

/// Plain text pulled out of a document, plus whatever metadata the extractor found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
  pub text: String,
  pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
  #[error("Unsupported document kind: {0}")]
  Unsupported(DocumentKind),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Extraction failed: {0}")]
  Failed(String),
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
  fn name(&self) -> &str;

  async fn extract(&self, path: &Path, kind: DocumentKind) -> Result<ExtractedDocument, ExtractError>;
}
