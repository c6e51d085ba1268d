//! Integration tests for the indexing orchestrator.
//!
//! These run the full per-file flow (classify, read, chunk, embed, write)
//! against a temp project, fake embeddings and the in-memory store.

#[cfg(test)]
mod tests {
  use std::{
    path::Path,
    sync::{Arc, atomic::Ordering},
  };

  use async_trait::async_trait;
  use pretty_assertions::assert_eq;

  use crate::{
    context::files::{
      DocumentKind,
      chunker::chunk_text,
      extract::{DocumentExtractor, ExtractError, ExtractedDocument},
      ignore::IgnoreRuleSet,
    },
    db::{LanceStore, VectorStore},
    domain::{
      config::IndexConfig,
      event::{FileEvent, FileEventKind},
    },
    service::{
      __tests__::helpers::{FakeEmbedding, FlakyStore, TestContext, gateway, test_index_config},
      code::{IndexOutcome, IndexService, SearchParams, SkipReason},
      util::ErrorKind,
    },
  };

  /// ~30 short lines, enough for several 200-char chunks
  fn multi_chunk_source() -> String {
    (0..30)
      .map(|i| format!("let value_{i:02} = compute({i});"))
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn expected_chunks(content: &str) -> usize {
    let config = test_index_config();
    chunk_text(content, config.chunk_size_chars, config.chunk_overlap_chars).len()
  }

  #[tokio::test]
  async fn test_reindex_is_idempotent() {
    let ctx = TestContext::new();
    let content = multi_chunk_source();
    let path = ctx.write("src/values.rs", &content);
    let expected = expected_chunks(&content);
    assert!(expected > 1);

    let first = ctx.service.index_file(&ctx.project, &path).await.unwrap();
    assert_eq!(first, IndexOutcome::Indexed { chunks: expected });

    let second = ctx.service.index_file(&ctx.project, &path).await.unwrap();
    assert_eq!(second, IndexOutcome::Indexed { chunks: expected });

    assert_eq!(ctx.chunks_for(&path).await, expected);
    assert_eq!(ctx.store.len(&ctx.collection()), expected);
  }

  #[tokio::test]
  async fn test_update_drops_chunks_of_previous_version() {
    let ctx = TestContext::new();
    let path = ctx.write("src/values.rs", multi_chunk_source());
    ctx.service.index_file(&ctx.project, &path).await.unwrap();

    std::fs::write(&path, "fn tiny() {}\n").unwrap();
    let outcome = ctx.service.update_file(&ctx.project, &path).await.unwrap();

    assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });
    assert_eq!(ctx.store.len(&ctx.collection()), 1);
  }

  #[tokio::test]
  async fn test_payload_fields() {
    let ctx = TestContext::new();
    let path = ctx.write("src/Main.RS", "fn main() {}\n");
    ctx.service.index_file(&ctx.project, &path).await.unwrap();

    let points = ctx.store.scroll(&ctx.collection(), None, None).await.unwrap();
    assert_eq!(points.len(), 1);
    let payload = &points[0].payload;
    assert_eq!(payload.file_path, crate::domain::project::normalize_path(&path));
    assert_eq!(payload.file_name, "Main.RS");
    assert_eq!(payload.file_type, "rs");
    assert_eq!(payload.project, ctx.project.name());
    assert_eq!((payload.line_start, payload.line_end), (1, 1));
    assert_eq!((payload.chunk_index, payload.total_chunks), (0, 1));
    assert_eq!(payload.content, "fn main() {}\n");
  }

  #[tokio::test]
  async fn test_unlink_removes_every_vector() {
    let ctx = TestContext::new();
    let path = ctx.write("src/values.rs", multi_chunk_source());
    ctx.service.index_file(&ctx.project, &path).await.unwrap();
    assert!(ctx.chunks_for(&path).await > 0);

    std::fs::remove_file(&path).unwrap();
    let outcome = ctx.service.remove_file(&ctx.project, &path).await.unwrap();

    assert_eq!(outcome, IndexOutcome::Removed);
    assert_eq!(ctx.chunks_for(&path).await, 0);
  }

  #[tokio::test]
  async fn test_change_for_vanished_file_clears_vectors() {
    let ctx = TestContext::new();
    let path = ctx.write("notes.txt", "some notes\n");
    ctx.service.index_file(&ctx.project, &path).await.unwrap();

    std::fs::remove_file(&path).unwrap();
    let outcome = ctx.service.update_file(&ctx.project, &path).await.unwrap();

    assert_eq!(outcome, IndexOutcome::Removed);
    assert_eq!(ctx.chunks_for(&path).await, 0);
  }

  #[tokio::test]
  async fn test_binary_files_skipped() {
    let ctx = TestContext::new();

    let png = ctx.write("logo.png", b"\x89PNG\r\n\x1a\nrest");
    assert_eq!(
      ctx.service.index_file(&ctx.project, &png).await.unwrap(),
      IndexOutcome::Skipped(SkipReason::Binary)
    );

    // text at first, then rewritten with a NUL byte: old vectors must go
    let blob = ctx.write("data.blob", "readable text\n");
    ctx.service.index_file(&ctx.project, &blob).await.unwrap();
    assert_eq!(ctx.chunks_for(&blob).await, 1);

    std::fs::write(&blob, b"abc\x00def").unwrap();
    assert_eq!(
      ctx.service.update_file(&ctx.project, &blob).await.unwrap(),
      IndexOutcome::Skipped(SkipReason::Binary)
    );
    assert_eq!(ctx.chunks_for(&blob).await, 0);
    assert_eq!(ctx.embedding.batch_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_size_ceiling_and_empty_files() {
    let ctx = TestContext::new();

    let big = ctx.write("big.txt", "x".repeat(5000));
    assert_eq!(
      ctx.service.index_file(&ctx.project, &big).await.unwrap(),
      IndexOutcome::Skipped(SkipReason::TooLarge {
        size: 5000,
        limit: 4096
      })
    );

    let blank = ctx.write("blank.md", "   \n\n\t\n");
    assert_eq!(
      ctx.service.index_file(&ctx.project, &blank).await.unwrap(),
      IndexOutcome::Skipped(SkipReason::Empty)
    );
    assert!(ctx.store.is_empty(&ctx.collection()));
  }

  #[tokio::test]
  async fn test_directory_is_not_a_file() {
    let ctx = TestContext::new();
    let dir = ctx.root().join("src");
    std::fs::create_dir_all(&dir).unwrap();

    assert_eq!(
      ctx.service.index_file(&ctx.project, &dir).await.unwrap(),
      IndexOutcome::Skipped(SkipReason::NotAFile)
    );
  }

  struct StubExtractor;

  #[async_trait]
  impl DocumentExtractor for StubExtractor {
    fn name(&self) -> &str {
      "stub"
    }

    async fn extract(&self, _path: &Path, kind: DocumentKind) -> Result<ExtractedDocument, ExtractError> {
      match kind {
        DocumentKind::Pdf => Ok(ExtractedDocument {
          text: "quarterly revenue grew\n".to_string(),
          ..Default::default()
        }),
        other => Err(ExtractError::Unsupported(other)),
      }
    }
  }

  #[tokio::test]
  async fn test_documents_route_through_extractor() {
    let ctx = TestContext::new();
    let pdf = ctx.write("report.pdf", b"%PDF-1.7 binary body");

    // no extractor configured
    assert_eq!(
      ctx.service.index_file(&ctx.project, &pdf).await.unwrap(),
      IndexOutcome::Skipped(SkipReason::NoExtractor(DocumentKind::Pdf))
    );

    let service = IndexService::new(test_index_config(), gateway(Arc::new(FakeEmbedding::default())), ctx.store.clone())
      .with_extractor(Arc::new(StubExtractor));
    assert_eq!(
      service.index_file(&ctx.project, &pdf).await.unwrap(),
      IndexOutcome::Indexed { chunks: 1 }
    );

    let points = ctx.store.scroll(&ctx.collection(), None, None).await.unwrap();
    assert_eq!(points[0].payload.content, "quarterly revenue grew\n");
    assert_eq!(points[0].payload.file_type, "pdf");

    let docx = ctx.write("notes.docx", b"PK\x03\x04zip");
    let err = service.index_file(&ctx.project, &docx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
  }

  #[tokio::test]
  async fn test_cleanup_after_ignore_change() {
    let ctx = TestContext::new();
    let kept = ctx.write("src/lib.rs", "pub fn kept() {}\n");
    let generated = ctx.write("generated/out.js", "export const x = 1;\n");
    ctx.service.index_file(&ctx.project, &kept).await.unwrap();
    ctx.service.index_file(&ctx.project, &generated).await.unwrap();

    ctx.write(".vecsyncignore", "generated/\n");
    let rules = IgnoreRuleSet::load(ctx.root(), ".vecsyncignore");
    let removed = ctx.service.cleanup_ignored(&ctx.project, &rules).await.unwrap();

    assert_eq!(removed, 1);
    assert_eq!(ctx.chunks_for(&generated).await, 0);
    assert_eq!(ctx.chunks_for(&kept).await, 1);

    // nothing left to clean
    assert_eq!(ctx.service.cleanup_ignored(&ctx.project, &rules).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_events_for_one_path() {
    let ctx = TestContext::new();
    let content = multi_chunk_source();
    let path = ctx.write("src/values.rs", &content);

    let mut handles = Vec::new();
    for i in 0..8 {
      let service = ctx.service.clone();
      let kind = if i % 2 == 0 { FileEventKind::Add } else { FileEventKind::Change };
      let event = FileEvent::new(kind, path.clone(), ctx.project.clone());
      handles.push(tokio::spawn(async move { service.on_file_event(&event).await }));
    }
    for handle in handles {
      handle.await.unwrap().unwrap();
    }

    // interleaved delete/insert would leave duplicates
    assert_eq!(ctx.chunks_for(&path).await, expected_chunks(&content));
    assert_eq!(ctx.service.active_locks(), 0);
  }

  #[tokio::test]
  async fn test_write_retried_then_succeeds() {
    let ctx = TestContext::new();
    let store = Arc::new(FlakyStore::failing(1));
    let service = IndexService::new(test_index_config(), gateway(ctx.embedding.clone()), store.clone());
    let path = ctx.write("a.txt", "hello\n");

    let outcome = service.index_file(&ctx.project, &path).await.unwrap();

    assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });
    assert_eq!(store.upsert_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.len(&ctx.collection()), 1);
  }

  #[tokio::test]
  async fn test_exhausted_write_reports_consistency_error() {
    let ctx = TestContext::new();
    let store = Arc::new(FlakyStore::failing(usize::MAX));
    let config = IndexConfig {
      write_retries: 3,
      ..test_index_config()
    };
    let service = IndexService::new(config, gateway(ctx.embedding.clone()), store.clone());
    let path = ctx.write("a.txt", "hello\n");

    let err = service.index_file(&ctx.project, &path).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert_eq!(store.upsert_attempts.load(Ordering::SeqCst), 3);
    assert!(store.inner.is_empty(&ctx.collection()));
  }

  #[tokio::test]
  async fn test_path_outside_project_rejected() {
    let ctx = TestContext::new();
    let outside = tempfile::NamedTempFile::new().unwrap();

    let err = ctx.service.index_file(&ctx.project, outside.path()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(err.to_string().contains("outside the project root"));
  }

  #[tokio::test]
  async fn test_search_code_ranks_and_filters() {
    let ctx = TestContext::new();
    let rust = ctx.write("src/parse.rs", "fn parse_arguments() {}");
    let script = ctx.write("web/app.ts", "zzzz qqqq wwww");
    ctx.service.index_file(&ctx.project, &rust).await.unwrap();
    ctx.service.index_file(&ctx.project, &script).await.unwrap();

    let hits = ctx
      .service
      .search_code(&ctx.project, &SearchParams::new("fn parse_arguments() {}"))
      .await
      .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].payload.file_name, "parse.rs");
    assert!(hits[0].score > hits[1].score);

    let filtered = ctx
      .service
      .search_code(
        &ctx.project,
        &SearchParams::new("fn parse_arguments() {}").with_file_type(".TS"),
      )
      .await
      .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].payload.file_name, "app.ts");

    let before = ctx.embedding.texts_embedded.load(Ordering::SeqCst);
    let blank = ctx.service.search_code(&ctx.project, &SearchParams::new("   ")).await.unwrap();
    assert!(blank.is_empty());
    assert_eq!(ctx.embedding.texts_embedded.load(Ordering::SeqCst), before);
  }

  #[tokio::test]
  async fn test_search_before_indexing_is_empty() {
    let ctx = TestContext::new();
    let hits = ctx
      .service
      .search_code(&ctx.project, &SearchParams::new("anything").with_limit(5))
      .await
      .unwrap();
    assert!(hits.is_empty());
  }

  #[tokio::test]
  async fn test_index_project_skips_ignored_and_binary() {
    let ctx = TestContext::new();
    ctx.write("src/main.rs", "fn main() {}\n");
    ctx.write("src/util.rs", "pub fn util() {}\n");
    ctx.write("node_modules/dep/index.js", "module.exports = {};\n");
    ctx.write("assets/icon.png", b"\x89PNG\r\n\x1a\n");
    ctx.write("empty.txt", "");

    let rules = IgnoreRuleSet::load(ctx.root(), ".vecsyncignore");
    let summary = ctx.service.index_project(&ctx.project, &rules).await;

    assert_eq!(summary.files_scanned, 3);
    assert_eq!(summary.files_indexed, 2);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_failed, 0);
    assert_eq!(summary.chunks_created, 2);
  }

  #[tokio::test]
  async fn test_full_index_drops_files_gone_from_disk() {
    let ctx = TestContext::new();
    let kept = ctx.write("src/kept.rs", "pub fn kept() {}\n");
    let gone = ctx.write("src/gone.rs", "pub fn gone() {}\n");
    let generated = ctx.write("generated/out.js", "export const x = 1;\n");

    let rules = IgnoreRuleSet::load(ctx.root(), ".vecsyncignore");
    let first = ctx.service.index_project(&ctx.project, &rules).await;
    assert_eq!(first.files_indexed, 3);
    assert_eq!(first.files_removed, 0);

    std::fs::remove_file(&gone).unwrap();
    ctx.write(".vecsyncignore", "generated/\n");
    let rules = IgnoreRuleSet::load(ctx.root(), ".vecsyncignore");
    let second = ctx.service.index_project(&ctx.project, &rules).await;

    assert_eq!(second.files_removed, 2);
    assert_eq!(ctx.chunks_for(&gone).await, 0);
    assert_eq!(ctx.chunks_for(&generated).await, 0);
    assert_eq!(ctx.chunks_for(&kept).await, 1);
    assert_eq!(ctx.service.active_locks(), 0);
  }

  #[tokio::test]
  async fn test_remove_tree_after_directory_rename() {
    let ctx = TestContext::new();
    let a = ctx.write("src/a.rs", "pub fn a() {}\n");
    let b = ctx.write("src/b.rs", "pub fn b() {}\n");
    let top = ctx.write("src.rs", "mod src;\n");
    for path in [&a, &b, &top] {
      ctx.service.index_file(&ctx.project, path).await.unwrap();
    }

    std::fs::rename(ctx.root().join("src"), ctx.root().join("lib")).unwrap();
    // recreated before the removal runs: its fresh vectors stay
    ctx.write("src/b.rs", "pub fn b2() {}\n");
    ctx.service.index_file(&ctx.project, &b).await.unwrap();

    let removed = ctx.service.remove_tree(&ctx.project, &ctx.root().join("src")).await.unwrap();

    assert_eq!(removed, 1);
    assert_eq!(ctx.chunks_for(&a).await, 0);
    assert_eq!(ctx.chunks_for(&b).await, 1);
    // sibling sharing the name prefix is not under the directory
    assert_eq!(ctx.chunks_for(&top).await, 1);

    // nothing stored under the new name until its files are indexed
    assert_eq!(ctx.service.remove_tree(&ctx.project, &ctx.root().join("lib")).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_relative_paths_resolve_against_root() {
    let ctx = TestContext::new();
    let absolute = ctx.write("src/a.rs", "pub fn a() {}\n");

    let outcome = ctx.service.index_file(&ctx.project, Path::new("src/a.rs")).await.unwrap();
    assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });
    assert_eq!(ctx.chunks_for(&absolute).await, 1);

    // same file through the absolute path shares one vector set
    ctx.service.update_file(&ctx.project, &absolute).await.unwrap();
    assert_eq!(ctx.store.len(&ctx.collection()), 1);

    let outcome = ctx
      .service
      .remove_file(&ctx.project, Path::new("./lib/../src/a.rs"))
      .await
      .unwrap();
    assert_eq!(outcome, IndexOutcome::Removed);
    assert!(ctx.store.is_empty(&ctx.collection()));

    let err = ctx
      .service
      .index_file(&ctx.project, Path::new("../outside.rs"))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("outside the project root"));
  }

  #[tokio::test]
  async fn test_concurrent_first_writes_create_collection_once() {
    let ctx = TestContext::new();
    for i in 0..16 {
      ctx.write(&format!("src/file_{i:02}.rs"), format!("pub fn f{i}() {{}}\n"));
    }

    let store_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(
      LanceStore::open(&store_dir.path().join("index.lancedb").to_string_lossy())
        .await
        .unwrap(),
    );
    let config = IndexConfig {
      max_concurrent_jobs: 8,
      ..test_index_config()
    };
    let service = IndexService::new(config, gateway(ctx.embedding.clone()), store.clone());

    let rules = IgnoreRuleSet::load(ctx.root(), ".vecsyncignore");
    let summary = service.index_project(&ctx.project, &rules).await;

    assert_eq!(summary.files_failed, 0);
    assert_eq!(summary.files_indexed, 16);
    assert_eq!(store.scroll(&ctx.collection(), None, None).await.unwrap().len(), 16);
  }
}
