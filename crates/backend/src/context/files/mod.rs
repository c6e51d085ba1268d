//! File classification
//!
//! Decides whether a file is plain text, an extractable document or binary.
//! Checks run cheapest first:
//!
//! ```text
//! extension (binary) → extension (document) → magic bytes → NUL byte → plain text
//! ```
//!
//! The extension checks need no I/O, so the watcher can run them per event.
//! Byte sniffing only happens when the caller supplies a sample.

pub mod chunker;
pub mod extract;
pub mod ignore;

use std::path::Path;

use tokio::io::AsyncReadExt;

// ============================================================================
// Classification Types
// ============================================================================

/// Document families that need a text-extraction step before chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
  Pdf,
  Word,
  Excel,
  PowerPoint,
  OpenDocument,
  Rtf,
  Epub,
}

impl std::fmt::Display for DocumentKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      DocumentKind::Pdf => "pdf",
      DocumentKind::Word => "word",
      DocumentKind::Excel => "excel",
      DocumentKind::PowerPoint => "powerpoint",
      DocumentKind::OpenDocument => "opendocument",
      DocumentKind::Rtf => "rtf",
      DocumentKind::Epub => "epub",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
  PlainText,
  ExtractableDocument(DocumentKind),
  Binary,
}

// ============================================================================
// Lookup Tables
// ============================================================================

/// Extensions that are always binary
#[rustfmt::skip]
const BINARY_EXTENSIONS: &[&str] = &[
  // images
  "png", "jpg", "jpeg", "gif", "bmp", "ico", "icns", "webp", "tif", "tiff", "psd", "heic", "avif",
  // audio/video
  "mp3", "mp4", "m4a", "m4v", "wav", "ogg", "flac", "aac", "avi", "mov", "mkv", "webm", "wmv",
  // archives
  "zip", "tar", "gz", "tgz", "bz2", "xz", "zst", "7z", "rar", "jar", "war", "apk", "dmg", "iso",
  // executables and objects
  "exe", "dll", "so", "dylib", "bin", "o", "a", "lib", "obj", "class", "pyc", "pyo", "wasm",
  // fonts
  "woff", "woff2", "ttf", "otf", "eot",
  // data
  "db", "sqlite", "sqlite3", "parquet", "arrow", "lance", "npy", "npz", "pkl",
];

/// Extensions handled by the document-extraction path
const DOCUMENT_EXTENSIONS: &[(&str, DocumentKind)] = &[
  ("pdf", DocumentKind::Pdf),
  ("doc", DocumentKind::Word),
  ("docx", DocumentKind::Word),
  ("xls", DocumentKind::Excel),
  ("xlsx", DocumentKind::Excel),
  ("ppt", DocumentKind::PowerPoint),
  ("pptx", DocumentKind::PowerPoint),
  ("odt", DocumentKind::OpenDocument),
  ("ods", DocumentKind::OpenDocument),
  ("odp", DocumentKind::OpenDocument),
  ("rtf", DocumentKind::Rtf),
  ("epub", DocumentKind::Epub),
];

/// Leading-byte signatures of common binary formats, checked in order
const MAGIC_SIGNATURES: &[&[u8]] = &[
  b"\x89PNG\r\n\x1a\n",
  b"\xFF\xD8\xFF",     // jpeg
  b"GIF87a",
  b"GIF89a",
  b"RIFF",             // wav, avi, webp
  b"OggS",
  b"fLaC",
  b"ID3",              // mp3
  b"PK\x03\x04",       // zip family
  b"\x1F\x8B",         // gzip
  b"BZh",
  b"\xFD7zXZ\x00",
  b"7z\xBC\xAF\x27\x1C",
  b"Rar!\x1A\x07",
  b"\x28\xB5\x2F\xFD", // zstd
  b"\x7FELF",
  b"\xCA\xFE\xBA\xBE", // mach-o fat, java class
  b"\xFE\xED\xFA\xCE",
  b"\xFE\xED\xFA\xCF",
  b"\xCE\xFA\xED\xFE",
  b"\xCF\xFA\xED\xFE",
  b"\x00asm",
  b"SQLite format 3\x00",
];

/// Bytes scanned for a NUL when no signature matches
pub const NUL_SCAN_BYTES: usize = 512;

// ============================================================================
// Classification
// ============================================================================

fn extension_of(path: &Path) -> Option<String> {
  path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase())
}

/// Cheap check used before scheduling work: extension lookup only, no I/O.
pub fn is_binary_extension(path: &Path) -> bool {
  extension_of(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

/// Document kind implied by the extension, if any
pub fn document_kind(path: &Path) -> Option<DocumentKind> {
  let ext = extension_of(path)?;
  DOCUMENT_EXTENSIONS
    .iter()
    .find(|(candidate, _)| *candidate == ext)
    .map(|(_, kind)| *kind)
}

/// Whether the sample looks like binary content
pub fn sample_is_binary(sample: &[u8]) -> bool {
  if MAGIC_SIGNATURES.iter().any(|sig| sample.starts_with(sig)) {
    return true;
  }
  let head = &sample[..sample.len().min(NUL_SCAN_BYTES)];
  head.contains(&0)
}

/// Classify a file by path and optional head-of-file sample.
///
/// Unknown extensions default to `PlainText`. Document extensions are decided
/// before sniffing because those formats are binary containers.
pub fn classify(path: &Path, sample: Option<&[u8]>) -> FileClassification {
  if is_binary_extension(path) {
    return FileClassification::Binary;
  }

  if let Some(kind) = document_kind(path) {
    return FileClassification::ExtractableDocument(kind);
  }

  match sample {
    Some(bytes) if sample_is_binary(bytes) => FileClassification::Binary,
    _ => FileClassification::PlainText,
  }
}

/// Read up to `limit` bytes from the start of a file
pub async fn read_sample(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
  let file = tokio::fs::File::open(path).await?;
  let mut sample = Vec::with_capacity(limit);
  file.take(limit as u64).read_to_end(&mut sample).await?;
  Ok(sample)
}
