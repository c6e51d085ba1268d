//! Line-aligned overlapping text chunker
//!
//! Splits text into windows of roughly `chunk_size` characters. Boundaries
//! always fall between lines, and each window after the first starts with the
//! trailing lines of its predecessor (the overlap). A single line longer than
//! `chunk_size` is emitted whole, so the size is a soft target.
//!
//! All lengths are counted in `char`s, not bytes. Lines keep their own
//! terminators (`\n` or `\r\n`), so a chunk's content is an exact slice of
//! the source.

/// One window of a chunked document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
  pub content: String,
  /// 0-based position in emission order
  pub index: usize,
  /// Number of chunks produced by the same call
  pub total: usize,
  /// 1-based, inclusive
  pub line_start: usize,
  /// 1-based, inclusive
  pub line_end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
  number: usize,
  /// Including the line terminator, if any
  text: &'a str,
  chars: usize,
}

/// Lines accumulated for the chunk being built.
///
/// `fresh_from` marks where lines carried over as overlap end. Only fresh
/// lines are eligible to seed the next window, so a line lands in at most two
/// consecutive chunks.
#[derive(Default)]
struct Window<'a> {
  lines: Vec<Line<'a>>,
  chars: usize,
  fresh_from: usize,
}

impl<'a> Window<'a> {
  fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }

  /// Length after appending `line`
  fn len_with(&self, line: &Line<'_>) -> usize {
    self.chars + line.chars
  }

  fn push(&mut self, line: Line<'a>) {
    self.chars = self.len_with(&line);
    self.lines.push(line);
  }

  fn to_chunk(&self) -> TextChunk {
    let content: String = self.lines.iter().map(|l| l.text).collect();
    TextChunk {
      content,
      index: 0,
      total: 0,
      line_start: self.lines.first().map(|l| l.number).unwrap_or(1),
      line_end: self.lines.last().map(|l| l.number).unwrap_or(1),
    }
  }

  /// Start the next window from the tail of this one.
  ///
  /// Carries the trailing whole lines whose total length fits in `budget`.
  /// When even the last line is longer than the budget, a character tail
  /// would have to resume after its next newline to stay line-aligned, and
  /// there is none inside that line, so nothing is carried.
  fn seed_next(&self, budget: usize) -> Window<'a> {
    let mut next = Window::default();
    let mut used = 0;
    let mut carried = 0;

    for line in self.lines[self.fresh_from..].iter().rev() {
      if used + line.chars > budget {
        break;
      }
      used += line.chars;
      carried += 1;
    }

    for line in &self.lines[self.lines.len() - carried..] {
      next.push(*line);
    }
    next.fresh_from = next.lines.len();
    next
  }
}

/// Split `text` into line-aligned chunks of about `chunk_size` characters,
/// each overlapping its predecessor by up to `overlap` characters.
///
/// Blank input yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
  if text.trim().is_empty() {
    return Vec::new();
  }

  let mut chunks = Vec::new();

  if text.chars().count() <= chunk_size {
    chunks.push(TextChunk {
      content: text.to_string(),
      index: 0,
      total: 0,
      line_start: 1,
      line_end: text.lines().count().max(1),
    });
  } else {
    let mut window = Window::default();

    for (i, text) in text.split_inclusive('\n').enumerate() {
      let line = Line {
        number: i + 1,
        text,
        chars: text.chars().count(),
      };

      if !window.is_empty() && window.len_with(&line) > chunk_size {
        chunks.push(window.to_chunk());
        window = window.seed_next(overlap);
      }

      window.push(line);
    }

    if !window.is_empty() {
      chunks.push(window.to_chunk());
    }
  }

  // second pass: stamp positions once the count is known
  let total = chunks.len();
  for (index, chunk) in chunks.iter_mut().enumerate() {
    chunk.index = index;
    chunk.total = total;
  }

  chunks
}
