// Input size guard for embedding requests
//
// Chunks are sized in characters, documents from extraction may not be, and
// a provider rejects inputs beyond its context window outright. Truncate
// instead so the rest of the file still gets indexed.

use std::borrow::Cow;

use tracing::warn;

use crate::domain::config::CHARS_PER_TOKEN;

/// Largest input a model accepts, estimated from its context length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimit {
  pub max_tokens: usize,
  pub chars_per_token: usize,
}

impl InputLimit {
  pub fn for_context_length(context_length: usize) -> Self {
    Self {
      max_tokens: context_length,
      chars_per_token: CHARS_PER_TOKEN,
    }
  }

  pub fn max_chars(&self) -> usize {
    self.max_tokens.saturating_mul(self.chars_per_token)
  }

  /// `text` cut to [`InputLimit::max_chars`] characters, borrowed when it already fits.
  pub fn fit<'a>(&self, text: &'a str) -> Cow<'a, str> {
    let max_chars = self.max_chars();
    match text.char_indices().nth(max_chars) {
      None => Cow::Borrowed(text),
      Some((cut, _)) => {
        warn!(
          original_bytes = text.len(),
          kept_chars = max_chars,
          max_tokens = self.max_tokens,
          "Input exceeds embedding model context, truncating"
        );
        Cow::Borrowed(&text[..cut])
      }
    }
  }
}
