//! Deterministic text chunker: char windows with overlap, split on word
//! boundaries when possible. See the Chunker component design.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkerConfig {
  pub chunk_size: usize,
  pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
  fn default() -> Self {
    Self {
      chunk_size: 1000,
      chunk_overlap: 200,
    }
  }
}

/// A chunk produced by [`chunk_text`]: `offset` is the character index of
/// the chunk's start within `text` (or the page text, if paged).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
  pub text: String,
  pub offset: usize,
}

/// How far back from a window boundary we're willing to search for a
/// whitespace split point, expressed as a fraction of `chunk_size`.
const BOUNDARY_SEARCH_FRACTION: usize = 4;

/// Split `text` into overlapping character windows.
///
/// Windows are `chunk_size` characters wide with `chunk_overlap` characters
/// of overlap between consecutive windows, preferring to break on a
/// whitespace boundary near the window edge rather than mid-word. Empty
/// input yields an empty output (callers record the file `failed` with
/// "no text extracted" per the Chunker contract).
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<TextChunk> {
  if text.is_empty() || config.chunk_size == 0 {
    return Vec::new();
  }

  let chars: Vec<char> = text.chars().collect();
  let len = chars.len();
  let overlap = config.chunk_overlap.min(config.chunk_size.saturating_sub(1));
  let search_window = (config.chunk_size / BOUNDARY_SEARCH_FRACTION).max(1);

  let mut chunks = Vec::new();
  let mut start = 0usize;

  while start < len {
    let mut end = (start + config.chunk_size).min(len);

    if end < len {
      end = find_word_boundary(&chars, start, end, search_window);
    }

    let slice: String = chars[start..end].iter().collect();
    chunks.push(TextChunk { text: slice, offset: start });

    if end >= len {
      break;
    }

    let next_start = end.saturating_sub(overlap);
    start = if next_start > start { next_start } else { end };
  }

  chunks
}

/// Search backward from `ideal_end` (but no further than `search_window`
/// characters, and never before `start`) for a whitespace character,
/// returning the index just after it. Falls back to `ideal_end` if none
/// is found, which splits mid-word rather than producing a zero-length
/// window.
fn find_word_boundary(chars: &[char], start: usize, ideal_end: usize, search_window: usize) -> usize {
  let earliest = ideal_end.saturating_sub(search_window).max(start + 1);
  let mut i = ideal_end;
  while i > earliest {
    if chars[i - 1].is_whitespace() {
      return i;
    }
    i -= 1;
  }
  ideal_end
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_text_yields_no_chunks() {
    assert!(chunk_text("", &ChunkerConfig::default()).is_empty());
  }

  #[test]
  fn short_text_is_a_single_chunk() {
    let chunks = chunk_text("Hello world.", &ChunkerConfig::default());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Hello world.");
    assert_eq!(chunks[0].offset, 0);
  }

  #[test]
  fn windows_overlap_and_cover_the_input() {
    let text = "a".repeat(2500);
    let config = ChunkerConfig {
      chunk_size: 1000,
      chunk_overlap: 200,
    };
    let chunks = chunk_text(&text, &config);
    assert!(chunks.len() >= 3);
    // consecutive offsets advance by chunk_size - overlap (no boundary found in all-'a' text)
    assert_eq!(chunks[1].offset, chunks[0].offset + 800);
  }

  #[test]
  fn is_deterministic() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
    let config = ChunkerConfig::default();
    let a = chunk_text(&text, &config);
    let b = chunk_text(&text, &config);
    assert_eq!(a, b);
  }

  #[test]
  fn prefers_word_boundaries() {
    let text = format!("{} END_OF_WORD {}", "x".repeat(990), "y".repeat(500));
    let config = ChunkerConfig {
      chunk_size: 1000,
      chunk_overlap: 100,
    };
    let chunks = chunk_text(&text, &config);
    // first chunk should not cut through END_OF_WORD mid-token
    assert!(!chunks[0].text.ends_with("END_OF"));
  }

  #[test]
  fn single_chunk_larger_than_budget_is_still_taken() {
    // a chunk_size of 0 would loop forever; smallest valid size is 1
    let config = ChunkerConfig {
      chunk_size: 1,
      chunk_overlap: 0,
    };
    let chunks = chunk_text("ab", &config);
    assert_eq!(chunks.len(), 2);
  }
}
