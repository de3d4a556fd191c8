//! Parser Registry: maps a lowercase extension to a parsing capability.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
  #[error("no parser registered for extension {0:?}")]
  Unsupported(String),
  #[error("io error reading {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("{0}")]
  Malformed(String),
}

/// Per-page text, for formats with pagination (PDF, etc). Formats without
/// pages produce a single implicit page numbered 0.
#[derive(Debug, Clone)]
pub struct Page {
  pub page: i64,
  pub text: String,
}

#[derive(Debug, Clone)]
pub struct ParseOutput {
  pub text: String,
  pub pages: Option<Vec<Page>>,
}

/// A registered parser: `parse()` plus the declared metadata the Work Queue
/// and Chunker need (parser version, chunk size/overlap defaults).
pub trait Parser: Send + Sync {
  fn parse(&self, path: &Path) -> Result<ParseOutput, ParseError>;

  /// Bumped when the parser changes semantics; existing chunks for files
  /// below this version are considered outdated by the reconciler.
  fn parser_version(&self) -> i64;

  fn chunk_size(&self) -> usize {
    1000
  }

  fn chunk_overlap(&self) -> usize {
    200
  }

  fn enabled_by_default(&self) -> bool {
    true
  }
}

/// Plain-text parser: `.txt` files are read verbatim, no pagination.
pub struct TextParser;

impl Parser for TextParser {
  fn parse(&self, path: &Path) -> Result<ParseOutput, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Ok(ParseOutput { text, pages: None })
  }

  fn parser_version(&self) -> i64 {
    1
  }
}

/// Markdown parser: content is indexed as-is (no frontmatter stripping).
pub struct MarkdownParser;

impl Parser for MarkdownParser {
  fn parse(&self, path: &Path) -> Result<ParseOutput, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Ok(ParseOutput { text, pages: None })
  }

  fn parser_version(&self) -> i64 {
    1
  }
}

pub struct ParserRegistry {
  parsers: HashMap<String, Box<dyn Parser>>,
}

impl Default for ParserRegistry {
  fn default() -> Self {
    let mut registry = Self::empty();
    registry.register("txt", Box::new(TextParser));
    registry.register("md", Box::new(MarkdownParser));
    registry
  }
}

impl ParserRegistry {
  pub fn empty() -> Self {
    Self { parsers: HashMap::new() }
  }

  pub fn register(&mut self, ext: &str, parser: Box<dyn Parser>) {
    self.parsers.insert(ext.to_lowercase(), parser);
  }

  pub fn get(&self, ext: &str) -> Option<&dyn Parser> {
    self.parsers.get(&ext.to_lowercase()).map(|p| p.as_ref())
  }

  pub fn supports(&self, ext: &str) -> bool {
    self.parsers.contains_key(&ext.to_lowercase())
  }

  pub fn declared_parser_version(&self, ext: &str) -> Option<i64> {
    self.get(ext).map(|p| p.parser_version())
  }

  pub fn extensions(&self) -> impl Iterator<Item = &str> {
    self.parsers.keys().map(|s| s.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn default_registry_supports_txt_and_md() {
    let registry = ParserRegistry::default();
    assert!(registry.supports("txt"));
    assert!(registry.supports("TXT"));
    assert!(registry.supports("md"));
    assert!(!registry.supports("pdf"));
  }

  #[test]
  fn text_parser_reads_file_verbatim() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "Hello world.").unwrap();
    let output = TextParser.parse(file.path()).unwrap();
    assert_eq!(output.text, "Hello world.");
    assert!(output.pages.is_none());
  }

  #[test]
  fn declared_parser_version_is_stable() {
    let registry = ParserRegistry::default();
    assert_eq!(registry.declared_parser_version("txt"), Some(1));
    assert_eq!(registry.declared_parser_version("unknown"), None);
  }
}
