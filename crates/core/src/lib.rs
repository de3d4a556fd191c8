pub mod chunk;
pub mod chunker;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod parser;
pub mod paths;

pub use chunk::{ChunkRow, FileStatus, FileStatusRecord};
pub use chunker::{ChunkerConfig, TextChunk, chunk_text};
pub use config::{Config, ConfigStore, CpuThrottle, SettingsUpdate};
pub use error::{Error, Result};
pub use fingerprint::{chunk_id, fingerprint};
pub use parser::{MarkdownParser, ParseError, ParseOutput, Page, Parser, ParserRegistry, TextParser};
