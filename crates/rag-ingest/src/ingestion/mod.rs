//! Discovery, text extraction, chunking and embedding

mod chunker;
mod embed;
mod parser;
mod scanner;

pub use chunker::TextChunker;
pub use embed::{ChunkEmbedder, EmbedOutcome};
pub use parser::{declared_type, FileParser, TextExtractor};
pub use scanner::{DirectoryScanner, ScanReport};
