//! Deterministic character-window text chunking

use crate::types::ChunkRecord;

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Characters shared by consecutive chunks
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker. `overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Chunk a source file's text into ordered records.
    pub fn chunk(&self, source_path: &str, text: &str) -> Vec<ChunkRecord> {
        let pieces = self.split(text);
        let total = pieces.len() as u32;

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord {
                source_path: source_path.to_string(),
                chunk_index: i as u32,
                text,
                total_chunks_for_source: total,
            })
            .collect()
    }

    /// Split text into trimmed, non-empty windows.
    ///
    /// A window that stops short of the end is pulled back to the last
    /// whitespace in its second half so words stay whole. The next window
    /// starts `overlap` characters before the previous end.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut pieces = Vec::new();
        let mut start = 0usize;

        while start < len {
            let mut end = (start + self.chunk_size).min(len);

            if end < len {
                let floor = start + self.chunk_size / 2;
                if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                    if ws > start {
                        end = ws;
                    }
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }

            if end >= len {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        pieces
    }
}
