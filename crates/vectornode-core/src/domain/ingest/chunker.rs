//! Sentence-aligned, overlapping text chunker

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

/// A boundary must lie this many characters past the chunk start to be used
const MIN_SENTENCE_OFFSET: usize = 100;

/// Splits whitespace-normalized text into overlapping chunks.
///
/// Positions are counted in characters, not bytes. Output is deterministic
/// for a given `(text, chunk_size, overlap)`, which keeps redelivered
/// `KB_CREATED` events idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidInput(format!(
                "chunk overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = normalized.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let mut end = (start + self.chunk_size).min(len);

            if end < len {
                let floor = start + MIN_SENTENCE_OFFSET;
                if let Some(boundary) = (floor + 1..=end)
                    .rev()
                    .find(|&i| is_sentence_end(chars[i]))
                {
                    end = boundary + 1;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if end >= len {
                break;
            }

            let next = end.saturating_sub(self.overlap);
            start = if next <= start { end } else { next };
        }

        chunks
    }
}

/// Collapse whitespace runs to one space and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}
