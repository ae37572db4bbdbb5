//! Word-aligned knowledge chunker.
//!
//! Splits a knowledge source into [`TextChunk`]s of at most `max_chars`
//! characters. Splits happen between words, and each new chunk repeats the
//! last `overlap_words` words of the previous one so a sentence cut at a
//! boundary still appears whole in at least one chunk.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text, used to
//! skip re-embedding unchanged content when a corpus is re-indexed.
//!
//! # Algorithm
//!
//! 1. Collapse all whitespace to single spaces.
//! 2. Append words to the current chunk while it stays within `max_chars`.
//! 3. When the next word would overflow, flush the chunk and start the next
//!    one with the overlap words followed by that word.
//! 4. A single word longer than `max_chars` becomes its own chunk.
//!
//! # Example
//!
//! ```rust
//! use uxaudit_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Visibility of system status.", 1500, 20);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum characters per knowledge chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 1500;

/// Words carried over from the end of one chunk into the next.
pub const DEFAULT_OVERLAP_WORDS: usize = 20;

/// A chunk of source text before it is embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
}

/// Split text into overlapping, word-aligned chunks.
///
/// Returns an empty list for blank input. Indices are contiguous from 0.
pub fn chunk_text(text: &str, max_chars: usize, overlap_words: usize) -> Vec<TextChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in words {
        let word_len = word.chars().count();
        let added = if current.is_empty() {
            word_len
        } else {
            word_len + 1
        };

        if current_len + added > max_chars && !current.is_empty() {
            let index = chunks.len() as i64;
            chunks.push(make_chunk(index, &current.join(" ")));

            let keep = overlap_words.min(current.len());
            let mut next: Vec<&str> = current[current.len() - keep..].to_vec();
            next.push(word);
            // overlap never pushes a chunk past the limit on its own
            while next.len() > 1 && joined_len(&next) > max_chars {
                next.remove(0);
            }
            current_len = joined_len(&next);
            current = next;
        } else {
            current.push(word);
            current_len += added;
        }
    }

    if !current.is_empty() {
        let index = chunks.len() as i64;
        chunks.push(make_chunk(index, &current.join(" ")));
    }

    chunks
}

fn joined_len(words: &[&str]) -> usize {
    words.iter().map(|w| w.chars().count()).sum::<usize>() + words.len().saturating_sub(1)
}

/// SHA-256 hex digest of a string.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(index: i64, text: &str) -> TextChunk {
    TextChunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: content_hash(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello,   world!\n\nAgain", 1500, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world! Again");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_text("", 1500, 20).is_empty());
        assert!(chunk_text(" \n\t ", 1500, 20).is_empty());
    }

    #[test]
    fn test_chunks_respect_limit_and_overlap() {
        let text = (0..400)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 200, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.text.chars().count() <= 200, "chunk {} too long", i);
        }
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].text.split(' ').collect();
            let next: Vec<&str> = pair[1].text.split(' ').collect();
            assert_eq!(&prev[prev.len() - 5..], &next[..5]);
        }
        assert!(chunks.last().unwrap().text.ends_with("word399"));
    }

    #[test]
    fn test_oversized_word_is_its_own_chunk() {
        let long = "x".repeat(50);
        let chunks = chunk_text(&format!("a {} b", long), 10, 1);
        assert!(chunks.iter().any(|c| c.text == long));
        assert_eq!(chunks.last().unwrap().text, "b");
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = chunk_text("Alpha beta gamma", 1500, 20);
        let b = chunk_text("Alpha beta gamma", 1500, 20);
        assert_eq!(a[0].hash, b[0].hash);
        assert_ne!(a[0].id, b[0].id);
        assert_eq!(a[0].hash, content_hash("Alpha beta gamma"));
    }
}
