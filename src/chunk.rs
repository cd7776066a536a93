//! Recursive character text chunker.
//!
//! Splits page text into overlapping segments of at most
//! [`ChunkingConfig::chunk_size`] characters, preferring to break on
//! paragraph boundaries, then lines, then words, then single characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `"\n\n"`, `"\n"`, `" "`, `""` that occurs
//!    in the text and split on it. The separator stays attached to the start
//!    of the piece that follows it, so no text is lost.
//! 2. Pieces shorter than `chunk_size` are merged greedily into a window.
//!    When the next piece would overflow the window it is flushed as a
//!    segment, then pieces are dropped from the front until at most
//!    `chunk_overlap` characters remain. Those carry over into the next
//!    segment.
//! 3. Pieces that are too long on their own are split recursively with the
//!    remaining separators.
//! 4. Segments are trimmed and empty ones dropped.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text cannot be
//! cut inside a code point.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::chunk_text;
//! use docqa::config::ChunkingConfig;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", &ChunkingConfig::default());
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::Page;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunk every page independently and concatenate the results in page order.
pub fn chunk_pages(pages: &[Page], config: &ChunkingConfig) -> Vec<String> {
    pages
        .iter()
        .flat_map(|page| chunk_text(&page.text, config))
        .collect()
}

/// Split one page of text into segments.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let splitter = Splitter {
        size: config.chunk_size,
        overlap: config.chunk_overlap,
    };
    splitter.split(text, &SEPARATORS)
}

struct Splitter {
    size: usize,
    overlap: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = sep;
                if !sep.is_empty() {
                    remaining = &separators[i + 1..];
                }
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<(&str, usize)> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            let len = piece.chars().count();
            if len < self.size {
                pending.push((piece, len));
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily merge small pieces into windows of at most `size` characters.
    fn merge(&self, pieces: &[(&str, usize)]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &(piece, len) in pieces {
            if total + len > self.size && !window.is_empty() {
                push_joined(&mut out, &window);
                while total > self.overlap || (total + len > self.size && total > 0) {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        push_joined(&mut out, &window);
        out
    }
}

/// Split on `separator`, keeping it at the start of the following piece.
/// Empty pieces are dropped. An empty separator splits into characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    push_trimmed(out, &joined);
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
