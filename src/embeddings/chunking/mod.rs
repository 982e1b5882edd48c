
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::store::{ChunkMetadata, ChunkRecord, SourceMetadata};

/// Separators tried in order. The empty separator splits into single characters.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Configuration for content chunking. All sizes are in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
    /// Chunks shorter than this after trimming are discarded
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
        }
    }
}

/// Split a document into chunk records carrying `source` provenance.
///
/// Windows shorter than `min_chunk_size` are dropped before numbering, so `chunk_id`
/// and `total_chunks` only ever count surviving chunks.
#[inline]
pub fn chunk_document(
    text: &str,
    source: &SourceMetadata,
    config: &ChunkingConfig,
) -> Vec<ChunkRecord> {
    let windows: Vec<String> = split_text(text, config)
        .into_iter()
        .filter(|window| {
            let length = char_len(window);
            length > 0 && length >= config.min_chunk_size
        })
        .collect();

    let total_chunks = windows.len();
    debug!(
        "Chunked '{}' into {} chunks",
        source.filename, total_chunks
    );

    windows
        .into_iter()
        .enumerate()
        .map(|(chunk_id, content)| {
            let metadata = ChunkMetadata::text(source.clone(), chunk_id, total_chunks, &content);
            ChunkRecord::new(content, metadata)
        })
        .collect()
}

/// Recursively split `text` into trimmed windows of at most `chunk_size` characters.
///
/// Each level splits on the first separator present in the text, keeping the separator
/// attached to the end of the preceding piece so no characters are lost. Pieces that are
/// still too long are split again with the remaining separators, and short pieces are
/// merged back together with `chunk_overlap` characters of carry-over.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    split_recursive(text, &SEPARATORS, config, &mut chunks);
    chunks
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    config: &ChunkingConfig,
    output: &mut Vec<String>,
) {
    let (separator, remaining) = pick_separator(text, separators);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.split_inclusive(|_: char| true).collect()
    } else {
        text.split_inclusive(separator).collect()
    };

    let mut mergeable: Vec<(&str, usize)> = Vec::new();
    for piece in pieces {
        let length = char_len(piece);
        if length < config.chunk_size {
            mergeable.push((piece, length));
            continue;
        }

        if !mergeable.is_empty() {
            merge_pieces(&mergeable, config, output);
            mergeable.clear();
        }

        if remaining.is_empty() {
            push_trimmed(piece, output);
        } else {
            split_recursive(piece, remaining, config, output);
        }
    }

    if !mergeable.is_empty() {
        merge_pieces(&mergeable, config, output);
    }
}

fn pick_separator<'a, 's>(text: &str, separators: &'a [&'s str]) -> (&'s str, &'a [&'s str]) {
    for (i, &separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Greedily pack pieces into windows, keeping at most `chunk_overlap` characters of
/// the previous window at the start of the next one.
fn merge_pieces(pieces: &[(&str, usize)], config: &ChunkingConfig, output: &mut Vec<String>) {
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0;

    for &(piece, length) in pieces {
        if total + length > config.chunk_size && !window.is_empty() {
            push_window(&window, output);

            while total > config.chunk_overlap
                || (total + length > config.chunk_size && total > 0)
            {
                let Some((_, dropped)) = window.pop_front() else {
                    break;
                };
                total -= dropped;
            }
        }

        window.push_back((piece, length));
        total += length;
    }

    push_window(&window, output);
}

fn push_window(window: &VecDeque<(&str, usize)>, output: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    push_trimmed(&joined, output);
}

fn push_trimmed(text: &str, output: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        output.push(trimmed.to_string());
    }
}

#[inline]
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}
