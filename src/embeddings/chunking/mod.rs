
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::database::lancedb::{ChunkMetadata, ContentType, DocumentChunk};
use crate::pdf::PageText;

/// Separators tried in order, from paragraph breaks down to a hard character cut
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters; no chunk is longer than this
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks of the same page
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// Split every page into text chunks tagged with their source page
#[inline]
pub fn split_pages(
    pages: &[PageText],
    source_path: &str,
    config: &ChunkingConfig,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for text in split_text(&page.text, config) {
            chunks.push(DocumentChunk {
                text,
                metadata: ChunkMetadata {
                    source_path: source_path.to_string(),
                    page_number: page.page_number,
                    content_type: ContentType::Text,
                },
            });
        }
    }

    debug!(
        "Chunked {} pages from '{}' into {} chunks (avg {} chars)",
        pages.len(),
        source_path,
        chunks.len(),
        chunks.iter().map(|c| char_len(&c.text)).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split raw text recursively on the default separators
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    split_recursive(text, &DEFAULT_SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut final_chunks = Vec::new();

    // Pick the first separator present in the text; "" always matches
    let (separator, remaining) = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .map_or(("", &[][..]), |i| (separators[i], &separators[i + 1..]));

    let mut good_splits = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(&piece) < config.chunk_size {
            good_splits.push(piece);
            continue;
        }

        if !good_splits.is_empty() {
            final_chunks.extend(merge_splits(&good_splits, config));
            good_splits.clear();
        }

        if remaining.is_empty() {
            final_chunks.push(piece.trim().to_string());
        } else {
            final_chunks.extend(split_recursive(&piece, remaining, config));
        }
    }

    if !good_splits.is_empty() {
        final_chunks.extend(merge_splits(&good_splits, config));
    }

    final_chunks.retain(|chunk| !chunk.is_empty());
    final_chunks
}

/// Split on `separator`, re-attaching it to the start of each following piece
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut pieces = Vec::new();

    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    pieces.extend(parts.map(|part| format!("{}{}", separator, part)));

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// Greedily merge small pieces into chunks, carrying a tail of up to
/// `chunk_overlap` characters into the next chunk
fn merge_splits(splits: &[String], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for split in splits {
        let len = char_len(split);

        if total + len > config.chunk_size && !window.is_empty() {
            push_joined(&mut chunks, &window);

            while total > config.chunk_overlap
                || (total + len > config.chunk_size && total > 0)
            {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total -= char_len(front);
            }
        }

        window.push_back(split);
        total += len;
    }

    push_joined(&mut chunks, &window);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Length in characters, the unit every size in this module is measured in
#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
