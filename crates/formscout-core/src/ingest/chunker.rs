//! Content chunking for long crawled pages.
//!
//! Splitting is semantic (sentence/paragraph aware via `text-splitter`)
//! rather than a fixed byte window, so chunk boundaries fall on natural
//! breaks. Callers that already chunk upstream can skip this entirely --
//! the pipeline takes `ChunkInput`s either way.

use serde_json::{Map, Value};
use text_splitter::TextSplitter;

use formscout_types::record::ChunkInput;

/// Default maximum characters per chunk.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2000;

/// Split `content` into ingestion chunks with contiguous `chunk_index`es,
/// all sharing the given locator, metadata, and source.
///
/// Whitespace-only fragments are dropped, so every produced chunk
/// satisfies the non-empty-content requirement.
pub fn chunk_content(
    locator: &str,
    source_id: &str,
    content: &str,
    metadata: &Map<String, Value>,
    max_chars: usize,
) -> Vec<ChunkInput> {
    let splitter = TextSplitter::new(max_chars.max(1));
    splitter
        .chunks(content)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(index, chunk)| ChunkInput {
            locator: locator.to_string(),
            chunk_index: index as u32,
            content: chunk.to_string(),
            metadata: metadata.clone(),
            source_id: source_id.to_string(),
        })
        .collect()
}
