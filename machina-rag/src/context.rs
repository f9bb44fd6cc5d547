//! Prompt context assembly from search results.

use crate::document::SearchResult;

/// Default number of results joined into the prompt context.
pub const DEFAULT_CONTEXT_CHUNKS: usize = 3;

/// Join the text of the first `max_chunks` results, in rank order, with single spaces.
///
/// Returns an empty string when there are no results.
pub fn assemble_context(results: &[SearchResult], max_chunks: usize) -> String {
    results.iter().take(max_chunks).map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join(" ")
}
