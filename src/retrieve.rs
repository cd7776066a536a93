//! Context retrieval for a question.

use crate::embedding::{embed_query, Embedder};
use crate::error::Result;
use crate::index::VectorIndex;

/// Separator placed between retrieved segments in the context string.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Embed `query` and join the `k` nearest segments, most similar first.
///
/// No similarity threshold is applied. An index with fewer than `k` entries
/// contributes all of them; an empty index yields an empty string.
pub async fn retrieve(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<String> {
    if index.is_empty() {
        return Ok(String::new());
    }

    let query_vec = embed_query(embedder, query).await?;
    let hits = index.k_nearest(&query_vec, k);
    tracing::debug!(
        requested = k,
        returned = hits.len(),
        top_score = hits.first().map(|h| h.score),
        "retrieved context"
    );

    Ok(hits
        .iter()
        .map(|hit| hit.segment)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR))
}
