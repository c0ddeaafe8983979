//! Query-path retrieval: embed the query, search the index, concatenate
//! the evidence.
//!
//! This is the only entry point the chat orchestration calls. It never
//! fails for "no results" — a blank query, an index that is not (yet)
//! ready, or an empty hit list all yield an empty string. Only an
//! embedding-service failure surfaces, as [`RetrievalUnavailable`], and
//! the caller must treat that as "no context available".

use crate::embedding::Embedder;
use crate::error::RetrievalUnavailable;
use crate::index::IndexService;

/// Delimiter between retrieved chunks in the evidence string.
pub const EVIDENCE_DELIMITER: &str = "\n\n---\n\n";

/// Retrieve the `k` most similar chunks for `query` and join their texts
/// in rank order.
pub async fn retrieve_and_augment(
    index: &IndexService,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<String, RetrievalUnavailable> {
    if query.trim().is_empty() {
        return Ok(String::new());
    }

    // Not ready or inactive: no context, no wasted embedding call.
    let snapshot = match index.snapshot() {
        Some(snapshot) => snapshot,
        None => return Ok(String::new()),
    };
    if snapshot.is_empty() {
        return Ok(String::new());
    }

    let query_vector = embedder.embed(query).await?;
    let hits = snapshot.search(&query_vector, k);
    if hits.is_empty() {
        return Ok(String::new());
    }

    Ok(hits
        .iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join(EVIDENCE_DELIMITER))
}
