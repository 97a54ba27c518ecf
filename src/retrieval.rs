//! Retrieval and the confidence gate.
//!
//! Embeds the query, issues the vector search with an intent-dependent
//! threshold and topK, and decides whether enough evidence exists to
//! answer. When nothing clears the gate the pipeline short-circuits with
//! a deterministic insufficient-evidence result instead of calling the
//! generator — weak matches must not turn into confident-sounding
//! answers.

use std::sync::Arc;
use tracing::{debug, info};

use crate::adapters::{Embedder, VectorIndex};
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::{IntentClassification, QueryScope, RetrievedChunk};

/// Message used for the insufficient-evidence short-circuit.
pub const INSUFFICIENT_EVIDENCE_MESSAGE: &str =
    "I couldn't find anything in your documents that answers this confidently. \
     Try rephrasing, or check that the relevant document has been uploaded.";

/// The threshold active for this query's intent.
///
/// List-style intents only need filenames, so they run at the relaxed
/// threshold; everything else uses the default.
pub fn active_threshold(config: &RetrievalConfig, classification: &IntentClassification) -> f64 {
    if classification.domain.is_list_style() {
        config.list_similarity_threshold
    } else {
        config.similarity_threshold
    }
}

/// The candidate count for this query's scope.
///
/// A single-document scope gets more headroom since the search space is
/// smaller.
pub fn active_top_k(config: &RetrievalConfig, scope: &QueryScope) -> usize {
    if scope.is_single_document() {
        config.top_k_scoped
    } else {
        config.top_k
    }
}

/// Embed the query and fetch gate-cleared candidates.
///
/// Returns the candidates with similarity at or above the active
/// threshold, ordered by descending similarity. An empty vector means
/// the gate rejected everything and the caller must short-circuit.
pub async fn retrieve(
    embedder: &Arc<dyn Embedder>,
    index: &Arc<dyn VectorIndex>,
    config: &RetrievalConfig,
    query_text: &str,
    scope: &QueryScope,
    classification: &IntentClassification,
) -> Result<Vec<RetrievedChunk>> {
    let threshold = active_threshold(config, classification);
    let top_k = active_top_k(config, scope);

    debug!(threshold, top_k, scope = ?scope, "retrieving candidates");

    let query_vec = embedder.embed(query_text).await?;
    let candidates = index
        .search_similar(&query_vec, scope, top_k, threshold)
        .await?;

    // The index contract already applies min_similarity, but the gate is
    // the pipeline's invariant — enforce it here as well.
    let cleared: Vec<RetrievedChunk> = candidates
        .into_iter()
        .filter(|c| c.similarity >= threshold)
        .collect();

    info!(
        candidates = cleared.len(),
        threshold,
        "confidence gate evaluated"
    );

    Ok(cleared)
}
