//! Source aggregation: dedup, rank, cap.
//!
//! Candidates are sorted by similarity (descending), deduplicated to at
//! most one chunk per document (highest similarity wins), capped, and
//! given an aggregate confidence equal to the mean similarity of the
//! kept chunks. Pure function, no side effects.

use std::collections::HashSet;

use crate::models::{RetrievedChunk, SourceSet};

/// Build the final [`SourceSet`] from gate-cleared candidates.
///
/// Ties on similarity break by `document_id` (ascending) so the output
/// is deterministic regardless of input order.
pub fn aggregate(candidates: Vec<RetrievedChunk>, max_sources: usize) -> SourceSet {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });

    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<RetrievedChunk> = Vec::new();
    for chunk in sorted {
        if kept.len() >= max_sources {
            break;
        }
        if seen.insert(chunk.document_id.clone()) {
            kept.push(chunk);
        }
    }

    let confidence = if kept.is_empty() {
        0.0
    } else {
        kept.iter().map(|c| c.similarity).sum::<f64>() / kept.len() as f64
    };

    SourceSet {
        chunks: kept,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkLocation;

    fn chunk(chunk_id: &str, doc_id: &str, similarity: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            document_name: format!("{}.pdf", doc_id),
            content: String::new(),
            similarity,
            location: ChunkLocation::None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_empty_input() {
        let set = aggregate(vec![], 5);
        assert!(set.is_empty());
        assert_eq!(set.confidence, 0.0);
    }

    #[test]
    fn test_dedup_keeps_highest_similarity() {
        let set = aggregate(
            vec![
                chunk("c1", "d1", 0.6),
                chunk("c2", "d1", 0.9),
                chunk("c3", "d2", 0.7),
            ],
            5,
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.chunks[0].chunk_id, "c2");
        assert_eq!(set.chunks[1].chunk_id, "c3");
    }

    #[test]
    fn test_sorted_descending() {
        let set = aggregate(
            vec![
                chunk("c1", "d1", 0.5),
                chunk("c2", "d2", 0.9),
                chunk("c3", "d3", 0.7),
            ],
            5,
        );
        let sims: Vec<f64> = set.chunks.iter().map(|c| c.similarity).collect();
        assert_eq!(sims, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn test_cap_applies_after_dedup() {
        let set = aggregate(
            vec![
                chunk("c1", "d1", 0.9),
                chunk("c2", "d2", 0.8),
                chunk("c3", "d3", 0.7),
                chunk("c4", "d4", 0.6),
            ],
            2,
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.chunks[0].document_id, "d1");
        assert_eq!(set.chunks[1].document_id, "d2");
    }

    #[test]
    fn test_confidence_is_mean_of_kept() {
        let set = aggregate(vec![chunk("c1", "d1", 0.8), chunk("c2", "d2", 0.6)], 5);
        assert!((set.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_ignores_dropped_duplicates() {
        // d1 contributes only its 0.9 chunk; the 0.1 duplicate must not
        // drag the mean down.
        let set = aggregate(vec![chunk("c1", "d1", 0.9), chunk("c2", "d1", 0.1)], 5);
        assert_eq!(set.len(), 1);
        assert!((set.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_tie_break() {
        let a = aggregate(vec![chunk("c1", "d2", 0.8), chunk("c2", "d1", 0.8)], 5);
        let b = aggregate(vec![chunk("c2", "d1", 0.8), chunk("c1", "d2", 0.8)], 5);
        let ids_a: Vec<&str> = a.chunks.iter().map(|c| c.document_id.as_str()).collect();
        let ids_b: Vec<&str> = b.chunks.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a, vec!["d1", "d2"]);
    }
}
