//! Similarity scoring for the three recall paths.
//!
//! Pure functions shared by every store implementation:
//! - Cosine similarity for vector recall
//! - Term-occurrence scoring for keyword recall
//! - Tag-overlap counting for tag recall

use cairn_core::memory::{Memory, ScoredMemory, normalize_tag};
use std::cmp::Ordering;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the vectors differ in length, are empty, or either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank memories by cosine similarity to a query embedding.
///
/// Memories without an embedding are skipped. Ties break on id so the
/// ordering is stable across runs.
pub fn rank_by_similarity<'a>(
    memories: impl IntoIterator<Item = &'a Memory>,
    query: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = memories
        .into_iter()
        .filter_map(|memory| {
            let embedding = memory.embedding.as_ref()?;
            let score = cosine_similarity(embedding, query);
            (score >= min_similarity).then(|| ScoredMemory {
                memory: memory.clone(),
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| by_score_then_id(a.score, &a.memory.id, b.score, &b.memory.id));
    scored.truncate(limit);
    scored
}

/// Lowercased query terms worth matching (three characters or more).
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= 3)
        .collect()
}

/// Keyword relevance of a memory. Title hits count double; the sum is
/// normalized by content length so short precise facts rank first.
pub fn keyword_score(memory: &Memory, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let title = memory.title.to_lowercase();
    let content = memory.content.to_lowercase();
    let hits: usize = terms
        .iter()
        .map(|t| content.matches(t.as_str()).count() + 2 * title.matches(t.as_str()).count())
        .sum();
    hits as f32 / (content.len() as f32 / 100.0).max(1.0)
}

/// Rank memories by keyword relevance, dropping non-matches.
pub fn rank_by_keyword<'a>(
    memories: impl IntoIterator<Item = &'a Memory>,
    query: &str,
    limit: usize,
) -> Vec<Memory> {
    let terms = query_terms(query);
    let mut scored: Vec<(f32, &Memory)> = memories
        .into_iter()
        .map(|m| (keyword_score(m, &terms), m))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| by_score_then_id(a.0, &a.1.id, b.0, &b.1.id));
    scored.into_iter().take(limit).map(|(_, m)| m.clone()).collect()
}

/// Rank memories by how many of `tags` they carry, dropping non-matches.
pub fn rank_by_tags<'a>(
    memories: impl IntoIterator<Item = &'a Memory>,
    tags: &[String],
    limit: usize,
) -> Vec<Memory> {
    let wanted: Vec<String> = tags.iter().map(|t| normalize_tag(t)).collect();
    let mut scored: Vec<(f32, &Memory)> = memories
        .into_iter()
        .map(|m| (wanted.iter().filter(|t| m.tags.contains(*t)).count() as f32, m))
        .filter(|(overlap, _)| *overlap > 0.0)
        .collect();

    scored.sort_by(|a, b| by_score_then_id(a.0, &a.1.id, b.0, &b.1.id));
    scored.into_iter().take(limit).map(|(_, m)| m.clone()).collect()
}

fn by_score_then_id(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_id.cmp(b_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(id: &str, content: &str, embedding: Option<Vec<f32>>) -> Memory {
        let m = Memory::new(id, content).with_id(id);
        match embedding {
            Some(e) => m.with_embedding(e),
            None => m,
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn similarity_ranking_respects_cutoff_and_order() {
        let memories = vec![
            memory("a", "x", Some(vec![0.0, 1.0, 0.0])), // 0.0
            memory("b", "x", Some(vec![1.0, 0.0, 0.0])), // 1.0
            memory("c", "x", Some(vec![0.5, 0.5, 0.0])), // ~0.707
            memory("d", "x", None),
        ];
        let results = rank_by_similarity(&memories, &[1.0, 0.0, 0.0], 10, 0.4);
        let ids: Vec<&str> = results.iter().map(|s| s.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn similarity_ranking_respects_limit() {
        let memories: Vec<_> = (0..10)
            .map(|i| memory(&format!("e{i}"), "x", Some(vec![1.0, i as f32 * 0.1])))
            .collect();
        assert_eq!(rank_by_similarity(&memories, &[1.0, 0.0], 3, 0.0).len(), 3);
    }

    #[test]
    fn keyword_ranking_matches_terms() {
        let memories = vec![
            memory("a", "Rust is great for systems programming", None),
            memory("b", "Python is great for scripting", None),
            memory("c", "The deployment pipeline runs nightly", None),
        ];
        let results = rank_by_keyword(&memories, "deployment", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c");
    }

    #[test]
    fn short_terms_are_ignored() {
        assert!(query_terms("a is to").is_empty());
        assert_eq!(query_terms("CI/CD deploy"), vec!["deploy".to_string()]);
    }

    #[test]
    fn tag_ranking_prefers_more_overlap() {
        let memories = vec![
            Memory::new("one", "x").with_id("one").with_tags(["deploy"]),
            Memory::new("two", "x").with_id("two").with_tags(["deploy", "ci"]),
            Memory::new("three", "x").with_id("three").with_tags(["cooking"]),
        ];
        let results = rank_by_tags(&memories, &["Deploy".into(), "ci".into()], 10);
        let ids: Vec<&str> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["two", "one"]);
    }
}
