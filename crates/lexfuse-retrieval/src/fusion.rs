//! Weighted score fusion of two independent rankings.
//!
//! Each list is min-max scaled to `[0, 1]` on its own, then combined as
//! `alpha * vector + (1 - alpha) * lexical`, a missing side counting as 0.

use lexfuse_core::{DocId, ScoredDoc};
use std::collections::{HashMap, HashSet};

/// Scale scores into `[0, 1]` within this list, keeping its order.
///
/// A single hit, or a list whose scores are all equal, scales to 1.0.
/// Non-finite scores are dropped.
pub fn min_max_normalize(hits: &[ScoredDoc]) -> Vec<ScoredDoc> {
    let finite: Vec<&ScoredDoc> = hits.iter().filter(|h| h.score.is_finite()).collect();
    let (min, max) = finite
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| {
            (lo.min(h.score), hi.max(h.score))
        });
    let range = max - min;
    finite
        .into_iter()
        .map(|h| {
            let score = if range > 0.0 {
                (h.score - min) / range
            } else {
                1.0
            };
            ScoredDoc::new(h.id.clone(), score)
        })
        .collect()
}

/// First occurrence of each id wins; later duplicates are dropped.
fn dedup(hits: &[ScoredDoc]) -> Vec<ScoredDoc> {
    let mut seen = HashSet::with_capacity(hits.len());
    hits.iter()
        .filter(|h| seen.insert(h.id.as_str()))
        .cloned()
        .collect()
}

fn rank(ranks: &HashMap<&str, usize>, id: &str) -> usize {
    ranks.get(id).copied().unwrap_or(usize::MAX)
}

/// Fuse a vector ranking and a lexical ranking into the top `k`.
///
/// Order is fused score descending, then vector rank, then lexical rank, then
/// id. When one side is empty the other side's scaled scores are used as is.
pub fn fuse(vector: &[ScoredDoc], lexical: &[ScoredDoc], alpha: f32, k: usize) -> Vec<ScoredDoc> {
    let vector = min_max_normalize(&dedup(vector));
    let lexical = min_max_normalize(&dedup(lexical));

    if vector.is_empty() || lexical.is_empty() {
        let mut single = if vector.is_empty() { lexical } else { vector };
        single.truncate(k);
        return single;
    }

    let vector_rank: HashMap<&str, usize> = vector
        .iter()
        .enumerate()
        .map(|(rank, h)| (h.id.as_str(), rank))
        .collect();
    let lexical_rank: HashMap<&str, usize> = lexical
        .iter()
        .enumerate()
        .map(|(rank, h)| (h.id.as_str(), rank))
        .collect();

    let mut fused: HashMap<&str, f32> = HashMap::new();
    for h in &vector {
        *fused.entry(h.id.as_str()).or_insert(0.0) += alpha * h.score;
    }
    for h in &lexical {
        *fused.entry(h.id.as_str()).or_insert(0.0) += (1.0 - alpha) * h.score;
    }

    let mut ranked: Vec<(&str, f32)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| rank(&vector_rank, a.0).cmp(&rank(&vector_rank, b.0)))
            .then_with(|| rank(&lexical_rank, a.0).cmp(&rank(&lexical_rank, b.0)))
            .then_with(|| a.0.cmp(b.0))
    });
    ranked.truncate(k);
    ranked
        .into_iter()
        .map(|(id, score)| ScoredDoc::new(DocId::from(id), score))
        .collect()
}
