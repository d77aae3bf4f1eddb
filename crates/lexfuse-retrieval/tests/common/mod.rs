//! Shared helpers for the retrieval integration tests.
//!
//! Import via `mod common;`.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use lexfuse_core::{DocId, LexfuseError, LexfuseResult, ScoredDoc};
use lexfuse_retrieval::VectorSearch;

/// Brute-force cosine ranking over a handful of stored vectors.
#[derive(Default)]
pub struct CosineVectors {
    vectors: RwLock<HashMap<DocId, Vec<f32>>>,
}

impl CosineVectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: impl Into<DocId>, embedding: Vec<f32>) -> LexfuseResult<()> {
        if embedding.is_empty() {
            return Err(LexfuseError::validation("empty embedding"));
        }
        self.vectors.write().await.insert(id.into(), embedding);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.vectors.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }
}

#[async_trait]
impl VectorSearch for CosineVectors {
    async fn search(&self, query_embedding: &[f32], k: usize) -> LexfuseResult<Vec<ScoredDoc>> {
        if query_embedding.is_empty() {
            return Err(LexfuseError::validation("empty query embedding"));
        }
        let vectors = self.vectors.read().await;
        let mut scored: Vec<ScoredDoc> = vectors
            .iter()
            .map(|(id, v)| ScoredDoc::new(id.clone(), cosine_similarity(query_embedding, v)))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Cosine similarity; 0 for mismatched dimensions or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
