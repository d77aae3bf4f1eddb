use async_trait::async_trait;
use lexfuse_core::{LexfuseResult, ScoredDoc};

/// External vector-similarity ranking consumed by the retriever.
///
/// Implementations return at most `k` hits, best first. The retriever bounds
/// every call with a timeout, so implementations need not enforce their own.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Rank stored vectors by similarity to `query_embedding`.
    async fn search(&self, query_embedding: &[f32], k: usize) -> LexfuseResult<Vec<ScoredDoc>>;
}
