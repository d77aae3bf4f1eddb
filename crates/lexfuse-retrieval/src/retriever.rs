use std::sync::Arc;
use std::time::Duration;

use lexfuse_cache::{MultiTierCache, QueryParams};
use lexfuse_core::{
    Clock, FusionConfig, LexfuseConfig, LexfuseError, LexfuseResult, ScoredDoc, SessionId,
};
use lexfuse_index::{tokenize, CheckpointStore, LexicalIndex, RestoreReport};
use lexfuse_session::SessionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fusion;
use crate::vector::VectorSearch;

/// One retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// Query text for the lexical side.
    pub text: String,
    /// Query embedding for the vector side, produced upstream.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Number of results wanted.
    pub k: usize,
    /// Vector weight in `[0, 1]`; the configured default when absent.
    #[serde(default)]
    pub alpha: Option<f32>,
}

impl RetrievalQuery {
    /// A text-only query.
    pub fn text(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: text.into(),
            embedding: None,
            k,
            alpha: None,
        }
    }

    /// Attach a query embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Override the fusion weight.
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

/// Where a response's ranking came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Served from the session's result cache.
    Cache,
    /// Both rankings contributed.
    Hybrid,
    /// Only the lexical ranking had results.
    LexicalOnly,
    /// Only the vector ranking had results.
    VectorOnly,
    /// Neither side had results.
    Empty,
}

/// Result of [`HybridRetriever::retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResponse {
    /// Session the result belongs to; clients send it back on the next call.
    pub session_id: SessionId,
    /// Fused ranking, best first.
    pub hits: Vec<ScoredDoc>,
    /// Where the ranking came from.
    pub source: ResultSource,
    /// The vector side failed or timed out and was left out.
    pub degraded: bool,
}

/// Hybrid retriever: session-scoped cache in front of BM25 and vector search,
/// fused by weighted min-max scores.
pub struct HybridRetriever {
    index: Arc<LexicalIndex>,
    vector: Option<Arc<dyn VectorSearch>>,
    cache: Arc<MultiTierCache>,
    sessions: Arc<SessionManager>,
    config: FusionConfig,
}

impl HybridRetriever {
    /// Wire a retriever from existing components. The cache is subscribed to
    /// session removals.
    pub fn new(
        index: Arc<LexicalIndex>,
        vector: Option<Arc<dyn VectorSearch>>,
        cache: Arc<MultiTierCache>,
        sessions: Arc<SessionManager>,
        config: FusionConfig,
    ) -> Self {
        sessions.subscribe(cache.clone());
        Self {
            index,
            vector,
            cache,
            sessions,
            config,
        }
    }

    /// Build every component from config. When a checkpoint directory is
    /// configured the index is restored from it, and the restore report is
    /// returned alongside.
    pub fn from_config(
        config: &LexfuseConfig,
        vector: Option<Arc<dyn VectorSearch>>,
        clock: Arc<dyn Clock>,
    ) -> LexfuseResult<(Self, Option<RestoreReport>)> {
        config.validate()?;
        let (index, report) = match CheckpointStore::from_config(&config.checkpoint)? {
            Some(store) => {
                let (index, report) = LexicalIndex::open(&config.index, store);
                (index, Some(report))
            }
            None => (LexicalIndex::new(&config.index), None),
        };
        let cache = Arc::new(MultiTierCache::new(&config.cache, Arc::clone(&clock)));
        let sessions = Arc::new(SessionManager::new(&config.session, clock));
        let retriever = Self::new(
            Arc::new(index),
            vector,
            cache,
            sessions,
            config.fusion.clone(),
        );
        Ok((retriever, report))
    }

    /// The lexical index.
    pub fn index(&self) -> &Arc<LexicalIndex> {
        &self.index
    }

    /// The cache.
    pub fn cache(&self) -> &Arc<MultiTierCache> {
        &self.cache
    }

    /// The session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// End a session and drop its cached results.
    pub fn end_session(&self, session: &SessionId) -> bool {
        self.sessions.clear(session)
    }

    /// Expire idle sessions and purge expired cache entries. Meant to be
    /// called periodically by the host.
    pub fn sweep(&self) -> (usize, usize) {
        let sessions = self.sessions.cleanup_expired(self.sessions.timeout()).len();
        let entries = self.cache.purge_expired();
        (sessions, entries)
    }

    /// Rank documents for `query` within the caller's session.
    ///
    /// `session_id` is whatever the client presented; an unknown or expired id
    /// yields a new session, returned in the response.
    ///
    /// Complete results are cached for the session before returning. A
    /// vector-side timeout or failure does not fail the request: the lexical
    /// ranking is returned and flagged as degraded, but it is not cached. A
    /// cached degraded answer would keep being served after the vector side
    /// recovers, for as long as the entry lives, so the next identical query
    /// asks the vector side again instead.
    pub async fn retrieve(
        &self,
        session_id: Option<&str>,
        query: &RetrievalQuery,
    ) -> LexfuseResult<RetrievalResponse> {
        let alpha = self.validate(query)?;
        let session = self.sessions.get_or_create(session_id);

        // The version number can repeat after a restore; the generation cannot.
        let generation = self.index.generation();
        self.cache.observe_index_version(generation);

        let candidates = query.k.saturating_mul(self.config.candidate_multiplier);
        let params = QueryParams {
            k: query.k,
            alpha,
            index_version: generation,
            candidates,
        };
        let embedding = query.embedding.as_deref();

        if let Some(hits) = self
            .cache
            .get_results(&session.id, &query.text, embedding, &params)
            .hit()
        {
            // A removal can land between reading the generation and here.
            if hits.iter().all(|h| self.index.contains_live(&h.id)) {
                debug!(session = %session.id, hits = hits.len(), "result cache hit");
                return Ok(RetrievalResponse {
                    session_id: session.id,
                    hits,
                    source: ResultSource::Cache,
                    degraded: false,
                });
            }
        }

        let lexical = self.lexical_candidates(&session.id, &query.text, candidates, generation);
        let (vector, degraded) = match embedding {
            Some(embedding) => self.vector_candidates(embedding, candidates).await,
            None => (Vec::new(), false),
        };

        let source = match (vector.is_empty(), lexical.is_empty()) {
            (false, false) => ResultSource::Hybrid,
            (true, false) => ResultSource::LexicalOnly,
            (false, true) => ResultSource::VectorOnly,
            (true, true) => ResultSource::Empty,
        };
        let hits = fusion::fuse(&vector, &lexical, alpha, query.k);

        if degraded {
            debug!(session = %session.id, "degraded result not cached");
        } else {
            self.cache
                .put_results(&session.id, &query.text, embedding, &params, hits.clone());
        }

        Ok(RetrievalResponse {
            session_id: session.id,
            hits,
            source,
            degraded,
        })
    }

    fn validate(&self, query: &RetrievalQuery) -> LexfuseResult<f32> {
        if query.k == 0 {
            return Err(LexfuseError::validation("k must be at least 1"));
        }
        let has_embedding = query.embedding.as_ref().is_some_and(|e| !e.is_empty());
        if query.text.trim().is_empty() && !has_embedding {
            return Err(LexfuseError::validation(
                "query needs text or an embedding",
            ));
        }
        if query.embedding.as_ref().is_some_and(|e| e.is_empty()) {
            return Err(LexfuseError::validation("query embedding is empty"));
        }
        let alpha = query.alpha.unwrap_or(self.config.alpha);
        if !(0.0..=1.0).contains(&alpha) {
            return Err(LexfuseError::validation(format!(
                "alpha must be within [0, 1], got {alpha}"
            )));
        }
        Ok(alpha)
    }

    fn lexical_candidates(
        &self,
        session: &SessionId,
        text: &str,
        depth: usize,
        generation: u64,
    ) -> Vec<ScoredDoc> {
        let normalized = tokenize(text).join(" ");
        if normalized.is_empty() {
            return Vec::new();
        }
        let hits = match self
            .cache
            .get_lexical(session, &normalized, depth, generation)
            .hit()
        {
            Some(hits) => hits,
            None => {
                let hits = self.index.search(text, depth);
                self.cache
                    .put_lexical(session, &normalized, depth, generation, hits.clone());
                hits
            }
        };
        hits.into_iter()
            .filter(|h| self.index.contains_live(&h.id))
            .collect()
    }

    /// Vector hits, and whether the vector side was lost.
    async fn vector_candidates(&self, embedding: &[f32], depth: usize) -> (Vec<ScoredDoc>, bool) {
        let Some(vector) = self.vector.as_ref() else {
            return (Vec::new(), false);
        };
        let timeout = self.config.vector_timeout();
        let hits = match tokio::time::timeout(timeout, vector.search(embedding, depth)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(error = %e, "vector search failed; using lexical ranking only");
                return (Vec::new(), true);
            }
            Err(_) => {
                let err = LexfuseError::DependencyTimeout {
                    dependency: "vector-search".into(),
                    timeout_ms: duration_ms(timeout),
                };
                warn!(error = %err, "using lexical ranking only");
                return (Vec::new(), true);
            }
        };

        if !self.config.filter_unknown_vector_ids {
            return (hits, false);
        }
        let before = hits.len();
        let hits: Vec<ScoredDoc> = hits
            .into_iter()
            .filter(|h| self.index.contains_live(&h.id))
            .collect();
        if hits.len() < before {
            debug!(dropped = before - hits.len(), "dropped vector hits unknown to the index");
        }
        (hits, false)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lexfuse_core::SystemClock;

    fn retriever() -> HybridRetriever {
        let (r, report) =
            HybridRetriever::from_config(&LexfuseConfig::default(), None, Arc::new(SystemClock))
                .unwrap();
        assert!(report.is_none());
        r
    }

    #[tokio::test]
    async fn test_rejects_invalid_queries() {
        let r = retriever();
        for q in [
            RetrievalQuery::text("cat", 0),
            RetrievalQuery::text("   ", 5),
            RetrievalQuery::text("cat", 5).with_alpha(1.5),
            RetrievalQuery::text("cat", 5).with_alpha(f32::NAN),
            RetrievalQuery::text("cat", 5).with_embedding(vec![]),
        ] {
            assert!(matches!(
                r.retrieve(None, &q).await,
                Err(LexfuseError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_lexical_only_then_cache_hit() {
        let r = retriever();
        r.index()
            .add_documents(
                vec!["id1".into(), "id2".into()],
                vec!["the cat sat on the mat".into(), "dogs are loyal animals".into()],
                None,
            )
            .unwrap();

        let first = r.retrieve(None, &RetrievalQuery::text("cat", 5)).await.unwrap();
        assert_eq!(first.source, ResultSource::LexicalOnly);
        assert_eq!(first.hits.len(), 1);
        assert_eq!(first.hits[0].id, "id1");

        let session = first.session_id.to_string();
        let second = r
            .retrieve(Some(&session), &RetrievalQuery::text("cat", 5))
            .await
            .unwrap();
        assert_eq!(second.source, ResultSource::Cache);
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.hits, first.hits);
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_sessions_and_their_entries() {
        let clock = Arc::new(lexfuse_core::ManualClock::default());
        let (r, _) =
            HybridRetriever::from_config(&LexfuseConfig::default(), None, clock.clone()).unwrap();
        r.index()
            .add_documents(vec!["id1".into()], vec!["cat".into()], None)
            .unwrap();
        r.retrieve(None, &RetrievalQuery::text("cat", 5)).await.unwrap();
        assert_eq!(r.sweep(), (0, 0));

        clock.advance(Duration::from_secs(3600));
        let (sessions, _) = r.sweep();
        assert_eq!(sessions, 1);
        assert!(r.sessions().is_empty());
        assert_eq!(r.cache().stats().results.entries, 0);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let r = retriever();
        let resp = r.retrieve(None, &RetrievalQuery::text("zebra", 3)).await.unwrap();
        assert_eq!(resp.source, ResultSource::Empty);
        assert!(resp.hits.is_empty());
    }
}
