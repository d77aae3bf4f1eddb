use lexfuse_core::{CacheConfig, Clock, ContentScope, ScoredDoc, SessionId};
use lexfuse_session::SessionListener;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::key::{CacheKey, QueryParams};
use crate::tier::{CacheLookup, CacheStats, CacheTier};

const RESULTS_NAMESPACE: &str = "results";
const LEXICAL_NAMESPACE: &str = "lexical";

/// Counters for both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiTierStats {
    /// Tier 1: fused results, per session.
    pub results: CacheStats,
    /// Tier 2: lexical rankings, keyed by content.
    pub content: CacheStats,
}

/// Session-scoped result cache (tier 1) in front of a content-keyed cache of
/// lexical rankings (tier 2).
///
/// Every operation takes the caller's session; there is no way to read or
/// write tier 1 without one. Both tiers are emptied when the lexical index
/// version changes, and a session's entries go with the session.
pub struct MultiTierCache {
    results: CacheTier<Vec<ScoredDoc>>,
    content: CacheTier<Vec<ScoredDoc>>,
    content_scope: ContentScope,
    index_version: Mutex<Option<u64>>,
}

impl MultiTierCache {
    /// Build both tiers from config.
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            results: CacheTier::new(
                "results",
                config.session_capacity,
                config.session_ttl(),
                Arc::clone(&clock),
            ),
            content: CacheTier::new(
                "content",
                config.content_capacity,
                config.content_ttl(),
                clock,
            ),
            content_scope: config.content_scope,
            index_version: Mutex::new(None),
        }
    }

    /// Tier 2 sharing policy.
    pub fn content_scope(&self) -> ContentScope {
        self.content_scope
    }

    /// Cached fused result for `query` in `session`.
    pub fn get_results(
        &self,
        session: &SessionId,
        query: &str,
        embedding: Option<&[f32]>,
        params: &QueryParams,
    ) -> CacheLookup<Vec<ScoredDoc>> {
        let key = CacheKey::session_scoped(session, RESULTS_NAMESPACE, query, embedding, params);
        self.results.get(&key)
    }

    /// Store a fused result for `query` in `session`, replacing any previous one.
    pub fn put_results(
        &self,
        session: &SessionId,
        query: &str,
        embedding: Option<&[f32]>,
        params: &QueryParams,
        hits: Vec<ScoredDoc>,
    ) {
        let key = CacheKey::session_scoped(session, RESULTS_NAMESPACE, query, embedding, params);
        self.results.set(key, hits);
    }

    /// Cached lexical ranking for a normalized query at `depth` against
    /// `index_version`.
    pub fn get_lexical(
        &self,
        session: &SessionId,
        normalized_query: &str,
        depth: usize,
        index_version: u64,
    ) -> CacheLookup<Vec<ScoredDoc>> {
        self.content
            .get(&self.lexical_key(session, normalized_query, depth, index_version))
    }

    /// Store a lexical ranking.
    pub fn put_lexical(
        &self,
        session: &SessionId,
        normalized_query: &str,
        depth: usize,
        index_version: u64,
        hits: Vec<ScoredDoc>,
    ) {
        let key = self.lexical_key(session, normalized_query, depth, index_version);
        self.content.set(key, hits);
    }

    fn lexical_key(
        &self,
        session: &SessionId,
        normalized_query: &str,
        depth: usize,
        index_version: u64,
    ) -> CacheKey {
        let mut content = Vec::with_capacity(normalized_query.len() + 16);
        content.extend_from_slice(normalized_query.as_bytes());
        content.push(0x1f);
        content.extend_from_slice(&(depth as u64).to_le_bytes());
        content.extend_from_slice(&index_version.to_le_bytes());
        match self.content_scope {
            ContentScope::Shared => CacheKey::content(LEXICAL_NAMESPACE, &content),
            ContentScope::PerSession => {
                CacheKey::content_for_session(session, LEXICAL_NAMESPACE, &content)
            }
        }
    }

    /// Drop every entry owned by `session`. Returns how many were dropped.
    pub fn invalidate_session(&self, session: &SessionId) -> usize {
        let mut dropped = self.results.remove_where(|k| k.belongs_to(session));
        if self.content_scope == ContentScope::PerSession {
            dropped += self.content.remove_where(|k| k.belongs_to(session));
        }
        debug!(session = %session, dropped, "session cache invalidated");
        dropped
    }

    /// Record the index version results are being computed against. Callers
    /// pass a value that never repeats once left behind (the index generation),
    /// so returning to an older corpus also registers as a change. On a change,
    /// both tiers are emptied. Returns whether it changed.
    pub fn observe_index_version(&self, version: u64) -> bool {
        let mut current = self.index_version.lock();
        if *current == Some(version) {
            return false;
        }
        let previous = current.replace(version);
        let dropped = self.results.clear() + self.content.clear();
        if previous.is_some() {
            info!(
                from = ?previous,
                to = version,
                dropped,
                "index version changed; cache cleared"
            );
        }
        true
    }

    /// Drop expired entries from both tiers.
    pub fn purge_expired(&self) -> usize {
        self.results.purge_expired() + self.content.purge_expired()
    }

    /// Drop everything.
    pub fn clear(&self) -> usize {
        self.results.clear() + self.content.clear()
    }

    /// Counters for both tiers.
    pub fn stats(&self) -> MultiTierStats {
        MultiTierStats {
            results: self.results.stats(),
            content: self.content.stats(),
        }
    }
}

impl SessionListener for MultiTierCache {
    fn on_session_removed(&self, session: &SessionId) {
        self.invalidate_session(session);
    }
}
