//! Cache key derivation.
//!
//! Keys can only be built through the constructors below. Session-scoped keys
//! always start with `s:{session_id}:`, so two sessions can never produce the
//! same key, whatever the query.

use lexfuse_core::SessionId;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

const SESSION_PREFIX: &str = "s:";
const CONTENT_PREFIX: &str = "c:";

/// Parameters that change the result of a query and so take part in its key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryParams {
    /// Number of results requested.
    pub k: usize,
    /// Fusion weight of the vector ranking.
    pub alpha: f32,
    /// Lexical index version the result was computed against.
    pub index_version: u64,
    /// Candidate depth requested from each side.
    pub candidates: usize,
}

impl QueryParams {
    fn digest_into(&self, hasher: &mut Sha256) {
        hasher.update((self.k as u64).to_le_bytes());
        hasher.update(self.alpha.to_bits().to_le_bytes());
        hasher.update(self.index_version.to_le_bytes());
        hasher.update((self.candidates as u64).to_le_bytes());
    }
}

/// An opaque cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a result owned by `session`.
    ///
    /// The digest covers the namespace, the exact query text and every
    /// parameter. An embedding, when present, is part of the query identity.
    pub fn session_scoped(
        session: &SessionId,
        namespace: &str,
        query: &str,
        embedding: Option<&[f32]>,
        params: &QueryParams,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0x1f]);
        hasher.update((query.len() as u64).to_le_bytes());
        hasher.update(query.as_bytes());
        match embedding {
            Some(values) => {
                hasher.update([1]);
                hasher.update((values.len() as u64).to_le_bytes());
                for v in values {
                    hasher.update(v.to_bits().to_le_bytes());
                }
            }
            None => hasher.update([0]),
        }
        params.digest_into(&mut hasher);
        Self(format!(
            "{SESSION_PREFIX}{session}:{namespace}:{}",
            hex::encode(hasher.finalize())
        ))
    }

    /// Key for a value derived purely from `content`, shared by all sessions.
    pub fn content(namespace: &str, content: &[u8]) -> Self {
        Self(format!(
            "{CONTENT_PREFIX}{namespace}:{}",
            content_digest(namespace, content)
        ))
    }

    /// Key for a content-derived value kept private to `session`.
    pub fn content_for_session(session: &SessionId, namespace: &str, content: &[u8]) -> Self {
        Self(format!(
            "{SESSION_PREFIX}{session}:{namespace}:{}",
            content_digest(namespace, content)
        ))
    }

    /// Owning session, for session-scoped keys.
    pub fn session(&self) -> Option<SessionId> {
        let rest = self.0.strip_prefix(SESSION_PREFIX)?;
        let (id, _) = rest.split_once(':')?;
        id.parse().ok()
    }

    /// Whether this key belongs to `session`.
    pub fn belongs_to(&self, session: &SessionId) -> bool {
        self.session().is_some_and(|s| s == *session)
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn content_digest(namespace: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0x1f]);
    hasher.update(content);
    hex::encode(hasher.finalize())
}
