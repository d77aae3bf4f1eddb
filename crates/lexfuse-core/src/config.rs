//! TOML configuration surface.
//!
//! Every field has a default so a partial file (or an empty one) is accepted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{LexfuseError, LexfuseResult};

/// Top-level configuration for the retrieval core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexfuseConfig {
    /// Lexical ranking parameters.
    #[serde(default)]
    pub index: IndexConfig,
    /// Checkpoint persistence.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Score fusion and the vector-search collaborator.
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Both cache tiers.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Session lifetime.
    #[serde(default)]
    pub session: SessionConfig,
}

impl LexfuseConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> LexfuseResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| LexfuseError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> LexfuseResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LexfuseError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Reject values that would make ranking, expiry or retention meaningless.
    pub fn validate(&self) -> LexfuseResult<()> {
        if !(self.index.k1.is_finite() && self.index.k1 >= 0.0) {
            return Err(LexfuseError::Config("index.k1 must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.index.b) {
            return Err(LexfuseError::Config("index.b must be within [0, 1]".into()));
        }
        if self.checkpoint.retain == 0 {
            return Err(LexfuseError::Config("checkpoint.retain must be >= 1".into()));
        }
        if self.checkpoint.max_file_bytes == 0 {
            return Err(LexfuseError::Config(
                "checkpoint.max_file_bytes must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fusion.alpha) {
            return Err(LexfuseError::Config("fusion.alpha must be within [0, 1]".into()));
        }
        if self.fusion.vector_timeout_ms == 0 {
            return Err(LexfuseError::Config(
                "fusion.vector_timeout_ms must be > 0".into(),
            ));
        }
        if self.fusion.candidate_multiplier == 0 {
            return Err(LexfuseError::Config(
                "fusion.candidate_multiplier must be >= 1".into(),
            ));
        }
        if self.cache.session_capacity == 0 || self.cache.content_capacity == 0 {
            return Err(LexfuseError::Config("cache capacities must be >= 1".into()));
        }
        if self.cache.session_ttl_secs == 0 || self.cache.content_ttl_secs == 0 {
            return Err(LexfuseError::Config("cache TTLs must be > 0".into()));
        }
        if self.session.inactivity_timeout_secs == 0 {
            return Err(LexfuseError::Config(
                "session.inactivity_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// BM25 parameters and rebuild policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Length normalization strength.
    #[serde(default = "default_b")]
    pub b: f32,
    /// Rebuild the ranking structure from scratch after every add/remove.
    /// When off, the index stays stale until `rebuild()` is called.
    #[serde(default = "default_true")]
    pub rebuild_on_mutation: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            rebuild_on_mutation: true,
        }
    }
}

/// Where and how many checkpoints are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoint directory. No persistence when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Number of most recent snapshots to keep.
    #[serde(default = "default_retain")]
    pub retain: usize,
    /// Files larger than this are rejected before parsing.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retain: default_retain(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Score fusion and vector collaborator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Default vector weight; 0.0 = lexical only, 1.0 = vector only.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Deadline for the vector-search collaborator.
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
    /// Each side is asked for `k * candidate_multiplier` candidates.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Drop vector hits for ids that are not live in the lexical index.
    #[serde(default = "default_true")]
    pub filter_unknown_vector_ids: bool,
}

impl FusionConfig {
    /// Vector-search deadline as a [`Duration`].
    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            vector_timeout_ms: default_vector_timeout_ms(),
            candidate_multiplier: default_candidate_multiplier(),
            filter_unknown_vector_ids: true,
        }
    }
}

/// Whether content-keyed (tier 2) entries are shared across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentScope {
    /// One namespace for all sessions; entries hold only content-derived data.
    #[default]
    Shared,
    /// Keys carry the session id and are dropped with the session.
    PerSession,
}

/// Sizes and lifetimes of both cache tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tier 1 (session-scoped results) TTL.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Tier 1 capacity (entries).
    #[serde(default = "default_session_capacity")]
    pub session_capacity: usize,
    /// Tier 2 (content-keyed) TTL.
    #[serde(default = "default_content_ttl_secs")]
    pub content_ttl_secs: u64,
    /// Tier 2 capacity (entries).
    #[serde(default = "default_content_capacity")]
    pub content_capacity: usize,
    /// Tier 2 sharing policy.
    #[serde(default)]
    pub content_scope: ContentScope,
}

impl CacheConfig {
    /// Tier 1 TTL as a [`Duration`].
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Tier 2 TTL as a [`Duration`].
    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            session_capacity: default_session_capacity(),
            content_ttl_secs: default_content_ttl_secs(),
            content_capacity: default_content_capacity(),
            content_scope: ContentScope::default(),
        }
    }
}

/// Session lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity after which a session is expired.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

impl SessionConfig {
    /// Inactivity timeout as a [`Duration`].
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

fn default_true() -> bool {
    true
}

fn default_retain() -> usize {
    3
}

fn default_max_file_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_alpha() -> f32 {
    0.5
}

fn default_vector_timeout_ms() -> u64 {
    2_000
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_session_ttl_secs() -> u64 {
    300
}

fn default_session_capacity() -> usize {
    1024
}

fn default_content_ttl_secs() -> u64 {
    3600
}

fn default_content_capacity() -> usize {
    4096
}

fn default_inactivity_timeout_secs() -> u64 {
    1800
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = LexfuseConfig::from_toml_str("").unwrap();
        assert_eq!(config, LexfuseConfig::default());
        assert!((config.index.k1 - 1.2).abs() < f32::EPSILON);
        assert_eq!(config.checkpoint.retain, 3);
        assert_eq!(config.cache.content_scope, ContentScope::Shared);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = LexfuseConfig::from_toml_str(
            r#"
            [index]
            k1 = 1.5

            [checkpoint]
            dir = "/var/lib/lexfuse"
            retain = 5

            [cache]
            content_scope = "per_session"
            "#,
        )
        .unwrap();
        assert!((config.index.k1 - 1.5).abs() < f32::EPSILON);
        assert!((config.index.b - 0.75).abs() < f32::EPSILON);
        assert_eq!(
            config.checkpoint.dir.as_deref(),
            Some(Path::new("/var/lib/lexfuse"))
        );
        assert_eq!(config.checkpoint.retain, 5);
        assert_eq!(config.cache.content_scope, ContentScope::PerSession);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(LexfuseConfig::from_toml_str("[fusion]\nalpha = 1.5").is_err());
        assert!(LexfuseConfig::from_toml_str("[index]\nb = -0.1").is_err());
        assert!(LexfuseConfig::from_toml_str("[checkpoint]\nretain = 0").is_err());
        assert!(LexfuseConfig::from_toml_str("[cache]\nsession_capacity = 0").is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("lexfuse.toml");
        std::fs::write(&path, "[session]\ninactivity_timeout_secs = 60\n").unwrap();
        let config = LexfuseConfig::load(&path).unwrap();
        assert_eq!(
            config.session.inactivity_timeout(),
            Duration::from_secs(60)
        );

        let missing = LexfuseConfig::load(tmp.path().join("nope.toml"));
        assert!(matches!(missing, Err(LexfuseError::Config(_))));
    }
}
