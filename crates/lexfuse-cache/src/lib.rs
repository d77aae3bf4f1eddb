//! Multi-tier cache for the Lexfuse retrieval core.
//!
//! Tier 1 holds fused query results and is strictly partitioned by session:
//! every key embeds its owning session id, so one session can never observe
//! another's results. Tier 2 holds lexical rankings keyed by a content hash and
//! is shared or per-session depending on configuration. Both tiers are bounded
//! (LRU), expire entries by TTL, and are emptied when the index version moves.
//!
//! # Main types
//!
//! - [`MultiTierCache`] — Both tiers behind a session-scoped API.
//! - [`CacheTier`] — One bounded TTL + LRU map.
//! - [`CacheKey`] — Opaque key; only built through its constructors.
//! - [`CacheLookup`] — Hit, or a typed miss.

/// Key derivation.
pub mod key;
/// The two-tier cache.
pub mod multi_tier;
/// A single bounded tier.
pub mod tier;

pub use key::{CacheKey, QueryParams};
pub use multi_tier::{MultiTierCache, MultiTierStats};
pub use tier::{CacheLookup, CacheStats, CacheTier, MissReason};
