//! Core types and error definitions for the Lexfuse retrieval core.
//!
//! This crate provides the foundational types shared across all Lexfuse crates:
//! error handling, configuration, the clock used for expiry decisions, and the
//! identifiers that flow between the index, the session manager and the cache.
//!
//! # Main types
//!
//! - [`LexfuseError`] — Unified error enum for all Lexfuse components.
//! - [`LexfuseResult`] — Convenience alias for `Result<T, LexfuseError>`.
//! - [`LexfuseConfig`] — TOML-backed configuration surface.
//! - [`Clock`] — Time source for TTL and inactivity expiry.
//! - [`SessionId`] — Unguessable session identifier.
//! - [`ScoredDoc`] — One entry of a ranked list.

/// Time source abstraction.
pub mod clock;
/// Configuration surface.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Tracing subscriber setup.
pub mod telemetry;
/// Shared identifiers and value types.
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, CheckpointConfig, ContentScope, FusionConfig, IndexConfig, LexfuseConfig,
    SessionConfig,
};
pub use error::{LexfuseError, LexfuseResult};
pub use types::{DocId, Metadata, MetadataValue, ScoredDoc, SessionId};
