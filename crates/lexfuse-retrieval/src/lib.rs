//! Hybrid retrieval over a lexical index and an external vector ranking.
//!
//! A query runs inside a session: the session's result cache is consulted
//! first, then BM25 and vector candidates are gathered, scaled to `[0, 1]`
//! and fused as `alpha * vector + (1 - alpha) * lexical`. A slow or failing
//! vector side degrades the request to lexical-only instead of failing it.
//!
//! # Main types
//!
//! - [`HybridRetriever`] — Orchestrates sessions, cache, index and vectors.
//! - [`VectorSearch`] — Seam for the external vector-similarity ranking.

/// Weighted min-max score fusion.
pub mod fusion;
/// The hybrid retriever.
pub mod retriever;
/// Vector-similarity collaborator.
pub mod vector;

pub use fusion::{fuse, min_max_normalize};
pub use retriever::{HybridRetriever, ResultSource, RetrievalQuery, RetrievalResponse};
pub use vector::VectorSearch;
