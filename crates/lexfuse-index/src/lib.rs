//! Incremental lexical index and checkpoint serializer.
//!
//! Maintains a mutable corpus of short documents ranked with BM25, with
//! tombstone-based removal, from-scratch rebuilds, and durable checkpoints in
//! a strictly validated JSON schema.
//!
//! # Main types
//!
//! - [`LexicalIndex`] — The corpus, its ranking structure and its lifecycle.
//! - [`Bm25Index`] — Immutable BM25 inverted index over a set of slots.
//! - [`CheckpointStore`] — Versioned checkpoint directory with retention.
//! - [`IndexSnapshot`] — Column-oriented snapshot persisted in checkpoints.
//! - [`LegacySnapshot`] — Pre-schema binary dump, readable only for migration.

/// BM25 inverted index for keyword-based retrieval.
pub mod bm25;
/// Checkpoint serializer and on-disk store.
pub mod checkpoint;
/// Document records and snapshots.
pub mod document;
/// The mutable lexical index.
pub mod index;
/// Migration of legacy binary dumps.
pub mod legacy;
/// Text tokenization shared by indexing and querying.
pub mod tokenizer;

pub use bm25::{Bm25Index, Bm25Params};
pub use checkpoint::{CheckpointStore, CHECKPOINT_FORMAT, SCHEMA_VERSION};
pub use document::{DocumentRecord, IndexSnapshot};
pub use index::{
    CheckpointReport, IndexState, IndexStats, LexicalIndex, RestoreReport, RestoreStatus,
};
pub use legacy::{LegacySnapshot, LegacyValue, MigrationReport};
pub use tokenizer::tokenize;
