use lexfuse_core::{DocId, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One document of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique, stable id.
    pub id: DocId,
    /// Raw text that is tokenized for ranking.
    pub text: String,
    /// Scalar metadata carried through checkpoints untouched.
    #[serde(default)]
    pub metadata: Metadata,
    /// Logically deleted; excluded from search until purged by a rebuild.
    #[serde(default)]
    pub tombstoned: bool,
}

impl DocumentRecord {
    /// A live document.
    pub fn new(id: impl Into<DocId>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            tombstoned: false,
        }
    }
}

/// Column-oriented snapshot of the index, as persisted in checkpoints.
///
/// `documents[i]`, `ids[i]` and `metadatas[i]` describe the same record, in
/// insertion order. Tombstoned records stay in the columns and are listed in
/// `deleted_ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    /// Document texts.
    pub documents: Vec<String>,
    /// Document ids.
    pub ids: Vec<DocId>,
    /// Document metadata.
    pub metadatas: Vec<Metadata>,
    /// Ids of tombstoned records.
    pub deleted_ids: BTreeSet<DocId>,
    /// Index version the snapshot was taken at.
    pub version: u64,
    /// Seconds since the Unix epoch when the snapshot was taken.
    pub timestamp: f64,
}

impl IndexSnapshot {
    /// Records in insertion order, with tombstones applied.
    pub fn records(&self) -> Vec<DocumentRecord> {
        self.ids
            .iter()
            .zip(&self.documents)
            .zip(&self.metadatas)
            .map(|((id, text), metadata)| DocumentRecord {
                id: id.clone(),
                text: text.clone(),
                metadata: metadata.clone(),
                tombstoned: self.deleted_ids.contains(id),
            })
            .collect()
    }

    /// Number of records that are not tombstoned.
    pub fn live_count(&self) -> usize {
        self.ids
            .iter()
            .filter(|id| !self.deleted_ids.contains(*id))
            .count()
    }

    /// Whether two snapshots describe the same corpus: same ids, in the same
    /// order, with the same texts and tombstones.
    pub fn same_corpus(&self, other: &IndexSnapshot) -> bool {
        self.ids == other.ids
            && self.documents == other.documents
            && self.deleted_ids == other.deleted_ids
    }
}
