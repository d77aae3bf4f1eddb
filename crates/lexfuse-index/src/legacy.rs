//! One-way migration away from pre-schema binary dumps.
//!
//! Old deployments persisted the index as an opaque binary dump of the whole
//! in-memory object with no format tag, version or validation. Those files are
//! decoded here with a typed, size-bounded decoder into plain data, checked
//! against the same structural rules as current checkpoints, rewritten in the
//! current schema, re-read, and only then removed.

use bincode::Options;
use lexfuse_core::{LexfuseError, LexfuseResult, Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::checkpoint::{self, CheckpointStore};
use crate::document::IndexSnapshot;

/// File extension legacy dumps were written with.
pub const LEGACY_EXTENSION: &str = "bin";

/// Layout of a legacy dump. Kept only so old files can be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacySnapshot {
    /// Document texts.
    pub documents: Vec<String>,
    /// Document ids.
    pub ids: Vec<String>,
    /// Per-document metadata.
    pub metadatas: Vec<HashMap<String, LegacyValue>>,
    /// Tombstoned ids.
    pub deleted_ids: Vec<String>,
    /// Index version at dump time.
    pub version: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// Metadata value as the legacy dump encoded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LegacyValue {
    /// Absent value; dropped on migration.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Text.
    Text(String),
}

impl LegacyValue {
    fn into_current(self) -> Option<MetadataValue> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(MetadataValue::Bool(v)),
            Self::Int(v) => Some(MetadataValue::Int(v)),
            Self::Float(v) => Some(MetadataValue::Float(v)),
            Self::Text(v) => Some(MetadataValue::Text(v)),
        }
    }
}

/// Outcome of migrating one legacy dump.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    /// The (now deleted) legacy file.
    pub legacy_path: PathBuf,
    /// The current-format checkpoint that replaced it.
    pub checkpoint_path: PathBuf,
    /// Number of records carried over.
    pub documents: usize,
    /// Snapshot version.
    pub version: u64,
}

/// Whether the content is not a JSON checkpoint (first significant byte is not `{`).
pub fn looks_legacy(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b != b'{')
}

/// Whether the path carries the legacy extension.
pub fn has_legacy_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(LEGACY_EXTENSION))
}

/// Detect a legacy dump by extension, falling back to sniffing the first bytes.
pub fn is_legacy_file(path: &Path, max_bytes: u64) -> LexfuseResult<bool> {
    if has_legacy_extension(path) {
        return Ok(true);
    }
    let file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LexfuseError::NotFound(format!("checkpoint {}", path.display()))
        } else {
            LexfuseError::Io(e)
        }
    })?;
    let mut head = Vec::with_capacity(64);
    file.take(64.min(max_bytes)).read_to_end(&mut head)?;
    Ok(looks_legacy(&head))
}

/// Decode a legacy dump into a validated snapshot. Never writes anything.
pub fn decode_legacy(path: &Path, max_bytes: u64) -> LexfuseResult<IndexSnapshot> {
    let bytes = checkpoint::read_bounded(path, max_bytes)?;
    let legacy: LegacySnapshot = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(max_bytes)
        .deserialize(&bytes)
        .map_err(|e| LexfuseError::corrupt(path, format!("undecodable legacy dump: {e}")))?;

    let mut dropped = 0usize;
    let metadatas: Vec<Metadata> = legacy
        .metadatas
        .into_iter()
        .map(|m| {
            m.into_iter()
                .filter_map(|(k, v)| match v.into_current() {
                    Some(v) => Some((k, v)),
                    None => {
                        dropped += 1;
                        None
                    }
                })
                .collect()
        })
        .collect();
    if dropped > 0 {
        debug!(path = %path.display(), dropped, "dropped null metadata values");
    }

    let snapshot = IndexSnapshot {
        documents: legacy.documents,
        ids: legacy.ids,
        metadatas,
        deleted_ids: legacy.deleted_ids.into_iter().collect(),
        version: legacy.version,
        timestamp: legacy.timestamp,
    };
    checkpoint::validate_columns(path, &snapshot)?;
    Ok(snapshot)
}

/// Convert a legacy dump into a current-format checkpoint inside `store`.
///
/// The legacy file is removed only after the written checkpoint has been read
/// back and found to hold the same number of documents with the same ids. If a
/// current checkpoint with the same version already exists it must describe
/// the same corpus, otherwise nothing is written and the legacy file is kept.
pub fn migrate_legacy(
    legacy_path: &Path,
    store: &CheckpointStore,
    max_bytes: u64,
) -> LexfuseResult<MigrationReport> {
    let snapshot = decode_legacy(legacy_path, max_bytes)?;
    let target = store.path_for(snapshot.version);

    if target.exists() {
        let existing = checkpoint::load(&target, max_bytes)?;
        if !existing.same_corpus(&snapshot) {
            warn!(
                legacy = %legacy_path.display(),
                checkpoint = %target.display(),
                "legacy dump conflicts with existing checkpoint; leaving it in place"
            );
            return Err(LexfuseError::validation(format!(
                "checkpoint version {} already exists with different contents",
                snapshot.version
            )));
        }
    } else {
        checkpoint::save(&snapshot, &target)?;
    }

    let verified = match checkpoint::load(&target, max_bytes) {
        Ok(v) => v,
        Err(e) => {
            let _ = std::fs::remove_file(&target);
            return Err(e);
        }
    };
    if verified.ids.len() != snapshot.ids.len()
        || checkpoint::id_set(&verified) != checkpoint::id_set(&snapshot)
    {
        let _ = std::fs::remove_file(&target);
        return Err(LexfuseError::corrupt(
            &target,
            "migrated checkpoint does not match the legacy dump",
        ));
    }

    std::fs::remove_file(legacy_path)?;
    info!(
        legacy = %legacy_path.display(),
        checkpoint = %target.display(),
        documents = verified.ids.len(),
        version = verified.version,
        "migrated legacy checkpoint"
    );
    Ok(MigrationReport {
        legacy_path: legacy_path.to_path_buf(),
        checkpoint_path: target,
        documents: verified.ids.len(),
        version: verified.version,
    })
}
