//! Checkpoint serializer and on-disk checkpoint store.
//!
//! Checkpoints are pretty-printed JSON documents with an explicit format tag
//! and schema version. Parsing is strict: unknown fields, mismatched column
//! lengths, duplicate ids, dangling tombstones and checksum mismatches are all
//! rejected as [`LexfuseError::CorruptState`]. Content is only ever decoded as
//! data.

use lexfuse_core::{CheckpointConfig, DocId, LexfuseError, LexfuseResult, Metadata};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::IndexSnapshot;
use crate::legacy::{self, MigrationReport};

/// Format tag every checkpoint carries.
pub const CHECKPOINT_FORMAT: &str = "lexfuse-checkpoint";

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

const FILE_PREFIX: &str = "checkpoint-";
const FILE_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";

/// On-disk layout. Field order is the order written to disk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckpointFile {
    format: String,
    schema_version: u32,
    version: u64,
    timestamp: f64,
    /// Required from schema 2 on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    ids: Vec<DocId>,
    documents: Vec<String>,
    /// Required from schema 2 on; schema 1 predates metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadatas: Option<Vec<Metadata>>,
    deleted_ids: Vec<DocId>,
}

/// SHA-256 (hex) over the ids and texts, in order.
pub fn corpus_checksum(ids: &[DocId], documents: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (id, text) in ids.iter().zip(documents) {
        hasher.update(id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(text.as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// Encode a snapshot in the current schema and write it atomically to `path`.
pub fn save(snapshot: &IndexSnapshot, path: &Path) -> LexfuseResult<()> {
    let file = CheckpointFile {
        format: CHECKPOINT_FORMAT.to_string(),
        schema_version: SCHEMA_VERSION,
        version: snapshot.version,
        timestamp: snapshot.timestamp,
        checksum: Some(corpus_checksum(&snapshot.ids, &snapshot.documents)),
        ids: snapshot.ids.clone(),
        documents: snapshot.documents.clone(),
        metadatas: Some(snapshot.metadatas.clone()),
        deleted_ids: snapshot.deleted_ids.iter().cloned().collect(),
    };
    let json = serde_json::to_vec_pretty(&file)?;
    write_atomic(path, &json)
}

/// Read and strictly validate a current- or older-schema JSON checkpoint.
///
/// Legacy binary dumps are rejected here; see [`CheckpointStore::load_path`]
/// for the path that migrates them.
pub fn load(path: &Path, max_bytes: u64) -> LexfuseResult<IndexSnapshot> {
    let bytes = read_bounded(path, max_bytes)?;
    if legacy::looks_legacy(&bytes) {
        return Err(LexfuseError::corrupt(
            path,
            "legacy binary checkpoint; migration required",
        ));
    }
    let file: CheckpointFile = serde_json::from_slice(&bytes)
        .map_err(|e| LexfuseError::corrupt(path, format!("schema violation: {e}")))?;
    validate(path, file)
}

/// Read a file, refusing anything larger than `max_bytes`.
pub(crate) fn read_bounded(path: &Path, max_bytes: u64) -> LexfuseResult<Vec<u8>> {
    let meta = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LexfuseError::NotFound(format!("checkpoint {}", path.display()))
        } else {
            LexfuseError::Io(e)
        }
    })?;
    if meta.len() > max_bytes {
        return Err(LexfuseError::corrupt(
            path,
            format!("file is {} bytes, limit is {max_bytes}", meta.len()),
        ));
    }
    Ok(std::fs::read(path)?)
}

fn validate(path: &Path, file: CheckpointFile) -> LexfuseResult<IndexSnapshot> {
    if file.format != CHECKPOINT_FORMAT {
        return Err(LexfuseError::corrupt(
            path,
            format!("unexpected format tag '{}'", file.format),
        ));
    }

    let metadatas = match file.schema_version {
        1 => {
            if file.metadatas.is_some() || file.checksum.is_some() {
                return Err(LexfuseError::corrupt(
                    path,
                    "schema 1 does not define metadatas or checksum",
                ));
            }
            vec![Metadata::new(); file.ids.len()]
        }
        2 => {
            let expected = corpus_checksum(&file.ids, &file.documents);
            match file.checksum.as_deref() {
                Some(actual) if actual == expected => {}
                Some(_) => return Err(LexfuseError::corrupt(path, "checksum mismatch")),
                None => return Err(LexfuseError::corrupt(path, "missing checksum")),
            }
            file.metadatas
                .ok_or_else(|| LexfuseError::corrupt(path, "missing metadatas"))?
        }
        other => {
            return Err(LexfuseError::corrupt(
                path,
                format!("unsupported schema version {other}"),
            ))
        }
    };

    let snapshot = IndexSnapshot {
        documents: file.documents,
        ids: file.ids,
        metadatas,
        deleted_ids: file.deleted_ids.into_iter().collect(),
        version: file.version,
        timestamp: file.timestamp,
    };
    validate_columns(path, &snapshot)?;
    Ok(snapshot)
}

/// Structural invariants shared by every snapshot source.
pub(crate) fn validate_columns(path: &Path, snapshot: &IndexSnapshot) -> LexfuseResult<()> {
    let n = snapshot.ids.len();
    if snapshot.documents.len() != n || snapshot.metadatas.len() != n {
        return Err(LexfuseError::corrupt(
            path,
            format!(
                "column length mismatch: {} ids, {} documents, {} metadatas",
                n,
                snapshot.documents.len(),
                snapshot.metadatas.len()
            ),
        ));
    }
    let mut seen: HashSet<&str> = HashSet::with_capacity(n);
    for id in &snapshot.ids {
        if id.trim().is_empty() {
            return Err(LexfuseError::corrupt(path, "empty document id"));
        }
        if !seen.insert(id.as_str()) {
            return Err(LexfuseError::corrupt(path, format!("duplicate id '{id}'")));
        }
    }
    if let Some(dangling) = snapshot
        .deleted_ids
        .iter()
        .find(|id| !seen.contains(id.as_str()))
    {
        return Err(LexfuseError::corrupt(
            path,
            format!("deleted id '{dangling}' is not in the corpus"),
        ));
    }
    if !(snapshot.timestamp.is_finite() && snapshot.timestamp >= 0.0) {
        return Err(LexfuseError::corrupt(path, "invalid timestamp"));
    }
    Ok(())
}

/// Write `bytes` to a uniquely named sibling temp file, fsync it, then rename
/// over `path`.
///
/// Readers only ever observe the previous file or the complete new one, and
/// concurrent writers of the same path never share a temp file. A failed write
/// removes its temp file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> LexfuseResult<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut prefix = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    prefix.push(".");
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(TMP_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Persist the rename itself; not supported everywhere.
    #[cfg(unix)]
    if let Ok(d) = std::fs::File::open(dir) {
        let _ = d.sync_all();
    }
    Ok(())
}

/// Directory of versioned checkpoints with bounded retention.
///
/// Clones share one write lock, so saves, migrations and pruning through the
/// same store never interleave.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    retain: usize,
    max_file_bytes: u64,
    writes: Arc<Mutex<()>>,
}

impl CheckpointStore {
    /// Open (creating if needed) a checkpoint directory. Leftover temp files
    /// from an interrupted write are removed.
    pub fn new(dir: impl Into<PathBuf>, retain: usize, max_file_bytes: u64) -> LexfuseResult<Self> {
        if retain == 0 {
            return Err(LexfuseError::Config("checkpoint retention must be >= 1".into()));
        }
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            retain,
            max_file_bytes,
            writes: Arc::new(Mutex::new(())),
        };
        store.remove_stale_temp_files()?;
        Ok(store)
    }

    /// Build a store from config; `None` when no directory is configured.
    pub fn from_config(config: &CheckpointConfig) -> LexfuseResult<Option<Self>> {
        match &config.dir {
            Some(dir) => Ok(Some(Self::new(
                dir.clone(),
                config.retain,
                config.max_file_bytes,
            )?)),
            None => Ok(None),
        }
    }

    /// Checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint for `version`.
    pub fn path_for(&self, version: u64) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{version:020}{FILE_SUFFIX}"))
    }

    /// Save `snapshot` atomically and prune old checkpoints.
    /// Returns the written path and the pruned paths.
    pub fn save(&self, snapshot: &IndexSnapshot) -> LexfuseResult<(PathBuf, Vec<PathBuf>)> {
        let _writing = self.writes.lock();
        let path = self.path_for(snapshot.version);
        save(snapshot, &path)?;
        info!(
            version = snapshot.version,
            documents = snapshot.ids.len(),
            path = %path.display(),
            "checkpoint written"
        );
        let pruned = self.prune_locked()?;
        Ok((path, pruned))
    }

    /// Load the checkpoint for `version`.
    pub fn load(&self, version: u64) -> LexfuseResult<IndexSnapshot> {
        self.load_path(&self.path_for(version))
    }

    /// Load any checkpoint file, migrating it first if it is a legacy dump.
    pub fn load_path(&self, path: &Path) -> LexfuseResult<IndexSnapshot> {
        if legacy::is_legacy_file(path, self.max_file_bytes)? {
            let report = self.migrate(path)?;
            return load(&report.checkpoint_path, self.max_file_bytes);
        }
        load(path, self.max_file_bytes)
    }

    /// Versions of all current-format checkpoints, ascending.
    pub fn list_versions(&self) -> LexfuseResult<Vec<u64>> {
        let mut versions: Vec<u64> = std::fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .filter_map(|entry| parse_version(&entry.file_name().to_string_lossy()))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    /// Highest checkpoint version on disk.
    pub fn latest_version(&self) -> LexfuseResult<Option<u64>> {
        Ok(self.list_versions()?.last().copied())
    }

    /// Delete all but the `retain` most recent checkpoints.
    pub fn prune(&self) -> LexfuseResult<Vec<PathBuf>> {
        let _writing = self.writes.lock();
        self.prune_locked()
    }

    fn prune_locked(&self) -> LexfuseResult<Vec<PathBuf>> {
        let versions = self.list_versions()?;
        let excess = versions.len().saturating_sub(self.retain);
        let mut pruned = Vec::with_capacity(excess);
        for version in versions.into_iter().take(excess) {
            let path = self.path_for(version);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                // Another store on the same directory got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            debug!(version, path = %path.display(), "pruned checkpoint");
            pruned.push(path);
        }
        Ok(pruned)
    }

    /// Legacy dumps present in the directory.
    pub fn legacy_files(&self) -> LexfuseResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| legacy::has_legacy_extension(p))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Migrate one legacy dump into this store.
    pub fn migrate(&self, legacy_path: &Path) -> LexfuseResult<MigrationReport> {
        let _writing = self.writes.lock();
        legacy::migrate_legacy(legacy_path, self, self.max_file_bytes)
    }

    /// Migrate every legacy dump in the directory, then apply retention.
    /// Failures are logged and leave the legacy file in place.
    pub fn migrate_all_legacy(&self) -> LexfuseResult<Vec<MigrationReport>> {
        let mut reports = Vec::new();
        for path in self.legacy_files()? {
            match self.migrate(&path) {
                Ok(report) => reports.push(report),
                Err(e) => warn!(path = %path.display(), error = %e, "legacy migration failed"),
            }
        }
        if !reports.is_empty() {
            let pruned = self.prune()?;
            if !pruned.is_empty() {
                debug!(pruned = pruned.len(), "retention applied after migration");
            }
        }
        Ok(reports)
    }

    fn remove_stale_temp_files(&self) -> LexfuseResult<()> {
        for entry in std::fs::read_dir(&self.dir)?.filter_map(Result::ok) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(FILE_PREFIX) && name.ends_with(TMP_SUFFIX) {
                warn!(file = %name, "removing interrupted checkpoint write");
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

fn parse_version(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

/// Ids present in a snapshot, for equivalence checks.
pub(crate) fn id_set(snapshot: &IndexSnapshot) -> BTreeSet<&str> {
    snapshot.ids.iter().map(String::as_str).collect()
}
