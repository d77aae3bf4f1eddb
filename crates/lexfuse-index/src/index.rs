//! The incremental lexical index: a mutable corpus with tombstones, a BM25
//! ranking structure rebuilt from scratch, and checkpoint/restore.

use lexfuse_core::{DocId, IndexConfig, LexfuseError, LexfuseResult, Metadata, ScoredDoc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::bm25::{Bm25Index, Bm25Params};
use crate::checkpoint::CheckpointStore;
use crate::document::{DocumentRecord, IndexSnapshot};

/// Lifecycle of the ranking structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Nothing has been built or restored.
    Empty,
    /// The ranking structure reflects the corpus.
    Built,
    /// The corpus changed since the last build.
    Stale,
    /// Built, and the current version is on disk.
    Persisted,
}

/// Point-in-time counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    /// Current lifecycle state.
    pub state: IndexState,
    /// Current version.
    pub version: u64,
    /// Content generation; see [`LexicalIndex::generation`].
    pub generation: u64,
    /// Records that are searchable.
    pub live_documents: usize,
    /// Records awaiting purge.
    pub tombstoned_documents: usize,
    /// All records held in memory.
    pub total_documents: usize,
    /// Distinct terms in the ranking structure.
    pub vocabulary_size: usize,
    /// Average token count of the documents the structure was built over.
    pub avg_doc_length: f32,
}

/// Result of [`LexicalIndex::checkpoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointReport {
    /// Version that was written.
    pub version: u64,
    /// File that was written.
    pub path: PathBuf,
    /// Older checkpoints deleted by retention.
    pub pruned: Vec<PathBuf>,
}

/// Outcome of a restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    /// A checkpoint was loaded.
    Restored,
    /// No usable checkpoint; the index is empty.
    Failed,
}

/// Result of [`LexicalIndex::restore`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreReport {
    /// Whether a checkpoint was loaded.
    pub status: RestoreStatus,
    /// Live documents after the restore.
    pub documents_restored: usize,
    /// Snapshot version used, if any.
    pub version: Option<u64>,
    /// Legacy dumps converted during this restore.
    pub migrated_legacy: usize,
    /// Why the restore failed, if it did.
    pub error: Option<String>,
}

impl RestoreReport {
    fn failed(migrated_legacy: usize, error: String) -> Self {
        Self {
            status: RestoreStatus::Failed,
            documents_restored: 0,
            version: None,
            migrated_legacy,
            error: Some(error),
        }
    }
}

struct Inner {
    records: Vec<DocumentRecord>,
    positions: HashMap<DocId, usize>,
    /// Slots are positions in `records` at build time.
    ranking: Bm25Index,
    state: IndexState,
    version: u64,
    /// Rebuilds always go past this: the highest version on disk or ever
    /// held in memory.
    version_floor: u64,
    /// Bumped on every change to what a search can return.
    generation: u64,
}

impl Inner {
    fn empty(params: Bm25Params, version_floor: u64, generation: u64) -> Self {
        Self {
            records: Vec::new(),
            positions: HashMap::new(),
            ranking: Bm25Index::new(params),
            state: IndexState::Empty,
            version: 0,
            version_floor,
            generation,
        }
    }

    fn from_snapshot(
        snapshot: &IndexSnapshot,
        params: Bm25Params,
        version_floor: u64,
        generation: u64,
    ) -> Self {
        let records = snapshot.records();
        let positions = records
            .iter()
            .enumerate()
            .map(|(slot, r)| (r.id.clone(), slot))
            .collect();
        let mut inner = Self {
            records,
            positions,
            ranking: Bm25Index::new(params),
            state: IndexState::Built,
            version: snapshot.version,
            version_floor,
            generation,
        };
        inner.build_ranking(params);
        inner
    }

    fn build_ranking(&mut self, params: Bm25Params) {
        self.ranking = Bm25Index::build(
            params,
            self.records
                .iter()
                .enumerate()
                .filter(|(_, r)| !r.tombstoned)
                .map(|(slot, r)| (slot, r.text.as_str())),
        );
    }

    /// Drop tombstoned records and rebuild from scratch.
    fn rebuild(&mut self, params: Bm25Params) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.tombstoned);
        let purged = before - self.records.len();
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(slot, r)| (r.id.clone(), slot))
            .collect();
        self.build_ranking(params);
        self.version = self.version.max(self.version_floor) + 1;
        self.generation += 1;
        self.state = IndexState::Built;
        purged
    }

    /// Floor for whatever replaces this state: nothing this process has
    /// handed out or written may be reused.
    fn successor_floor(&self, on_disk: u64) -> u64 {
        self.version.max(self.version_floor).max(on_disk)
    }

    fn live(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.iter().filter(|r| !r.tombstoned)
    }

    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            documents: self.records.iter().map(|r| r.text.clone()).collect(),
            ids: self.records.iter().map(|r| r.id.clone()).collect(),
            metadatas: self.records.iter().map(|r| r.metadata.clone()).collect(),
            deleted_ids: self
                .records
                .iter()
                .filter(|r| r.tombstoned)
                .map(|r| r.id.clone())
                .collect::<BTreeSet<_>>(),
            version: self.version,
            timestamp: unix_now(),
        }
    }
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Mutable document corpus with BM25 keyword ranking.
///
/// Mutations, rebuilds and restores take the write lock; searches share the
/// read lock. Every rebuild increments [`version`](Self::version).
pub struct LexicalIndex {
    params: Bm25Params,
    rebuild_on_mutation: bool,
    store: Option<CheckpointStore>,
    inner: RwLock<Inner>,
}

impl LexicalIndex {
    /// An empty, in-memory index.
    pub fn new(config: &IndexConfig) -> Self {
        let params = Bm25Params {
            k1: config.k1,
            b: config.b,
        };
        Self {
            params,
            rebuild_on_mutation: config.rebuild_on_mutation,
            store: None,
            inner: RwLock::new(Inner::empty(params, 0, 0)),
        }
    }

    /// An empty index that checkpoints into `store`.
    pub fn with_store(config: &IndexConfig, store: CheckpointStore) -> Self {
        let mut index = Self::new(config);
        index.store = Some(store);
        index
    }

    /// Startup path: restore the newest valid checkpoint in `store`, or stay
    /// empty if there is none.
    pub fn open(config: &IndexConfig, store: CheckpointStore) -> (Self, RestoreReport) {
        let index = Self::with_store(config, store);
        let report = index.restore_inner(None);
        (index, report)
    }

    /// Checkpoint store, if persistence is configured.
    pub fn store(&self) -> Option<&CheckpointStore> {
        self.store.as_ref()
    }

    /// Append documents. `metadatas`, when given, must match `ids` in length.
    ///
    /// The whole batch is rejected if any id is empty, repeated within the
    /// batch, or already present (live or tombstoned).
    pub fn add_documents(
        &self,
        ids: Vec<DocId>,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> LexfuseResult<()> {
        if ids.len() != texts.len() {
            return Err(LexfuseError::validation(format!(
                "{} ids but {} texts",
                ids.len(),
                texts.len()
            )));
        }
        let metadatas = match metadatas {
            Some(m) if m.len() != ids.len() => {
                return Err(LexfuseError::validation(format!(
                    "{} ids but {} metadatas",
                    ids.len(),
                    m.len()
                )))
            }
            Some(m) => m,
            None => vec![Metadata::new(); ids.len()],
        };
        if ids.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();
        let mut batch: HashSet<&str> = HashSet::with_capacity(ids.len());
        for id in &ids {
            if id.trim().is_empty() {
                return Err(LexfuseError::validation("document id must not be empty"));
            }
            if !batch.insert(id.as_str()) {
                return Err(LexfuseError::validation(format!(
                    "duplicate id '{id}' in batch"
                )));
            }
            if let Some(&slot) = inner.positions.get(id) {
                let what = if inner.records[slot].tombstoned {
                    "is tombstoned and awaiting rebuild"
                } else {
                    "already exists"
                };
                return Err(LexfuseError::validation(format!("id '{id}' {what}")));
            }
        }

        let added = ids.len();
        for ((id, text), metadata) in ids.into_iter().zip(texts).zip(metadatas) {
            let slot = inner.records.len();
            inner.positions.insert(id.clone(), slot);
            inner.records.push(DocumentRecord::new(id, text, metadata));
        }
        inner.state = IndexState::Stale;
        inner.generation += 1;
        debug!(added, total = inner.records.len(), "documents added");

        if self.rebuild_on_mutation {
            self.rebuild_locked(&mut inner);
        }
        Ok(())
    }

    /// Tombstone documents. Unknown or already tombstoned ids are ignored.
    /// Returns how many records were newly tombstoned.
    pub fn remove_documents<S: AsRef<str>>(&self, ids: &[S]) -> usize {
        let mut inner = self.inner.write();
        let mut removed = 0;
        for id in ids {
            if let Some(&slot) = inner.positions.get(id.as_ref()) {
                let record = &mut inner.records[slot];
                if !record.tombstoned {
                    record.tombstoned = true;
                    removed += 1;
                }
            }
        }
        if removed == 0 {
            return 0;
        }
        inner.state = IndexState::Stale;
        inner.generation += 1;
        debug!(removed, "documents tombstoned");

        if self.rebuild_on_mutation {
            self.rebuild_locked(&mut inner);
        }
        removed
    }

    /// Purge tombstones and rebuild the ranking structure. Returns the new version.
    pub fn rebuild(&self) -> u64 {
        let mut inner = self.inner.write();
        self.rebuild_locked(&mut inner)
    }

    fn rebuild_locked(&self, inner: &mut Inner) -> u64 {
        let purged = inner.rebuild(self.params);
        info!(
            version = inner.version,
            live = inner.records.len(),
            purged,
            vocabulary = inner.ranking.vocabulary_size(),
            "lexical index rebuilt"
        );
        inner.version
    }

    /// Top `k` live documents for `query`, best first.
    ///
    /// Only documents sharing at least one term with the query are returned.
    /// Ties are broken by insertion order. A stale index answers from its last
    /// build, minus anything tombstoned since.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredDoc> {
        if k == 0 {
            return Vec::new();
        }
        let inner = self.inner.read();
        let mut hits: Vec<(usize, f32)> = inner
            .ranking
            .score(query)
            .into_iter()
            .filter(|&(slot, score)| {
                score > 0.0 && inner.records.get(slot).is_some_and(|r| !r.tombstoned)
            })
            .collect();
        // Slots are unique and follow insertion order, so this order is total.
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        hits.into_iter()
            .map(|(slot, score)| ScoredDoc::new(inner.records[slot].id.clone(), score))
            .collect()
    }

    /// Current version. Starts at 0 and increases with every rebuild. After a
    /// restore, the next rebuild moves past every version already on disk and
    /// every version this index has held.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Counter that moves on every add, removal, rebuild and restore, and
    /// never repeats within the process. Unlike [`version`](Self::version) it
    /// also changes when a restore brings back an earlier version, so caches
    /// of search results key on this.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.inner.read().state
    }

    /// Fetch a live document.
    pub fn get_document(&self, id: &str) -> LexfuseResult<DocumentRecord> {
        let inner = self.inner.read();
        inner
            .positions
            .get(id)
            .map(|&slot| &inner.records[slot])
            .filter(|r| !r.tombstoned)
            .cloned()
            .ok_or_else(|| LexfuseError::NotFound(format!("document '{id}'")))
    }

    /// Whether `id` is present and not tombstoned.
    pub fn contains_live(&self, id: &str) -> bool {
        let inner = self.inner.read();
        inner
            .positions
            .get(id)
            .is_some_and(|&slot| !inner.records[slot].tombstoned)
    }

    /// Ids of live documents, in insertion order.
    pub fn live_ids(&self) -> Vec<DocId> {
        self.inner.read().live().map(|r| r.id.clone()).collect()
    }

    /// Counters for monitoring.
    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read();
        let live = inner.live().count();
        IndexStats {
            state: inner.state,
            version: inner.version,
            generation: inner.generation,
            live_documents: live,
            tombstoned_documents: inner.records.len() - live,
            total_documents: inner.records.len(),
            vocabulary_size: inner.ranking.vocabulary_size(),
            avg_doc_length: inner.ranking.avg_doc_length(),
        }
    }

    /// Current corpus as a snapshot (tombstoned records included).
    pub fn snapshot(&self) -> IndexSnapshot {
        self.inner.read().snapshot()
    }

    /// Persist the current version. A stale index is rebuilt first so that a
    /// version number always names exactly one corpus.
    pub fn checkpoint(&self) -> LexfuseResult<CheckpointReport> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| LexfuseError::validation("no checkpoint directory configured"))?;

        let snapshot = {
            let mut inner = self.inner.write();
            if inner.state == IndexState::Stale {
                self.rebuild_locked(&mut inner);
            }
            inner.snapshot()
        };

        let (path, pruned) = store.save(&snapshot)?;

        let mut inner = self.inner.write();
        if inner.version == snapshot.version && inner.state == IndexState::Built {
            inner.state = IndexState::Persisted;
        }
        Ok(CheckpointReport {
            version: snapshot.version,
            path,
            pruned,
        })
    }

    /// Replace the in-memory state with a checkpoint.
    ///
    /// `None` migrates any legacy dumps, then tries checkpoints newest first
    /// and uses the first that validates. Failure is reported, not raised, and
    /// leaves the index empty.
    pub fn restore(&self, version: Option<u64>) -> LexfuseResult<RestoreReport> {
        if self.store.is_none() {
            return Err(LexfuseError::validation("no checkpoint directory configured"));
        }
        Ok(self.restore_inner(version))
    }

    fn restore_inner(&self, version: Option<u64>) -> RestoreReport {
        let Some(store) = self.store.as_ref() else {
            return RestoreReport::failed(0, "no checkpoint directory configured".into());
        };

        let migrated = match store.migrate_all_legacy() {
            Ok(reports) => reports.len(),
            Err(e) => {
                warn!(error = %e, "could not scan for legacy checkpoints");
                0
            }
        };

        let loaded = match version {
            Some(v) => store.load(v),
            None => self.load_newest(store),
        };

        match loaded {
            Ok(snapshot) => {
                let live = snapshot.live_count();
                let on_disk = store.latest_version().ok().flatten().unwrap_or(0);
                let mut inner = self.inner.write();
                let floor = inner.successor_floor(on_disk);
                let generation = inner.generation + 1;
                *inner = Inner::from_snapshot(&snapshot, self.params, floor, generation);
                info!(
                    version = snapshot.version,
                    documents = live,
                    tombstoned = snapshot.deleted_ids.len(),
                    "lexical index restored"
                );
                RestoreReport {
                    status: RestoreStatus::Restored,
                    documents_restored: live,
                    version: Some(snapshot.version),
                    migrated_legacy: migrated,
                    error: None,
                }
            }
            Err(e) => {
                let on_disk = store.latest_version().ok().flatten().unwrap_or(0);
                let mut inner = self.inner.write();
                let floor = inner.successor_floor(on_disk);
                let generation = inner.generation + 1;
                *inner = Inner::empty(self.params, floor, generation);
                warn!(error = %e, "restore failed; lexical index is empty");
                RestoreReport::failed(migrated, e.to_string())
            }
        }
    }

    fn load_newest(&self, store: &CheckpointStore) -> LexfuseResult<IndexSnapshot> {
        let versions = store.list_versions()?;
        let mut last_error = None;
        for &v in versions.iter().rev() {
            match store.load(v) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    warn!(version = v, error = %e, "skipping unusable checkpoint");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| LexfuseError::NotFound("no checkpoint available".into())))
    }
}
