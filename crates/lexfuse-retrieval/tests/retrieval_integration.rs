#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the lexfuse-retrieval crate.
//!
//! Covers degradation when the vector side is slow or failing, per-session
//! cache isolation, invalidation on index change, removed documents never
//! resurfacing, and fusion ordering properties.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use lexfuse_cache::MultiTierCache;
use lexfuse_core::{
    CacheConfig, FusionConfig, IndexConfig, LexfuseConfig, LexfuseError, LexfuseResult,
    ManualClock, ScoredDoc, SystemClock,
};
use lexfuse_index::{LexicalIndex, RestoreStatus};
use lexfuse_retrieval::{
    fuse, HybridRetriever, ResultSource, RetrievalQuery, VectorSearch,
};
use lexfuse_session::SessionManager;

mod common;
use common::{cosine_similarity, CosineVectors};

struct SlowVectors(Duration);

#[async_trait]
impl VectorSearch for SlowVectors {
    async fn search(&self, _query: &[f32], _k: usize) -> LexfuseResult<Vec<ScoredDoc>> {
        tokio::time::sleep(self.0).await;
        Ok(vec![ScoredDoc::new("id2", 0.99)])
    }
}

struct BrokenVectors;

#[async_trait]
impl VectorSearch for BrokenVectors {
    async fn search(&self, _query: &[f32], _k: usize) -> LexfuseResult<Vec<ScoredDoc>> {
        Err(LexfuseError::Dependency("connection refused".into()))
    }
}

fn retriever_with(
    vector: Option<Arc<dyn VectorSearch>>,
    fusion: FusionConfig,
) -> (HybridRetriever, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let index = Arc::new(LexicalIndex::new(&IndexConfig::default()));
    index
        .add_documents(
            vec!["id1".into(), "id2".into(), "id3".into()],
            vec![
                "the cat sat on the mat".into(),
                "dogs are loyal animals".into(),
                "a cat and a dog became friends".into(),
            ],
            None,
        )
        .unwrap();
    let cache = Arc::new(MultiTierCache::new(&CacheConfig::default(), clock.clone()));
    let sessions = Arc::new(SessionManager::with_timeout(
        Duration::from_secs(1800),
        clock.clone(),
    ));
    (
        HybridRetriever::new(index, vector, cache, sessions, fusion),
        clock,
    )
}

fn ids(hits: &[ScoredDoc]) -> Vec<&str> {
    hits.iter().map(|h| h.id.as_str()).collect()
}

#[tokio::test]
async fn slow_vector_side_degrades_to_lexical_and_is_not_cached() {
    let fusion = FusionConfig {
        vector_timeout_ms: 50,
        ..FusionConfig::default()
    };
    let (r, _) = retriever_with(Some(Arc::new(SlowVectors(Duration::from_secs(2)))), fusion);
    let query = RetrievalQuery::text("cat", 5).with_embedding(vec![1.0, 0.0]);

    let first = r.retrieve(None, &query).await.unwrap();
    assert!(first.degraded);
    assert_eq!(first.source, ResultSource::LexicalOnly);
    assert!(!ids(&first.hits).contains(&"id2"));
    assert_eq!(first.hits[0].score, 1.0);

    let session = first.session_id.to_string();
    let second = r.retrieve(Some(&session), &query).await.unwrap();
    assert_ne!(second.source, ResultSource::Cache);
    assert!(second.degraded);
    assert_eq!(r.cache().stats().results.entries, 0);
}

#[tokio::test]
async fn failing_vector_side_degrades_instead_of_erroring() {
    let (r, _) = retriever_with(Some(Arc::new(BrokenVectors)), FusionConfig::default());
    let resp = r
        .retrieve(None, &RetrievalQuery::text("dogs", 3).with_embedding(vec![1.0]))
        .await
        .unwrap();
    assert!(resp.degraded);
    assert_eq!(ids(&resp.hits), vec!["id2"]);
}

#[tokio::test]
async fn hybrid_result_is_cached_per_session_only() {
    let vectors = Arc::new(CosineVectors::new());
    vectors.insert("id1", vec![1.0, 0.0]).await.unwrap();
    vectors.insert("id2", vec![0.0, 1.0]).await.unwrap();
    let (r, _) = retriever_with(Some(vectors), FusionConfig::default());
    let query = RetrievalQuery::text("cat", 5).with_embedding(vec![0.0, 1.0]);

    let a1 = r.retrieve(None, &query).await.unwrap();
    assert_eq!(a1.source, ResultSource::Hybrid);
    assert!(!a1.degraded);

    let a2 = r
        .retrieve(Some(&a1.session_id.to_string()), &query)
        .await
        .unwrap();
    assert_eq!(a2.source, ResultSource::Cache);
    assert_eq!(a2.hits, a1.hits);

    let b1 = r.retrieve(None, &query).await.unwrap();
    assert_ne!(b1.session_id, a1.session_id);
    assert_eq!(b1.source, ResultSource::Hybrid);
}

#[tokio::test]
async fn index_change_invalidates_cached_results() {
    let (r, _) = retriever_with(None, FusionConfig::default());
    let first = r.retrieve(None, &RetrievalQuery::text("cat", 5)).await.unwrap();
    let session = first.session_id.to_string();

    r.index()
        .add_documents(vec!["id4".into()], vec!["cat cat cat".into()], None)
        .unwrap();

    let second = r
        .retrieve(Some(&session), &RetrievalQuery::text("cat", 5))
        .await
        .unwrap();
    assert_eq!(second.source, ResultSource::LexicalOnly);
    assert!(ids(&second.hits).contains(&"id4"));
}

#[tokio::test]
async fn removed_document_never_resurfaces() {
    let vectors = Arc::new(CosineVectors::new());
    vectors.insert("id1", vec![1.0, 0.0]).await.unwrap();
    vectors.insert("id3", vec![0.9, 0.1]).await.unwrap();
    let (r, _) = retriever_with(Some(vectors), FusionConfig::default());
    let query = RetrievalQuery::text("cat", 5).with_embedding(vec![1.0, 0.0]);

    let before = r.retrieve(None, &query).await.unwrap();
    assert!(ids(&before.hits).contains(&"id1"));

    assert_eq!(r.index().remove_documents(&["id1"]), 1);
    let after = r
        .retrieve(Some(&before.session_id.to_string()), &query)
        .await
        .unwrap();
    assert!(!ids(&after.hits).contains(&"id1"));
    assert!(ids(&after.hits).contains(&"id3"));
}

#[tokio::test]
async fn expired_session_id_is_replaced() {
    let (r, clock) = retriever_with(None, FusionConfig::default());
    let first = r.retrieve(None, &RetrievalQuery::text("cat", 5)).await.unwrap();

    clock.advance(Duration::from_secs(1801));
    let second = r
        .retrieve(
            Some(&first.session_id.to_string()),
            &RetrievalQuery::text("cat", 5),
        )
        .await
        .unwrap();
    assert_ne!(second.session_id, first.session_id);
    assert_ne!(second.source, ResultSource::Cache);
}

#[tokio::test]
async fn ending_a_session_drops_its_cache() {
    let (r, _) = retriever_with(None, FusionConfig::default());
    let first = r.retrieve(None, &RetrievalQuery::text("cat", 5)).await.unwrap();
    assert_eq!(r.cache().stats().results.entries, 1);

    assert!(r.end_session(&first.session_id));
    assert_eq!(r.cache().stats().results.entries, 0);
}

#[tokio::test]
async fn alpha_override_must_be_in_range() {
    let (r, _) = retriever_with(None, FusionConfig::default());
    let err = r
        .retrieve(None, &RetrievalQuery::text("cat", 5).with_alpha(-0.1))
        .await
        .unwrap_err();
    assert!(matches!(err, LexfuseError::Validation(_)));
}

#[tokio::test]
async fn from_config_restores_the_latest_checkpoint() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = LexfuseConfig::default();
    config.checkpoint.dir = Some(dir.path().to_path_buf());

    let (first, report) =
        HybridRetriever::from_config(&config, None, Arc::new(SystemClock)).unwrap();
    assert_eq!(report.unwrap().documents_restored, 0);
    first
        .index()
        .add_documents(vec!["id1".into()], vec!["persisted cat".into()], None)
        .unwrap();
    first.index().checkpoint().unwrap();
    drop(first);

    let (second, report) =
        HybridRetriever::from_config(&config, None, Arc::new(SystemClock)).unwrap();
    let report = report.unwrap();
    assert_eq!(report.status, RestoreStatus::Restored);
    assert_eq!(report.documents_restored, 1);
    let resp = second
        .retrieve(None, &RetrievalQuery::text("persisted", 1))
        .await
        .unwrap();
    assert_eq!(ids(&resp.hits), vec!["id1"]);
}

fn persistent_retriever(dir: &tempfile::TempDir, rebuild_on_mutation: bool) -> HybridRetriever {
    let mut config = LexfuseConfig::default();
    config.checkpoint.dir = Some(dir.path().to_path_buf());
    config.index.rebuild_on_mutation = rebuild_on_mutation;
    let (r, _) = HybridRetriever::from_config(&config, None, Arc::new(SystemClock)).unwrap();
    r
}

fn add(r: &HybridRetriever, id: &str, text: &str) {
    r.index()
        .add_documents(vec![id.into()], vec![text.into()], None)
        .unwrap();
}

#[tokio::test]
async fn mutation_after_restoring_an_older_version_is_visible() {
    let dir = tempfile::TempDir::new().unwrap();
    let r = persistent_retriever(&dir, true);
    add(&r, "id1", "cat");
    r.index().checkpoint().unwrap();
    add(&r, "id2", "dog");

    let query = RetrievalQuery::text("cat", 5);
    let first = r.retrieve(None, &query).await.unwrap();
    assert_eq!(ids(&first.hits), vec!["id1"]);
    let session = first.session_id.to_string();

    r.index().restore(Some(1)).unwrap();
    add(&r, "id3", "cat cat");

    let second = r.retrieve(Some(&session), &query).await.unwrap();
    assert_ne!(second.source, ResultSource::Cache);
    assert_eq!(ids(&second.hits), ids(&r.index().search("cat", 5)));
    assert!(ids(&second.hits).contains(&"id3"));
}

#[tokio::test]
async fn restoring_the_current_version_drops_cached_results() {
    let dir = tempfile::TempDir::new().unwrap();
    let r = persistent_retriever(&dir, false);
    r.index()
        .add_documents(
            vec!["a".into(), "b".into()],
            vec!["cat".into(), "cat dog".into()],
            None,
        )
        .unwrap();
    r.index().rebuild();
    r.index().checkpoint().unwrap();
    r.index().remove_documents(&["a"]);

    let query = RetrievalQuery::text("cat", 5);
    let first = r.retrieve(None, &query).await.unwrap();
    assert_eq!(ids(&first.hits), vec!["b"]);

    r.index().restore(None).unwrap();
    let second = r
        .retrieve(Some(&first.session_id.to_string()), &query)
        .await
        .unwrap();
    assert_ne!(second.source, ResultSource::Cache);
    assert!(ids(&second.hits).contains(&"a"));
}

// Scores are small integers with anchors at 0 and 8, and alpha a multiple of
// 1/8, so every scaled and fused score is exact in f32.
#[tokio::test]
async fn cosine_vectors_rank_by_angle() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);

    let vectors = CosineVectors::new();
    assert!(vectors.insert("empty", vec![]).await.is_err());
    vectors.insert("north", vec![0.0, 1.0]).await.unwrap();
    vectors.insert("east", vec![1.0, 0.0]).await.unwrap();
    vectors.insert("north-east", vec![1.0, 1.0]).await.unwrap();
    let hits = vectors.search(&[0.1, 1.0], 2).await.unwrap();
    assert_eq!(ids(&hits), vec!["north", "north-east"]);

    assert!(vectors.remove("east").await);
    assert!(!vectors.remove("east").await);
    assert_eq!(vectors.len().await, 2);
    assert!(matches!(
        vectors.search(&[], 3).await,
        Err(LexfuseError::Validation(_))
    ));
}

proptest! {
    #[test]
    fn raising_a_lexical_score_never_lowers_the_fused_score(
        vector_score in 0u8..=8,
        lexical_score in 0u8..8,
        eighths in 0u8..=8,
    ) {
        let alpha = f32::from(eighths) / 8.0;
        let vector = vec![
            ScoredDoc::new("vhi", 8.0),
            ScoredDoc::new("t", f32::from(vector_score)),
            ScoredDoc::new("vlo", 0.0),
        ];
        let lexical_at = |s: u8| vec![
            ScoredDoc::new("lhi", 8.0),
            ScoredDoc::new("t", f32::from(s)),
            ScoredDoc::new("llo", 0.0),
        ];
        let score_of = |hits: &[ScoredDoc]| {
            hits.iter().find(|h| h.id == "t").map(|h| h.score).unwrap()
        };

        let low = fuse(&vector, &lexical_at(lexical_score), alpha, 10);
        let high = fuse(&vector, &lexical_at(lexical_score + 1), alpha, 10);
        prop_assert!(score_of(&high) >= score_of(&low));

        let expected = alpha * f32::from(vector_score) / 8.0
            + (1.0 - alpha) * f32::from(lexical_score) / 8.0;
        prop_assert_eq!(score_of(&low), expected);
    }

    #[test]
    fn vector_only_document_never_drops_as_alpha_grows(
        target in 0u8..=8,
        others in proptest::collection::vec(
            (proptest::option::of(0u8..=8), proptest::option::of(0u8..=8)),
            0..6,
        ),
        a in 0u8..=8,
        b in 0u8..=8,
    ) {
        let (lo, hi) = (a.min(b), a.max(b));

        // Rankings arrive best first, anchored at 8 and 0.
        let mut vector = vec![("t".to_string(), target)];
        let mut lexical = Vec::new();
        for (i, (v, l)) in others.iter().enumerate() {
            if let Some(v) = v {
                vector.push((format!("d{i}"), *v));
            }
            if let Some(l) = l {
                lexical.push((format!("d{i}"), *l));
            }
        }
        let ranked = |anchor: &str, mut items: Vec<(String, u8)>| -> Vec<ScoredDoc> {
            items.sort_by(|x, y| y.1.cmp(&x.1));
            let mut docs = vec![ScoredDoc::new(format!("{anchor}hi"), 8.0)];
            docs.extend(items.into_iter().map(|(id, s)| ScoredDoc::new(id, f32::from(s))));
            docs.push(ScoredDoc::new(format!("{anchor}lo"), 0.0));
            docs
        };
        let vector = ranked("v", vector);
        let lexical = ranked("l", lexical);

        let position = |eighths: u8| {
            fuse(&vector, &lexical, f32::from(eighths) / 8.0, usize::MAX)
                .iter()
                .position(|h| h.id == "t")
                .unwrap()
        };
        prop_assert!(position(hi) <= position(lo));
    }

    #[test]
    fn fused_output_is_sorted_bounded_and_unique(
        vector in proptest::collection::vec((0u8..6, 0u8..=8), 0..8),
        lexical in proptest::collection::vec((0u8..6, 0u8..=8), 0..8),
        eighths in 0u8..=8,
        k in 1usize..10,
    ) {
        let to_docs = |items: &[(u8, u8)]| -> Vec<ScoredDoc> {
            items
                .iter()
                .map(|(id, s)| ScoredDoc::new(format!("d{id}"), f32::from(*s)))
                .collect()
        };
        let fused = fuse(&to_docs(&vector), &to_docs(&lexical), f32::from(eighths) / 8.0, k);

        prop_assert!(fused.len() <= k);
        prop_assert!(fused.windows(2).all(|w| w[0].score >= w[1].score));
        prop_assert!(fused.iter().all(|h| (0.0..=1.0).contains(&h.score)));
        let mut seen = std::collections::HashSet::new();
        prop_assert!(fused.iter().all(|h| seen.insert(h.id.clone())));
    }
}
