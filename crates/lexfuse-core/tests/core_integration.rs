#![allow(clippy::unwrap_used, clippy::expect_used)]

use lexfuse_core::*;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// 1. ScoredDoc serialization roundtrip
// ---------------------------------------------------------------------------

#[test]
fn scored_doc_serialization_roundtrip() {
    let hit = ScoredDoc::new("doc-7", 0.42);
    let json = serde_json::to_string(&hit).unwrap();
    let back: ScoredDoc = serde_json::from_str(&json).unwrap();
    assert_eq!(back, hit);
}

// ---------------------------------------------------------------------------
// 2. Clock shared behind a trait object
// ---------------------------------------------------------------------------

#[test]
fn manual_clock_behind_trait_object() {
    let manual = Arc::new(ManualClock::default());
    let clock: Arc<dyn Clock> = manual.clone();
    let t0 = clock.now();
    manual.advance(Duration::from_millis(1500));
    assert_eq!((clock.now() - t0).num_milliseconds(), 1500);
}

// ---------------------------------------------------------------------------
// 3. Full config document
// ---------------------------------------------------------------------------

#[test]
fn full_config_document_parses() {
    let config = LexfuseConfig::from_toml_str(
        r#"
        [index]
        k1 = 0.9
        b = 0.4
        rebuild_on_mutation = false

        [checkpoint]
        dir = "./data/checkpoints"
        retain = 2

        [fusion]
        alpha = 0.7
        vector_timeout_ms = 150

        [cache]
        session_ttl_secs = 30
        content_ttl_secs = 600

        [session]
        inactivity_timeout_secs = 900
        "#,
    )
    .unwrap();

    assert!(!config.index.rebuild_on_mutation);
    assert_eq!(config.fusion.vector_timeout(), Duration::from_millis(150));
    assert_eq!(config.cache.session_ttl(), Duration::from_secs(30));
    assert_eq!(config.cache.content_ttl(), Duration::from_secs(600));
    assert_eq!(config.session.inactivity_timeout(), Duration::from_secs(900));
    // Unspecified fields keep their defaults.
    assert_eq!(config.fusion.candidate_multiplier, 3);
    assert_eq!(config.cache.session_capacity, 1024);
}

// ---------------------------------------------------------------------------
// 4. Error display
// ---------------------------------------------------------------------------

#[test]
fn error_display_formats() {
    let timeout = LexfuseError::DependencyTimeout {
        dependency: "vector-search".into(),
        timeout_ms: 250,
    };
    assert_eq!(
        timeout.to_string(),
        "Dependency 'vector-search' timed out after 250 ms"
    );
    assert_eq!(
        LexfuseError::validation("empty id").to_string(),
        "Validation error: empty id"
    );
}
