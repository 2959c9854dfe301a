//! Learning-engine scenarios: API pattern acquisition from successful
//! extractions, confidence decay, and knowledge-base persistence.

use std::sync::Arc;

use acquisition::testing::{fixtures, MockHttpClient};
use acquisition::{
    Acquisition, Confidence, FailureContext, FailureType, FetchOptions, LearnSource, Tier,
};

#[tokio::test]
async fn devto_api_success_teaches_bypassable_pattern() {
    // S5: an api:* success emits an event and learns a high-confidence
    // pattern for the domain
    let engine = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::with_routes(&[
            (
                "https://dev.to/api/articles/alice/hello",
                fixtures::DEVTO_ARTICLE_JSON,
            ),
            ("https://dev.to/alice/hello", "<html><body></body></html>"),
        ])))
        .build()
        .await
        .unwrap();

    let mut events = engine.subscribe_events();

    let result = engine
        .fetch_content("https://dev.to/alice/hello", &FetchOptions::default())
        .await;

    assert!(result.is_ok(), "error: {:?}", result.result.error);
    assert_eq!(result.result.meta.strategy, "api:devto");
    assert_eq!(
        result.result.meta.final_url,
        "https://dev.to/api/articles/alice/hello"
    );

    let event = events.try_recv().unwrap();
    assert_eq!(event.strategy, "api:devto");
    assert_eq!(event.source_url, "https://dev.to/alice/hello");
    assert_eq!(event.api_url, "https://dev.to/api/articles/alice/hello");

    let entry = engine.learning().store().entry("dev.to").unwrap();
    assert_eq!(entry.api_patterns.len(), 1);
    assert_eq!(
        entry.api_patterns[0].endpoint,
        "https://dev.to/api/articles/alice/hello"
    );
    assert_eq!(entry.api_patterns[0].confidence, Confidence::High);
    assert!(entry.api_patterns[0].can_bypass);
}

#[tokio::test]
async fn repeated_success_builds_trusted_preference() {
    let engine = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::with_routes(&[(
            "https://example.com/article",
            fixtures::ARTICLE_HTML,
        )])))
        .build()
        .await
        .unwrap();

    for _ in 0..3 {
        let result = engine
            .fetch_content("https://example.com/article", &FetchOptions::default())
            .await;
        assert!(result.is_ok());
    }

    let preference = engine.orchestrator().preference("example.com").unwrap();
    assert_eq!(preference.preferred_tier, Tier::Intelligence);
    assert_eq!(preference.success_count, 3);
    assert!(preference.avg_response_time_ms >= 0.0);
}

#[tokio::test]
async fn stale_pattern_decays_on_startup() {
    // S6: a pattern last verified 35 days ago drops to medium
    let engine = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::new()))
        .build()
        .await
        .unwrap();

    let learning = engine.learning();
    learning.learn_api_pattern(
        "stale.example",
        "https://stale.example/api/items",
        "GET",
        LearnSource::new("test"),
    );
    learning.store().with_entry_mut("stale.example", |entry| {
        entry.api_patterns[0].last_verified = chrono::Utc::now() - chrono::Duration::days(35);
    });

    learning.apply_confidence_decay();

    let entry = learning.store().entry("stale.example").unwrap();
    assert_eq!(entry.api_patterns[0].confidence, Confidence::Medium);
    assert!(!entry.api_patterns[0].can_bypass);

    // The decay event recorded the pre-change grade
    let decay_events = &entry.api_patterns[0].provenance.decay_events;
    assert_eq!(decay_events.len(), 1);
    assert_eq!(decay_events[0].old_confidence, Confidence::High);
    assert_eq!(decay_events[0].new_confidence, Confidence::Medium);
}

#[tokio::test]
async fn knowledge_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge-base.json");

    {
        let engine = Acquisition::builder()
            .with_http(Arc::new(MockHttpClient::with_routes(&[(
                "https://dev.to/api/articles/alice/hello",
                fixtures::DEVTO_ARTICLE_JSON,
            )])))
            .with_store_path(&path)
            .build()
            .await
            .unwrap();

        let result = engine
            .fetch_content("https://dev.to/alice/hello", &FetchOptions::default())
            .await;
        assert!(result.is_ok());
        engine.flush().await;
    }

    let reloaded = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::new()))
        .with_store_path(&path)
        .build()
        .await
        .unwrap();

    let entry = reloaded.learning().store().entry("dev.to").unwrap();
    assert_eq!(entry.api_patterns.len(), 1);
    assert_eq!(
        entry.api_patterns[0].endpoint,
        "https://dev.to/api/articles/alice/hello"
    );
}

#[tokio::test]
async fn sticky_rate_limiting_refuses_before_any_tier() {
    let engine = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::with_routes(&[(
            "https://example.com/article",
            fixtures::ARTICLE_HTML,
        )])))
        .build()
        .await
        .unwrap();

    for _ in 0..3 {
        engine
            .learning()
            .record_failure("example.com", FailureContext::new(FailureType::RateLimited));
    }

    let result = engine
        .fetch_content("https://example.com/article", &FetchOptions::default())
        .await;

    assert!(!result.is_ok());
    assert!(result
        .result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("rate limited"));
    assert!(result.tiers_attempted.is_empty());
}

#[tokio::test]
async fn cancellation_returns_timeout_and_records_nothing() {
    use tokio_util::sync::CancellationToken;

    let engine = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::with_routes(&[(
            "https://example.com/article",
            fixtures::ARTICLE_HTML,
        )])))
        .build()
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let result = engine
        .orchestrator()
        .fetch_with_cancellation(
            "https://example.com/article",
            &FetchOptions::default(),
            &token,
        )
        .await;

    assert!(!result.is_ok());
    assert!(result
        .result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("timeout"));
    // Nothing learned for a cancelled request
    assert!(engine.orchestrator().preference("example.com").is_none());
    assert!(engine.learning().store().entry("example.com").is_none());
}

#[tokio::test]
async fn selector_learned_from_static_success() {
    let engine = Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::with_routes(&[(
            "https://example.com/article",
            fixtures::ARTICLE_HTML,
        )])))
        .build()
        .await
        .unwrap();

    let result = engine
        .fetch_content("https://example.com/article", &FetchOptions::default())
        .await;
    assert!(result.is_ok());

    // The fixture's content region sits under <main>, and the region
    // selector that worked is learned for the domain
    let chain = engine.learning().get_selector_chain("example.com", "article");
    assert!(chain.iter().any(|s| s.selector == "main"));
}
