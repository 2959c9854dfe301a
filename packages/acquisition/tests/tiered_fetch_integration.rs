//! End-to-end cascade scenarios over the mock transport: tier
//! selection, fallback, budget enforcement, and the anti-bot
//! short-circuit.

use std::sync::Arc;

use acquisition::testing::{fixtures, MockBrowser, MockHttpClient};
use acquisition::{Acquisition, FetchOptions, SandboxRuntime, Tier};

async fn engine_with(routes: &[(&str, &str)]) -> Acquisition {
    Acquisition::builder()
        .with_http(Arc::new(MockHttpClient::with_routes(routes)))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_intelligence_path() {
    // S1: a server-rendered article succeeds on the first tier
    let engine = engine_with(&[("https://example.com/article", fixtures::ARTICLE_HTML)]).await;

    let result = engine
        .fetch_content("https://example.com/article", &FetchOptions::default())
        .await;

    assert!(result.is_ok(), "error: {:?}", result.result.error);
    assert_eq!(result.tier, Tier::Intelligence);
    assert_eq!(result.tiers_attempted, vec![Tier::Intelligence]);
    assert!(!result.fell_back);
    assert!(result.result.content.text.chars().count() >= 500);
    assert!(!result.budget.used_cache);
}

#[tokio::test]
async fn spa_falls_back_to_sandbox() {
    // S2: an empty shell page only renders via sandboxed JS
    let engine = engine_with(&[("https://spa.example/", fixtures::SPA_HTML)]).await;

    let result = engine
        .fetch_content("https://spa.example/", &FetchOptions::default())
        .await;

    assert!(result.is_ok(), "error: {:?}", result.result.error);
    assert_eq!(
        result.tiers_attempted,
        vec![Tier::Intelligence, Tier::Lightweight]
    );
    assert_eq!(result.tier, Tier::Lightweight);
    assert!(result.fell_back);
    assert!(result.result.content.text.chars().count() >= 500);
}

#[tokio::test]
async fn anti_bot_page_short_circuits_to_browser() {
    // S3: challenge markers bypass the sandbox and reach the browser
    let http = Arc::new(MockHttpClient::with_routes(&[(
        "https://guarded.example/",
        fixtures::CF_CHALLENGE_HTML,
    )]));
    let browser = Arc::new(MockBrowser::new());
    browser.page("https://guarded.example/", fixtures::BROWSER_RENDERED_HTML);

    let engine = Acquisition::builder()
        .with_http(http)
        .with_browser(browser.clone())
        .build()
        .await
        .unwrap();

    let result = engine
        .fetch_content("https://guarded.example/", &FetchOptions::default())
        .await;

    assert!(result.is_ok(), "error: {:?}", result.result.error);
    assert_eq!(result.tier, Tier::Browser);
    assert_eq!(
        result.tiers_attempted,
        vec![Tier::Intelligence, Tier::Lightweight, Tier::Browser]
    );
    assert!(result.fell_back);
    assert_eq!(browser.calls().len(), 1);
}

#[tokio::test]
async fn sandbox_preclassification_runs_no_scripts() {
    // S3 detail: the sandbox itself refuses challenge pages untouched
    let http: Arc<dyn acquisition::HttpFetch> = Arc::new(MockHttpClient::new());
    let sandbox = SandboxRuntime::new(http, acquisition::CookieJar::new());

    let outcome = sandbox
        .render("https://guarded.example/", fixtures::CF_CHALLENGE_HTML, None)
        .await
        .unwrap();

    assert!(outcome.needs_full_browser);
    assert_eq!(outcome.scripts_executed, 0);
    assert!(outcome.script_errors.is_empty());
}

#[tokio::test]
async fn forced_tier_failure_learns_nothing() {
    // S4: a forced lightweight run that fails stays on one tier
    let engine = engine_with(&[("https://spa.example/empty", "<html><body></body></html>")]).await;

    let options = FetchOptions::new().with_force_tier(Tier::Lightweight);
    let result = engine
        .fetch_content("https://spa.example/empty", &options)
        .await;

    assert!(!result.is_ok());
    assert!(result.result.error.is_some());
    assert_eq!(result.tiers_attempted, vec![Tier::Lightweight]);
    assert!(!result.fell_back);
    assert_eq!(result.tier_reason, "forced");

    // No preference recorded for forced runs
    assert!(engine.orchestrator().preference("spa.example").is_none());
}

#[tokio::test]
async fn max_cost_tier_skips_expensive_tiers() {
    // S7: the cost ceiling stops the cascade after intelligence
    let engine =
        engine_with(&[("https://thin.example/", "<html><body><p>tiny</p></body></html>")]).await;

    let options = FetchOptions::new().with_max_cost_tier(Tier::Intelligence);
    let result = engine.fetch_content("https://thin.example/", &options).await;

    assert!(!result.is_ok());
    assert_eq!(result.tiers_attempted, vec![Tier::Intelligence]);

    let skipped: Vec<Tier> = result.budget.tiers_skipped.iter().map(|s| s.tier).collect();
    assert_eq!(skipped, vec![Tier::Lightweight, Tier::Browser]);
    assert_eq!(result.budget.max_cost_tier_enforced, Some(Tier::Intelligence));
}

#[tokio::test]
async fn latency_budget_blocks_further_tiers() {
    // 20 ms per request against a 5 ms budget: the first tier always
    // exhausts it
    let http = MockHttpClient::with_routes(&[(
        "https://thin.example/",
        "<html><body><p>tiny</p></body></html>",
    )])
    .with_latency(std::time::Duration::from_millis(20));
    let engine = Acquisition::builder()
        .with_http(Arc::new(http))
        .build()
        .await
        .unwrap();

    let options = FetchOptions::new()
        .with_max_latency_ms(5)
        .with_allow_browser(false);
    let result = engine.fetch_content("https://thin.example/", &options).await;

    assert!(!result.is_ok());
    assert!(result.budget.latency_exceeded);
    assert_eq!(result.tiers_attempted, vec![Tier::Intelligence]);
}

#[tokio::test]
async fn browser_disallowed_is_recorded() {
    let engine = engine_with(&[("https://spa.example/broken", "<html><body><div id=\"x\">nope</div></body></html>")]).await;

    let options = FetchOptions::new().with_allow_browser(false);
    let result = engine
        .fetch_content("https://spa.example/broken", &options)
        .await;

    assert!(!result.is_ok());
    assert_eq!(
        result.tiers_attempted,
        vec![Tier::Intelligence, Tier::Lightweight]
    );
    assert!(result
        .budget
        .tiers_skipped
        .iter()
        .any(|s| s.tier == Tier::Browser && s.reason.contains("disallowed")));
}

#[tokio::test]
async fn forced_static_alias_maps_to_intelligence() {
    let engine = engine_with(&[("https://example.com/article", fixtures::ARTICLE_HTML)]).await;

    let tier = Tier::parse("static").unwrap();
    let options = FetchOptions::new().with_force_tier(tier);
    let result = engine
        .fetch_content("https://example.com/article", &options)
        .await;

    assert!(result.is_ok());
    assert_eq!(result.tiers_attempted, vec![Tier::Intelligence]);
    assert!(!result.fell_back);
}
