//! # Acquisition
//!
//! A tiered web-content acquisition engine: extracts clean, structured
//! content from arbitrary URLs without reaching for a full headless
//! browser unless nothing cheaper works, and learns per-domain what
//! worked so the next fetch is cheaper.
//!
//! ## Architecture
//!
//! ```text
//! fetch_content(url)
//!   └─ Orchestrator ── consults learned tier preference
//!        ├─ Tier 1: intelligence  (site APIs, framework data,
//!        │                         structured data, static parse)
//!        ├─ Tier 2: lightweight   (sandboxed JS + static parse)
//!        └─ Tier 3: browser       (external driver)
//!             each tier → strategy chain → content validator
//!   success → record tier preference, learn API patterns,
//!             selectors, validators
//!   failure → record typed failure, demote patterns,
//!             persist anti-patterns
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use acquisition::{Acquisition, FetchOptions};
//!
//! let engine = Acquisition::builder()
//!     .with_store_path("./knowledge-base.json")
//!     .build()
//!     .await?;
//!
//! let result = engine
//!     .fetch_content("https://example.com/article", &FetchOptions::default())
//!     .await;
//!
//! println!("{} via {}", result.result.content.title, result.tier);
//! println!("{}", result.result.content.markdown);
//! ```
//!
//! ## Modules
//!
//! - [`orchestrator`] - The three-tier cascade with budget enforcement
//! - [`pipeline`] - The ordered extraction-strategy chain
//! - [`strategies`] - Site APIs, framework data, structured data,
//!   static parse, sandbox render, browser
//! - [`sandbox`] - Isolated JS execution with a mock DOM and a strict
//!   capability whitelist
//! - [`learning`] - Per-domain knowledge: patterns, selectors,
//!   validators, failures, decay, transfer, semantic retrieval
//! - [`http`] - Fetch wrapper, cookie jar, SSRF validation
//! - [`anomaly`] - Universal challenge/error/empty-page classifier
//! - [`testing`] - Deterministic mocks and fixtures

pub mod anomaly;
pub mod error;
pub mod http;
pub mod learning;
pub mod orchestrator;
pub mod pipeline;
pub mod sandbox;
pub mod strategies;
pub mod testing;
pub mod types;
pub mod validator;

use std::path::PathBuf;
use std::sync::Arc;

// Re-export the core surface at the crate root
pub use anomaly::{AnomalyDetector, AnomalyInput, AnomalyReport, AnomalyType, SuggestedAction};
pub use error::{FetchError, HttpError, SandboxError, SecurityError, StoreError};
pub use http::{CookieJar, FetchResponse, HttpClient, HttpConfig, HttpFetch, RequestOptions, UrlValidator};
pub use learning::{
    EmbeddingProvider, KnowledgeStore, LearnSource, LearningEngine, MatchKind, MemoryVectorStore,
    PatternMatch, PatternVectorStore, SemanticPatternMatcher,
};
pub use orchestrator::Orchestrator;
pub use pipeline::{ContentPipeline, ExtractionEvent};
pub use sandbox::{SandboxCapabilities, SandboxConfig, SandboxOutcome, SandboxRuntime};
pub use strategies::{BrowserDriver, Strategy, StrategyContext, StrategyHit};
pub use types::{
    AntiPattern, ApiPattern, Confidence, ContentResult, DomainEntry, DomainGroup,
    DomainGroupConfig, ExtractOptions, ExtractedContent, FailureCategory, FailureContext,
    FailureType, FetchBudget, FetchOptions, Freshness, LearningConfig, ResultMeta, SelectorPattern,
    Tier, TierPreference, TieredFetchResult,
};
pub use validator::ContentValidator;

/// The assembled engine: one facade over the orchestrator, pipeline,
/// and learning engine.
pub struct Acquisition {
    orchestrator: Arc<Orchestrator>,
}

impl Acquisition {
    pub fn builder() -> AcquisitionBuilder {
        AcquisitionBuilder::default()
    }

    /// Tiered fetch: the primary entry point.
    pub async fn fetch_content(&self, url: &str, options: &FetchOptions) -> TieredFetchResult {
        self.orchestrator.fetch(url, options).await
    }

    /// Pipeline-level extraction without the tier cascade.
    pub async fn extract_content(&self, url: &str, options: &ExtractOptions) -> ContentResult {
        self.orchestrator.extract_content(url, options).await
    }

    /// Subscribe to extraction-success events (`api:*` strategies).
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExtractionEvent> {
        self.orchestrator.pipeline().subscribe()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn learning(&self) -> &Arc<LearningEngine> {
        self.orchestrator.learning()
    }

    /// Force a knowledge-base write (shutdown hygiene; normal writes
    /// are debounced).
    pub async fn flush(&self) {
        self.learning().store().flush().await;
    }
}

/// Wires the engine together. Every seam is overridable: transport,
/// browser driver, semantic matcher, store location.
pub struct AcquisitionBuilder {
    store_path: Option<PathBuf>,
    http: Option<Arc<dyn HttpFetch>>,
    browser: Option<Arc<dyn BrowserDriver>>,
    semantic: Option<Arc<SemanticPatternMatcher>>,
    groups: DomainGroupConfig,
    learning_config: LearningConfig,
    http_config: HttpConfig,
    sandbox_config: SandboxConfig,
}

impl Default for AcquisitionBuilder {
    fn default() -> Self {
        Self {
            store_path: None,
            http: None,
            browser: None,
            semantic: None,
            groups: DomainGroupConfig::default(),
            learning_config: LearningConfig::default(),
            http_config: HttpConfig::default(),
            sandbox_config: SandboxConfig::default(),
        }
    }
}

impl AcquisitionBuilder {
    /// Persist the knowledge base at this path. Without it the engine
    /// learns in memory only.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Replace the transport (tests use the mock client).
    pub fn with_http(mut self, http: Arc<dyn HttpFetch>) -> Self {
        self.http = Some(http);
        self
    }

    /// Attach the external headless-browser driver.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserDriver>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Attach the optional semantic pattern matcher.
    pub fn with_semantic_matcher(mut self, matcher: Arc<SemanticPatternMatcher>) -> Self {
        self.semantic = Some(matcher);
        self
    }

    pub fn with_domain_groups(mut self, groups: DomainGroupConfig) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_learning_config(mut self, config: LearningConfig) -> Self {
        self.learning_config = config;
        self
    }

    pub fn with_http_config(mut self, config: HttpConfig) -> Self {
        self.http_config = config;
        self
    }

    pub fn with_sandbox_config(mut self, config: SandboxConfig) -> Self {
        self.sandbox_config = config;
        self
    }

    pub async fn build(self) -> Result<Acquisition, HttpError> {
        let jar = CookieJar::new();

        let http: Arc<dyn HttpFetch> = match self.http {
            Some(http) => http,
            None => Arc::new(HttpClient::with_config(
                jar.clone(),
                self.http_config,
                UrlValidator::new(),
            )?),
        };

        let store = match self.store_path {
            Some(path) => KnowledgeStore::open(path).await,
            None => KnowledgeStore::in_memory(),
        };

        let mut learning = LearningEngine::new(store)
            .with_config(self.learning_config)
            .with_groups(self.groups);
        if let Some(matcher) = self.semantic {
            learning = learning.with_semantic_matcher(matcher);
        }
        let learning = Arc::new(learning);

        // Patterns decay on load, before anything consults them
        learning.apply_confidence_decay();

        let sandbox = Arc::new(
            SandboxRuntime::new(Arc::clone(&http), jar.clone())
                .with_config(self.sandbox_config),
        );

        let pipeline = Arc::new(ContentPipeline::new(
            http,
            jar,
            sandbox,
            self.browser,
            Arc::clone(&learning),
        ));

        Ok(Acquisition {
            orchestrator: Arc::new(Orchestrator::new(pipeline, learning)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHttpClient;

    #[tokio::test]
    async fn test_builder_assembles_in_memory_engine() {
        let engine = Acquisition::builder()
            .with_http(Arc::new(MockHttpClient::new()))
            .build()
            .await
            .unwrap();

        assert_eq!(engine.learning().store().entry_count(), 0);
    }

    #[tokio::test]
    async fn test_extract_content_bypasses_the_cascade() {
        let engine = Acquisition::builder()
            .with_http(Arc::new(MockHttpClient::with_routes(&[(
                "https://example.com/article",
                crate::testing::fixtures::ARTICLE_HTML,
            )])))
            .build()
            .await
            .unwrap();

        let result = engine
            .extract_content("https://example.com/article", &ExtractOptions::default())
            .await;

        assert!(result.is_ok());
        assert_eq!(result.meta.strategy, "static");
    }
}
