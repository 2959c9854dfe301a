//! Extraction strategies - the ordered chain the pipeline walks.
//!
//! Each strategy is one attempt to turn a URL (and usually its HTML)
//! into clean content. Strategies are cheap to consult: every one is
//! gated by a URL-shape or document-shape test and returns `None`
//! quickly when it does not apply.
//!
//! Chain order is fixed: site APIs, framework data, structured data,
//! static parse, sandbox render, browser.

pub mod browser;
pub mod framework;
pub mod json_walk;
pub mod sandbox_render;
pub mod site_api;
pub mod static_parse;
pub mod structured;

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::sandbox::SandboxRuntime;
use crate::types::content::{Confidence, ExtractedContent};
use crate::types::domain::SelectorPattern;
use crate::http::HttpFetch;
pub use browser::{BrowserDriver, BrowserStrategy};
pub use sandbox_render::SandboxRenderStrategy;
pub use static_parse::StaticParseStrategy;

/// A successful strategy hit.
#[derive(Debug, Clone)]
pub struct StrategyHit {
    pub content: ExtractedContent,

    /// Where the content actually came from, when it differs from the
    /// page URL (API endpoints, post-redirect locations)
    pub final_url: Option<String>,

    /// The selector that located the content region, when one did;
    /// feeds selector learning after validation
    pub selector_used: Option<String>,
}

impl StrategyHit {
    pub fn new(content: ExtractedContent) -> Self {
        Self {
            content,
            final_url: None,
            selector_used: None,
        }
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }
}

/// `Ok(None)` = strategy does not apply or found nothing;
/// `Err` = the attempt blew up (the pipeline records a warning and
/// moves on - a strategy never aborts the chain).
pub type StrategyOutcome = Result<Option<StrategyHit>, String>;

/// Shared request context handed to every strategy.
pub struct StrategyContext {
    pub http: Arc<dyn HttpFetch>,
    pub sandbox: Arc<SandboxRuntime>,
    pub browser: Option<Arc<dyn BrowserDriver>>,

    /// Learned selector chain for this domain (priority-descending),
    /// applied by the static parser ahead of its own heuristics
    pub learned_selectors: Vec<SelectorPattern>,

    pub min_content_length: usize,
    pub async_wait_time_ms: Option<u64>,
}

/// One element of the extraction chain.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name recorded in `strategies_attempted` (e.g. `api:devto`).
    fn name(&self) -> &'static str;

    /// Confidence propagated into the result on success.
    fn confidence(&self) -> Confidence;

    /// Minimum content length this strategy's output must meet. API
    /// strategies override the default: a short API payload is still
    /// authoritative.
    fn min_content_length(&self, default: usize) -> usize {
        default
    }

    async fn extract(&self, url: &Url, html: &str, ctx: &StrategyContext) -> StrategyOutcome;
}

/// The fixed default chain, in order.
pub fn default_chain() -> Vec<Arc<dyn Strategy>> {
    let mut chain: Vec<Arc<dyn Strategy>> = Vec::new();
    chain.extend(site_api::site_api_strategies());
    chain.extend(framework::framework_strategies());
    chain.extend(structured::structured_strategies());
    chain.push(Arc::new(StaticParseStrategy::new()));
    chain.push(Arc::new(SandboxRenderStrategy::new()));
    chain.push(Arc::new(BrowserStrategy::new()));
    chain
}
