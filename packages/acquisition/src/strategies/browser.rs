//! Browser strategy: the external headless-browser collaborator.
//!
//! The engine never drives a browser itself; it asks a configured
//! [`BrowserDriver`] for rendered HTML and static-parses the result.
//! Only reached when everything cheaper has failed and the caller
//! allowed it.

use async_trait::async_trait;
use url::Url;

use crate::strategies::static_parse::parse_content;
use crate::strategies::{Strategy, StrategyContext, StrategyHit, StrategyOutcome};
use crate::types::content::{Confidence, ExtractedContent};

/// Interface to the external headless-browser driver.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Render a URL and return the final HTML.
    async fn render(&self, url: &str) -> Result<String, String>;

    /// Driver name for logging.
    fn name(&self) -> &str {
        "browser"
    }
}

pub struct BrowserStrategy;

impl BrowserStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BrowserStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        let Some(driver) = &ctx.browser else {
            // No driver configured: the strategy does not apply
            return Ok(None);
        };

        tracing::info!(url = %url, driver = driver.name(), "rendering with full browser");
        let rendered = driver
            .render(url.as_str())
            .await
            .map_err(|e| format!("browser render failed: {e}"))?;

        let learned: Vec<String> = ctx
            .learned_selectors
            .iter()
            .map(|s| s.selector.clone())
            .collect();
        let Some(parsed) = parse_content(&rendered, &learned) else {
            return Ok(None);
        };

        let content = ExtractedContent {
            title: parsed.title,
            text: parsed.text,
            markdown: parsed.markdown,
            structured: None,
        };
        let mut hit = StrategyHit::new(content);
        hit.selector_used = parsed.selector_used;
        Ok(Some(hit))
    }
}
