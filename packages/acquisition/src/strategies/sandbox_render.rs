//! Sandbox-render strategy: execute page scripts in the sandbox, then
//! re-run the static parser over the serialized DOM.
//!
//! This is the whole of the lightweight tier when invoked by the
//! orchestrator, and a late chain element otherwise.

use async_trait::async_trait;
use url::Url;

use crate::strategies::static_parse::parse_content;
use crate::strategies::{Strategy, StrategyContext, StrategyHit, StrategyOutcome};
use crate::types::content::{Confidence, ExtractedContent};

pub struct SandboxRenderStrategy;

impl SandboxRenderStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SandboxRenderStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for SandboxRenderStrategy {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, url: &Url, html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if html.trim().is_empty() {
            return Ok(None);
        }

        let outcome = ctx
            .sandbox
            .render(url.as_str(), html, ctx.async_wait_time_ms)
            .await
            .map_err(|e| format!("sandbox render failed: {e}"))?;

        if outcome.needs_full_browser {
            return Err("page requires a full browser (anti-bot challenge detected)".to_string());
        }

        if !outcome.script_errors.is_empty() {
            tracing::debug!(
                url = %url,
                errors = outcome.script_errors.len(),
                "sandbox collected script errors"
            );
        }

        let learned: Vec<String> = ctx
            .learned_selectors
            .iter()
            .map(|s| s.selector.clone())
            .collect();
        let Some(parsed) = parse_content(&outcome.html, &learned) else {
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
