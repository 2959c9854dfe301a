//! Content intelligence pipeline: the ordered strategy chain.
//!
//! Walks the fixed chain, validates every candidate, returns the first
//! result that passes, and emits extraction-success events for `api:*`
//! strategies so the learning engine can promote API patterns.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crate::anomaly::{AnomalyDetector, AnomalyInput, AnomalyType};
use crate::http::{CookieJar, HttpFetch, RequestOptions};
use crate::learning::LearningEngine;
use crate::sandbox::SandboxRuntime;
use crate::strategies::{
    default_chain, BrowserDriver, Strategy, StrategyContext,
};
use crate::types::config::ExtractOptions;
use crate::types::content::{ContentResult, ResultMeta};
use crate::types::domain::normalize_domain;
use crate::validator::{ContentValidator, ValidationInput};

/// Content-type tag under which region selectors are learned.
pub const CONTENT_TYPE_ARTICLE: &str = "article";

/// Bounded fan-out buffer for extraction-success events. Slow
/// observers lag and drop the oldest events; they never stall the
/// pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Emitted for every `api:*` strategy result that validates.
#[derive(Debug, Clone)]
pub struct ExtractionEvent {
    pub source_url: String,
    pub api_url: String,
    pub strategy: String,
    pub content: crate::types::content::ExtractedContent,
}

pub struct ContentPipeline {
    chain: Vec<Arc<dyn Strategy>>,
    http: Arc<dyn HttpFetch>,
    jar: CookieJar,
    sandbox: Arc<SandboxRuntime>,
    browser: Option<Arc<dyn BrowserDriver>>,
    validator: ContentValidator,
    anomaly: AnomalyDetector,
    learning: Arc<LearningEngine>,
    events: broadcast::Sender<ExtractionEvent>,
}

impl ContentPipeline {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        jar: CookieJar,
        sandbox: Arc<SandboxRuntime>,
        browser: Option<Arc<dyn BrowserDriver>>,
        learning: Arc<LearningEngine>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            chain: default_chain(),
            http,
            jar,
            sandbox,
            browser,
            validator: ContentValidator::new(),
            anomaly: AnomalyDetector::new(),
            learning,
            events,
        }
    }

    /// Replace the strategy chain (tests).
    pub fn with_chain(mut self, chain: Vec<Arc<dyn Strategy>>) -> Self {
        self.chain = chain;
        self
    }

    /// Subscribe to extraction-success events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
        self.events.subscribe()
    }

    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    /// Run the chain for one URL.
    pub async fn extract(&self, url: &str, options: &ExtractOptions) -> ContentResult {
        let started = Instant::now();
        let mut meta = ResultMeta::new(url);

        let Ok(parsed) = Url::parse(url) else {
            return ContentResult::failed(meta, format!("invalid URL: {url}"));
        };
        let domain = normalize_domain(&parsed).unwrap_or_default();

        // Seed caller cookies so every strategy (and the sandbox)
        // shares session state
        if let Some(host) = parsed.host_str() {
            for (name, value) in &options.cookies {
                self.jar.insert(host, name, value);
            }
        }

        let mut warnings: Vec<String> = Vec::new();

        // One page fetch shared by all document-shaped strategies.
        // API-forced runs skip it: the strategy talks to the API
        // directly.
        let force_is_api = options
            .force_strategy
            .as_deref()
            .map(|s| s.starts_with("api:"))
            .unwrap_or(false);
        let html = if force_is_api {
            String::new()
        } else {
            match self.http.fetch(url, &RequestOptions::new()).await {
                Ok(response) => {
                    if !response.is_success() {
                        warnings.push(format!("page fetch returned HTTP {}", response.status));
                    }
                    if response.final_url != url {
                        meta.final_url = response.final_url.clone();
                    }
                    response.body_text
                }
                Err(e) => {
                    warnings.push(format!("page fetch failed: {e}"));
                    String::new()
                }
            }
        };

        // Universal anomaly classification on the raw page; the
        // verdict rides along as a warning so the orchestrator can
        // type the failure if every strategy comes up empty
        if !html.is_empty() {
            let report = self.anomaly.detect(&AnomalyInput {
                html: &html,
                url,
                expected_topic: options.expected_topic.as_deref(),
            });
            if report.is_anomaly {
                warnings.push(describe_anomaly(&report));
            }
        }

        let ctx = StrategyContext {
            http: Arc::clone(&self.http),
            sandbox: Arc::clone(&self.sandbox),
            browser: self.browser.clone(),
            learned_selectors: self.learning.get_selector_chain(&domain, CONTENT_TYPE_ARTICLE),
            min_content_length: options.min_content_length,
            async_wait_time_ms: options.async_wait_time_ms,
        };

        for strategy in &self.chain {
            let name = strategy.name();

            if let Some(forced) = options.force_strategy.as_deref() {
                if name != forced {
                    continue;
                }
            } else {
                if options.skip_strategies.iter().any(|s| s == name) {
                    continue;
                }
                if name == "browser" && !options.allow_browser {
                    continue;
                }
            }

            meta.strategies_attempted.push(name.to_string());

            let outcome = strategy.extract(&parsed, &html, &ctx).await;
            let hit = match outcome {
                Err(e) => {
                    warn!(url = %url, strategy = name, error = %e, "strategy failed");
                    warnings.push(format!("{name}: {e}"));
                    continue;
                }
                Ok(None) => {
                    debug!(url = %url, strategy = name, "strategy not applicable");
                    continue;
                }
                Ok(Some(hit)) => hit,
            };

            let min_length = strategy.min_content_length(options.min_content_length);
            let learned = self.learning.get_validators(&domain, url);
            let verdict = self.validator.validate(&ValidationInput {
                text: &hit.content.text,
                url,
                min_content_length: min_length,
                learned: &learned,
            });

            if let Err(reason) = verdict {
                debug!(url = %url, strategy = name, reason = %reason, "candidate rejected");
                warnings.push(format!("{name}: {reason}"));
                continue;
            }
            if !learned.is_empty() {
                self.learning.record_validator_outcome(&domain, url, true);
            }

            meta.strategy = name.to_string();
            meta.confidence = strategy.confidence();
            meta.timing_ms = started.elapsed().as_millis() as u64;
            meta.selector_used = hit.selector_used.clone();
            if let Some(final_url) = &hit.final_url {
                meta.final_url = final_url.clone();
            }

            if name.starts_with("api:") {
                // Fan out; lagging observers drop oldest, never block
                let _ = self.events.send(ExtractionEvent {
                    source_url: url.to_string(),
                    api_url: meta.final_url.clone(),
                    strategy: name.to_string(),
                    content: hit.content.clone(),
                });
            }

            debug!(
                url = %url,
                strategy = name,
                timing_ms = meta.timing_ms,
                "extraction succeeded"
            );
            let mut result = ContentResult::ok(hit.content, meta);
            result.warnings = warnings;
            return result;
        }

        // Nothing matched (or the forced strategy failed)
        if let Some(forced) = options.force_strategy.as_deref() {
            meta.strategy = forced.to_string();
            if meta.strategies_attempted.is_empty() {
                meta.strategies_attempted.push(forced.to_string());
                warnings.push(format!("unknown strategy: {forced}"));
            }
        }
        meta.timing_ms = started.elapsed().as_millis() as u64;

        let error = if options.force_strategy.is_some() {
            format!(
                "forced strategy {} failed",
                options.force_strategy.as_deref().unwrap_or_default()
            )
        } else {
            "all strategies failed".to_string()
        };
        let mut result = ContentResult::failed(meta, error);
        result.warnings = warnings;
        result
    }
}

fn describe_anomaly(report: &crate::anomaly::AnomalyReport) -> String {
    let label = match report.anomaly_type {
        Some(AnomalyType::ChallengePage) => "blocked by challenge page",
        Some(AnomalyType::Captcha) => "captcha required",
        Some(AnomalyType::RateLimited) => "rate limited by upstream",
        Some(AnomalyType::ErrorPage) => "upstream error page",
        Some(AnomalyType::EmptyContent) => "page body is empty",
        Some(AnomalyType::RedirectNotice) => "page is a redirect notice",
        None => "anomalous page",
    };
    format!("anomaly: {label} (confidence {:.2})", report.confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockHttpClient};
    use crate::learning::KnowledgeStore;

    fn pipeline_with(routes: &[(&str, &str)]) -> ContentPipeline {
        let http: Arc<dyn HttpFetch> = Arc::new(MockHttpClient::with_routes(routes));
        let jar = CookieJar::new();
        let sandbox = Arc::new(SandboxRuntime::new(Arc::clone(&http), jar.clone()));
        let learning = Arc::new(LearningEngine::new(KnowledgeStore::in_memory()));
        ContentPipeline::new(http, jar, sandbox, None, learning)
    }

    #[tokio::test]
    async fn test_static_article_extraction() {
        let pipeline = pipeline_with(&[("https://example.com/article", fixtures::ARTICLE_HTML)]);

        let result = pipeline
            .extract("https://example.com/article", &ExtractOptions::default())
            .await;

        assert!(result.is_ok(), "error: {:?}", result.error);
        assert_eq!(result.meta.strategy, "static");
        assert!(result.content.text.chars().count() >= 500);
        // The winning strategy appears in the attempted list exactly once
        assert_eq!(
            result
                .meta
                .strategies_attempted
                .iter()
                .filter(|s| s.as_str() == "static")
                .count(),
            1
        );
        // No strategy is attempted twice
        let mut names = result.meta.strategies_attempted.clone();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), result.meta.strategies_attempted.len());
    }

    #[tokio::test]
    async fn test_force_unknown_strategy_errors() {
        let pipeline = pipeline_with(&[]);
        let options = ExtractOptions::new().with_force_strategy("api:nonexistent");

        let result = pipeline.extract("https://example.com/", &options).await;

        assert!(!result.is_ok());
        assert_eq!(result.meta.strategy, "api:nonexistent");
        assert_eq!(result.meta.strategies_attempted, vec!["api:nonexistent"]);
    }

    #[tokio::test]
    async fn test_skip_strategies_respected() {
        let pipeline = pipeline_with(&[("https://example.com/article", fixtures::ARTICLE_HTML)]);
        let options = ExtractOptions::new()
            .skip_strategy("static")
            .skip_strategy("sandbox");

        let result = pipeline.extract("https://example.com/article", &options).await;

        assert!(!result
            .meta
            .strategies_attempted
            .iter()
            .any(|s| s == "static" || s == "sandbox"));
    }

    #[tokio::test]
    async fn test_api_event_emitted_for_devto() {
        let pipeline = pipeline_with(&[
            (
                "https://dev.to/api/articles/alice/hello",
                fixtures::DEVTO_ARTICLE_JSON,
            ),
            ("https://dev.to/alice/hello", "<html><body></body></html>"),
        ]);
        let mut events = pipeline.subscribe();

        let result = pipeline
            .extract("https://dev.to/alice/hello", &ExtractOptions::default())
            .await;

        assert!(result.is_ok(), "error: {:?}", result.error);
        assert_eq!(result.meta.strategy, "api:devto");
        assert_eq!(
            result.meta.final_url,
            "https://dev.to/api/articles/alice/hello"
        );

        let event = events.try_recv().unwrap();
        assert_eq!(event.strategy, "api:devto");
        assert_eq!(event.api_url, "https://dev.to/api/articles/alice/hello");
        assert_eq!(event.source_url, "https://dev.to/alice/hello");
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_warning_not_a_panic() {
        let http: Arc<dyn HttpFetch> = Arc::new(crate::testing::FailingHttpClient);
        let jar = CookieJar::new();
        let sandbox = Arc::new(SandboxRuntime::new(Arc::clone(&http), jar.clone()));
        let learning = Arc::new(LearningEngine::new(KnowledgeStore::in_memory()));
        let pipeline = ContentPipeline::new(http, jar, sandbox, None, learning);

        let result = pipeline
            .extract("https://dead.example/", &ExtractOptions::default())
            .await;

        assert!(!result.is_ok());
        assert!(result.warnings.iter().any(|w| w.contains("page fetch failed")));
    }

    #[tokio::test]
    async fn test_all_strategies_failed() {
        let pipeline = pipeline_with(&[(
            "https://example.com/thin",
            "<html><body><p>tiny</p></body></html>",
        )]);

        let result = pipeline
            .extract("https://example.com/thin", &ExtractOptions::default())
            .await;

        assert!(!result.is_ok());
        assert_eq!(result.error.as_deref(), Some("all strategies failed"));
        assert!(!result.meta.strategies_attempted.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("too short")));
    }
}
