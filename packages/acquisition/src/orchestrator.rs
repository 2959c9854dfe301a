//! Tiered fetch orchestration: the three-tier cascade with budget
//! enforcement and tier-preference learning.
//!
//! The orchestrator owns the tier-preference map (the learning engine
//! owns everything else) and consults a per-host rate limiter before
//! touching the network.

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::learning::{LearnSource, LearningEngine, SuccessSample};
use crate::pipeline::{ContentPipeline, CONTENT_TYPE_ARTICLE};
use crate::types::config::{ExtractOptions, FetchOptions, Freshness};
use crate::types::content::{ContentResult, ResultMeta};
use crate::types::domain::{normalize_domain, FailureContext, FailureType};
use crate::types::tier::{FetchBudget, Tier, TierPreference, TierSkip, TieredFetchResult};

/// Domains that never work without a real browser; they seed a
/// browser-tier preference.
const BROWSER_REQUIRED_DOMAINS: &[&str] = &[
    "twitter.com",
    "x.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "tiktok.com",
];

type HostLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub struct Orchestrator {
    pipeline: Arc<ContentPipeline>,
    learning: Arc<LearningEngine>,
    /// Owned here, never shared: per-call state per the redesign notes
    preferences: RwLock<HashMap<String, TierPreference>>,
    limiter: HostLimiter,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<ContentPipeline>, learning: Arc<LearningEngine>) -> Self {
        // 2 req/s sustained with a small burst per host
        let quota = Quota::per_second(nonzero!(2u32)).allow_burst(nonzero!(5u32));
        Self {
            pipeline,
            learning,
            preferences: RwLock::new(HashMap::new()),
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// The single entry point: run the cascade for one URL.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> TieredFetchResult {
        self.fetch_with_cancellation(url, options, &CancellationToken::new())
            .await
    }

    /// Cascade with cooperative cancellation: on cancel the result is
    /// a timeout error and nothing is recorded.
    pub async fn fetch_with_cancellation(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> TieredFetchResult {
        let started = Instant::now();
        let mut budget = FetchBudget {
            freshness_applied: match options.freshness {
                Some(Freshness::Realtime) => Some("realtime".to_string()),
                _ => None,
            },
            ..FetchBudget::default()
        };

        let Ok(parsed) = Url::parse(url) else {
            return failed_result(
                url,
                Tier::Intelligence,
                vec![],
                false,
                "invalid-url",
                budget,
                format!("invalid URL: {url}"),
            );
        };
        let domain = normalize_domain(&parsed).unwrap_or_default();

        if cancel.is_cancelled() {
            return failed_result(
                url, Tier::Intelligence, vec![], false, "cancelled", budget,
                "timeout: cancelled",
            );
        }

        // Rate limiting is a suspension (and cancellation) point
        if options.use_rate_limiting {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return failed_result(
                        url, Tier::Intelligence, vec![], false, "cancelled", budget,
                        "timeout: cancelled while waiting for rate limiter",
                    );
                }
                _ = self.limiter.until_key_ready(&domain) => {}
            }
        }

        // Sticky failures: recent auth/rate-limit/block trouble may
        // skip straight to the browser or refuse outright.
        let mut sticky_start: Option<Tier> = None;
        if options.force_tier.is_none() {
            let patterns = self.learning.get_failure_patterns(&domain);
            if patterns.should_backoff {
                match patterns.most_common_type {
                    Some(FailureType::Blocked) => {
                        if options.allow_browser && self.pipeline.has_browser() {
                            debug!(domain = %domain, "recent blocks: starting at browser tier");
                            sticky_start = Some(Tier::Browser);
                        } else {
                            return failed_result(
                                url, Tier::Intelligence, vec![], false, "sticky-blocked", budget,
                                "blocked: domain recently served anti-bot challenges",
                            );
                        }
                    }
                    Some(FailureType::RateLimited) => {
                        return failed_result(
                            url, Tier::Intelligence, vec![], false, "sticky-rate-limited", budget,
                            "rate limited: backing off for this domain",
                        );
                    }
                    Some(FailureType::AuthExpired) => {
                        return failed_result(
                            url, Tier::Intelligence, vec![], false, "sticky-auth", budget,
                            "authentication required: domain keeps rejecting credentials",
                        );
                    }
                    _ => {}
                }
            }
        }

        // Starting tier: forced ?? sticky ?? learned ?? heuristic
        let (mut tier, tier_reason) = match options.force_tier {
            Some(forced) => (forced, "forced".to_string()),
            None => match sticky_start {
                Some(tier) => (tier, "sticky-failures".to_string()),
                None => self.starting_tier(&domain, &parsed),
            },
        };

        // Clamp a non-forced start to the cost ceiling
        if options.force_tier.is_none() {
            if let Some(max) = options.max_cost_tier {
                if tier.rank() > max.rank() {
                    tier = max;
                    budget.max_cost_tier_enforced = Some(max);
                }
            }
        }
        let start_tier = tier;

        let mut tiers_attempted: Vec<Tier> = Vec::new();
        let mut last_result: Option<ContentResult> = None;
        let mut most_severe: Option<FetchError> = None;

        loop {
            tiers_attempted.push(tier);
            debug!(url = %url, tier = %tier, "running tier");

            let extract_options = tier_options(tier, options);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Cancellation records nothing
                    return failed_result(
                        url, tier, tiers_attempted, tier != start_tier, &tier_reason, budget,
                        "timeout: cancelled",
                    );
                }
                result = self.pipeline.extract(url, &extract_options) => result,
            };

            if result.is_ok() {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if options.enable_learning && options.force_tier.is_none() {
                    self.learn_from_success(&domain, tier, &result, elapsed_ms);
                }
                info!(
                    url = %url,
                    tier = %tier,
                    strategy = %result.meta.strategy,
                    elapsed_ms,
                    "fetch succeeded"
                );
                return TieredFetchResult {
                    result,
                    tier,
                    fell_back: tier != start_tier,
                    tier_reason,
                    tiers_attempted,
                    budget,
                };
            }

            let tier_error = classify_result_error(url, &result);
            most_severe = Some(match most_severe.take() {
                Some(seen) => seen.most_severe(tier_error),
                None => tier_error,
            });
            last_result = Some(result);

            // FALLBACK
            let Some(next) = tier.next() else {
                break;
            };

            // Forced tier never cascades
            if options.force_tier.is_some() {
                break;
            }

            // (a) cost ceiling
            if let Some(max) = options.max_cost_tier {
                if next.rank() > max.rank() {
                    budget.max_cost_tier_enforced = Some(max);
                    push_remaining_skips(&mut budget, next, "max cost tier enforced");
                    break;
                }
            }

            // (b) latency budget: strictly greater blocks the next tier
            if let Some(max_latency) = options.max_latency_ms {
                let elapsed = started.elapsed().as_millis() as u64;
                if elapsed > max_latency {
                    budget.latency_exceeded = true;
                    push_remaining_skips(&mut budget, next, "latency budget exceeded");
                    break;
                }
            }

            // (c) browser availability
            if next == Tier::Browser && (!options.allow_browser || !self.pipeline.has_browser()) {
                let reason = if options.allow_browser {
                    "browser unavailable"
                } else {
                    "browser disallowed"
                };
                push_remaining_skips(&mut budget, next, reason);
                break;
            }

            debug!(url = %url, from = %tier, to = %next, "falling back");
            tier = next;
        }

        // FAILED: surface the most severe failure observed across
        // tiers and record the typed failure
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut result = last_result.unwrap_or_else(|| {
            ContentResult::failed(ResultMeta::new(url), "no tier produced a result")
        });
        if let Some(error) = &most_severe {
            result.error = Some(error.to_string());
        }

        if options.enable_learning && options.force_tier.is_none() {
            self.learn_from_failure(&domain, start_tier, &result, most_severe.as_ref());
        }
        warn!(url = %url, tiers = tiers_attempted.len(), elapsed_ms, "all tiers failed");

        TieredFetchResult {
            tier: *tiers_attempted.last().unwrap_or(&start_tier),
            fell_back: tiers_attempted.len() > 1,
            tier_reason,
            tiers_attempted,
            budget,
            result,
        }
    }

    /// Pipeline-level extraction without the tier cascade.
    pub async fn extract_content(&self, url: &str, options: &ExtractOptions) -> ContentResult {
        self.pipeline.extract(url, options).await
    }

    pub fn pipeline(&self) -> &Arc<ContentPipeline> {
        &self.pipeline
    }

    pub fn learning(&self) -> &Arc<LearningEngine> {
        &self.learning
    }

    /// Current preference for a domain (tests and diagnostics).
    pub fn preference(&self, domain: &str) -> Option<TierPreference> {
        self.preferences.read().unwrap().get(domain).cloned()
    }

    /// Learned preference if trusted, else heuristics.
    fn starting_tier(&self, domain: &str, url: &Url) -> (Tier, String) {
        if let Some(preference) = self.preferences.read().unwrap().get(domain) {
            if preference.is_trusted(chrono::Utc::now()) {
                return (preference.preferred_tier, "learned".to_string());
            }
        }

        if BROWSER_REQUIRED_DOMAINS
            .iter()
            .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
        {
            // Seed the preference so the learned path takes over
            self.preferences
                .write()
                .unwrap()
                .entry(domain.to_string())
                .or_insert_with(|| TierPreference::new(domain, Tier::Browser));
            return (Tier::Browser, "heuristic:browser-required".to_string());
        }

        let docs_like = domain.ends_with(".gov")
            || domain.starts_with("docs.")
            || domain.starts_with("developer.")
            || url.path().starts_with("/docs");
        if docs_like {
            return (Tier::Intelligence, "heuristic:docs".to_string());
        }

        (Tier::Intelligence, "default".to_string())
    }

    fn learn_from_success(
        &self,
        domain: &str,
        tier: Tier,
        result: &ContentResult,
        elapsed_ms: u64,
    ) {
        const EMA_ALPHA: f64 = 0.3;

        // Tier preference, owned by the orchestrator
        {
            let mut preferences = self.preferences.write().unwrap();
            let preference = preferences
                .entry(domain.to_string())
                .or_insert_with(|| TierPreference::new(domain, tier));
            preference.preferred_tier = tier;
            preference.success_count += 1;
            preference.last_used = chrono::Utc::now();
            preference.avg_response_time_ms = if preference.avg_response_time_ms == 0.0 {
                elapsed_ms as f64
            } else {
                EMA_ALPHA * elapsed_ms as f64 + (1.0 - EMA_ALPHA) * preference.avg_response_time_ms
            };
        }

        let strategy = result.meta.strategy.as_str();
        self.learning.record_success(
            domain,
            SuccessSample {
                tier,
                strategy: strategy.to_string(),
                response_time_ms: elapsed_ms,
                content_length: result.content.text_len(),
                has_structured_data: strategy.starts_with("structured:")
                    || result.content.structured.is_some(),
                has_framework_data: strategy.starts_with("framework:"),
                has_bypassable_apis: strategy.starts_with("api:"),
            },
        );

        // API strategies teach a bypassable pattern keyed by the API
        // endpoint they hit
        if strategy.starts_with("api:") {
            self.learning.learn_api_pattern(
                domain,
                &result.meta.final_url,
                "GET",
                LearnSource::new("extraction-success").with_url(result.meta.url.clone()),
            );
        }

        if let Some(selector) = &result.meta.selector_used {
            self.learning
                .learn_selector(domain, selector, CONTENT_TYPE_ARTICLE, None);
        }

        self.learning
            .learn_validator(domain, &result.content.text, None);
    }

    fn learn_from_failure(
        &self,
        domain: &str,
        start_tier: Tier,
        result: &ContentResult,
        error: Option<&FetchError>,
    ) {
        {
            let mut preferences = self.preferences.write().unwrap();
            if let Some(preference) = preferences.get_mut(domain) {
                preference.failure_count += 1;
            } else {
                let mut preference = TierPreference::new(domain, start_tier);
                preference.failure_count = 1;
                preferences.insert(domain.to_string(), preference);
            }
        }

        let detail = result.error.clone().unwrap_or_default();
        let failure_type = match error {
            Some(error) => error.failure_type(),
            None => {
                let joined_warnings = result.warnings.join("; ");
                LearningEngine::classify_error(&format!("{detail}; {joined_warnings}"), None)
            }
        };
        self.learning.record_failure(
            domain,
            FailureContext::new(failure_type).with_message(detail),
        );
    }
}

/// Type a failed tier result from its error and warning trail, most
/// severe marker first.
fn classify_result_error(url: &str, result: &ContentResult) -> FetchError {
    let haystack = format!(
        "{} {}",
        result.error.clone().unwrap_or_default(),
        result.warnings.join(" ")
    )
    .to_ascii_lowercase();
    let url = url.to_string();

    if haystack.contains("captcha")
        || haystack.contains("challenge")
        || haystack.contains("blocked")
        || haystack.contains("cloudflare")
        || haystack.contains("full browser")
    {
        FetchError::Blocked { url }
    } else if haystack.contains("http 401") || haystack.contains("http 403") {
        FetchError::AuthRequired { url }
    } else if haystack.contains("http 429") || haystack.contains("rate limit") {
        FetchError::RateLimited { url }
    } else if let Some(status) = find_server_error_status(&haystack) {
        FetchError::ServerError { url, status }
    } else if haystack.contains("timeout") || haystack.contains("timed out") {
        FetchError::Timeout { url }
    } else if haystack.contains("http 404") || haystack.contains("not found") {
        FetchError::NotFound { url }
    } else if haystack.contains("too short")
        || haystack.contains("incomplete-content")
        || haystack.contains("missing")
        || haystack.contains("forbidden term")
    {
        FetchError::ValidationFailed {
            reason: result
                .error
                .clone()
                .unwrap_or_else(|| "content rejected".to_string()),
        }
    } else {
        FetchError::Unknown {
            message: result
                .error
                .clone()
                .unwrap_or_else(|| "all strategies failed".to_string()),
        }
    }
}

fn find_server_error_status(haystack: &str) -> Option<u16> {
    let index = haystack.find("http 5")?;
    haystack[index + 5..]
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<u16>().ok())
        .filter(|status| (500..600).contains(status))
}

/// Map a tier to pipeline options.
fn tier_options(tier: Tier, options: &FetchOptions) -> ExtractOptions {
    let mut extract = ExtractOptions {
        min_content_length: options.min_content_length,
        expected_topic: options.expected_topic.clone(),
        ..ExtractOptions::default()
    };
    match tier {
        Tier::Intelligence => {
            extract.skip_strategies = vec!["sandbox".to_string(), "browser".to_string()];
            extract.allow_browser = false;
        }
        Tier::Lightweight => {
            extract.force_strategy = Some("sandbox".to_string());
        }
        Tier::Browser => {
            extract.force_strategy = Some("browser".to_string());
            extract.allow_browser = true;
        }
    }
    extract
}

fn push_remaining_skips(budget: &mut FetchBudget, from: Tier, reason: &str) {
    let mut tier = Some(from);
    while let Some(current) = tier {
        budget.tiers_skipped.push(TierSkip {
            tier: current,
            reason: reason.to_string(),
        });
        tier = current.next();
    }
}

#[allow(clippy::too_many_arguments)]
fn failed_result(
    url: &str,
    tier: Tier,
    tiers_attempted: Vec<Tier>,
    fell_back: bool,
    tier_reason: &str,
    budget: FetchBudget,
    error: impl Into<String>,
) -> TieredFetchResult {
    TieredFetchResult {
        result: ContentResult::failed(ResultMeta::new(url), error),
        tier,
        tiers_attempted,
        fell_back,
        tier_reason: tier_reason.to_string(),
        budget,
    }
}
