//! Options for extraction and tiered fetching, plus learning tunables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::tier::Tier;

/// Default minimum content length for non-API strategies, characters.
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 500;

/// Freshness requirement for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Realtime,
    Any,
}

/// Options for a single pipeline extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Run only this strategy; on failure return its error
    pub force_strategy: Option<String>,

    /// Strategies to skip (by name)
    pub skip_strategies: Vec<String>,

    /// Minimum acceptable plain-text length
    pub min_content_length: usize,

    /// Allow the browser strategy at the end of the chain
    pub allow_browser: bool,

    /// How long the sandbox waits for queued async work, milliseconds
    pub async_wait_time_ms: Option<u64>,

    /// Cookies to seed the request with (name → value)
    pub cookies: HashMap<String, String>,

    /// Topic hint forwarded to the anomaly detector
    pub expected_topic: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            force_strategy: None,
            skip_strategies: Vec::new(),
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            allow_browser: false,
            async_wait_time_ms: None,
            cookies: HashMap::new(),
            expected_topic: None,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.force_strategy = Some(strategy.into());
        self
    }

    pub fn skip_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.skip_strategies.push(strategy.into());
        self
    }

    pub fn with_min_content_length(mut self, length: usize) -> Self {
        self.min_content_length = length;
        self
    }

    pub fn with_allow_browser(mut self, allow: bool) -> Self {
        self.allow_browser = allow;
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_expected_topic(mut self, topic: impl Into<String>) -> Self {
        self.expected_topic = Some(topic.into());
        self
    }
}

/// Options for a tiered fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Pin the cascade to a single tier. Accepts the legacy `"static"`
    /// alias via [`Tier::parse`].
    pub force_tier: Option<Tier>,

    pub min_content_length: usize,

    /// Allow the browser tier
    pub allow_browser: bool,

    /// Record successes/failures into the learning engine
    pub enable_learning: bool,

    /// Consult the per-host rate limiter before fetching
    pub use_rate_limiting: bool,

    /// Total latency budget; once exceeded, no further tier starts
    pub max_latency_ms: Option<u64>,

    /// Most expensive tier the cascade may reach
    pub max_cost_tier: Option<Tier>,

    pub freshness: Option<Freshness>,

    /// Topic hint forwarded to extraction
    pub expected_topic: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force_tier: None,
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            allow_browser: true,
            enable_learning: true,
            use_rate_limiting: true,
            max_latency_ms: None,
            max_cost_tier: None,
            freshness: None,
            expected_topic: None,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force_tier(mut self, tier: Tier) -> Self {
        self.force_tier = Some(tier);
        self
    }

    pub fn with_min_content_length(mut self, length: usize) -> Self {
        self.min_content_length = length;
        self
    }

    pub fn with_allow_browser(mut self, allow: bool) -> Self {
        self.allow_browser = allow;
        self
    }

    pub fn with_learning(mut self, enabled: bool) -> Self {
        self.enable_learning = enabled;
        self
    }

    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.use_rate_limiting = enabled;
        self
    }

    pub fn with_max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    pub fn with_max_cost_tier(mut self, tier: Tier) -> Self {
        self.max_cost_tier = Some(tier);
        self
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = Some(freshness);
        self
    }
}

/// Tunables for the learning engine. Decay, demotion, and selector
/// constants live here rather than as magic numbers at the call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningConfig {
    /// Days a pattern may go unverified before decay applies
    pub decay_grace_period_days: i64,

    /// Numeric confidence lost per elapsed week past the grace period
    pub decay_rate_per_week: f64,

    /// Numeric confidence floor for decay
    pub decay_floor: f64,

    /// Cumulative failures before a high-confidence pattern demotes
    pub demote_high_after_failures: u32,

    /// Cumulative failures before a medium-confidence pattern demotes
    pub demote_medium_after_failures: u32,

    /// Priority added to a selector on success (capped at 100).
    /// Asymmetric with the failure penalty; reproduced from observed
    /// behavior.
    pub selector_success_bump: u8,

    /// Priority removed from a selector on failure (floored at 0)
    pub selector_failure_penalty: u8,

    /// EMA smoothing factor for success-profile averages
    pub ema_alpha: f64,

    /// Success-rate reduction applied per recorded failure
    pub failure_rate_step: f64,

    /// Failure threshold for severe categories in pattern-failure feedback
    pub severe_pattern_failure_threshold: u32,

    /// Failure threshold for other categories in pattern-failure feedback
    pub pattern_failure_threshold: u32,

    /// Minimum similarity for semantic pattern matches
    pub semantic_min_similarity: f32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            decay_grace_period_days: 14,
            decay_rate_per_week: 0.1,
            decay_floor: 0.3,
            demote_high_after_failures: 3,
            demote_medium_after_failures: 5,
            selector_success_bump: 1,
            selector_failure_penalty: 5,
            ema_alpha: 0.3,
            failure_rate_step: 0.05,
            severe_pattern_failure_threshold: 2,
            pattern_failure_threshold: 5,
            semantic_min_similarity: 0.75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_options_builder() {
        let options = FetchOptions::new()
            .with_force_tier(Tier::Lightweight)
            .with_max_latency_ms(5_000)
            .with_max_cost_tier(Tier::Lightweight)
            .with_learning(false);

        assert_eq!(options.force_tier, Some(Tier::Lightweight));
        assert_eq!(options.max_latency_ms, Some(5_000));
        assert_eq!(options.max_cost_tier, Some(Tier::Lightweight));
        assert!(!options.enable_learning);
        assert_eq!(options.min_content_length, DEFAULT_MIN_CONTENT_LENGTH);
    }

    #[test]
    fn test_extract_options_builder() {
        let options = ExtractOptions::new()
            .with_force_strategy("api:devto")
            .skip_strategy("framework:nextjs")
            .with_cookie("session", "abc");

        assert_eq!(options.force_strategy.as_deref(), Some("api:devto"));
        assert_eq!(options.skip_strategies, vec!["framework:nextjs".to_string()]);
        assert_eq!(options.cookies.get("session").map(String::as_str), Some("abc"));
    }
}
