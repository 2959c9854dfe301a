//! Per-domain knowledge types.
//!
//! A [`DomainEntry`] is everything the engine has learned about one
//! hostname. Entries are owned exclusively by the knowledge store;
//! other components refer to patterns by `(domain, index)` values,
//! never by live references.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::content::Confidence;
use crate::types::tier::Tier;

/// Normalize a URL's host into the domain key used throughout the
/// knowledge base: the lowercased hostname.
pub fn normalize_domain(url: &url::Url) -> Option<String> {
    url.host_str().map(|h| h.to_ascii_lowercase())
}

/// Immutable origin metadata attached to a learned pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// How the pattern was learned (e.g. "extraction-success", "openapi-probe")
    pub source: String,

    /// URL the pattern was learned from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Upstream pattern id, when transferred or imported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_pattern_id: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_seen: DateTime<Utc>,

    /// Verifications recorded at learn time (distinct from the pattern's
    /// running `verification_count`)
    pub verification_count: u32,

    /// Demotions and decay applied over the pattern's life, oldest first
    #[serde(default)]
    pub decay_events: Vec<DecayEvent>,
}

impl Provenance {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_url: None,
            source_pattern_id: None,
            first_seen: Utc::now(),
            verification_count: 0,
            decay_events: Vec::new(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_source_pattern_id(mut self, id: impl Into<String>) -> Self {
        self.source_pattern_id = Some(id.into());
        self
    }
}

/// A recorded confidence change. `old_confidence` always holds the
/// pre-change value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub old_confidence: Confidence,
    pub new_confidence: Confidence,
    pub reason: String,
}

/// A learned API endpoint that can serve content for a domain.
///
/// Unique within a domain by `(endpoint, method)`. The invariant
/// `can_bypass ⇔ confidence == High` is maintained by every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPattern {
    pub endpoint: String,
    pub method: String,
    pub confidence: Confidence,

    /// Whether this endpoint may be called directly instead of rendering
    /// the page. Mirrors `confidence == High`.
    pub can_bypass: bool,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_verified: DateTime<Utc>,

    pub verification_count: u32,
    pub failure_count: u32,

    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_failure: Option<DateTime<Utc>>,

    pub provenance: Provenance,
}

impl ApiPattern {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>, provenance: Provenance) -> Self {
        let now = Utc::now();
        Self {
            endpoint: endpoint.into(),
            method: method.into().to_ascii_uppercase(),
            confidence: Confidence::High,
            can_bypass: true,
            created_at: now,
            last_verified: now,
            verification_count: 1,
            failure_count: 0,
            last_failure: None,
            provenance,
        }
    }

    /// Set confidence and keep `can_bypass` in sync.
    pub fn set_confidence(&mut self, confidence: Confidence) {
        self.confidence = confidence;
        self.can_bypass = confidence == Confidence::High;
    }

    /// Matches a lookup key.
    pub fn matches(&self, endpoint: &str, method: &str) -> bool {
        self.endpoint == endpoint && self.method.eq_ignore_ascii_case(method)
    }
}

/// A CSS selector learned to locate a kind of content on a domain.
///
/// Within a chain, entries are kept sorted by `priority` descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorPattern {
    pub selector: String,
    pub content_type: String,

    /// 0–100; success bumps it, failure penalizes it
    pub priority: u8,

    pub success_count: u32,
    pub failure_count: u32,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_worked: DateTime<Utc>,

    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_failed: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
}

impl SelectorPattern {
    pub fn new(selector: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            content_type: content_type.into(),
            priority: 50,
            success_count: 0,
            failure_count: 0,
            last_worked: Utc::now(),
            last_failed: None,
            url_pattern: None,
        }
    }
}

/// A validator learned from content that previously passed for a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedValidator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    pub expected_min_length: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_max_length: Option<usize>,

    #[serde(default)]
    pub must_contain_any: Vec<String>,

    #[serde(default)]
    pub must_contain_all: Vec<String>,

    #[serde(default)]
    pub must_not_contain: Vec<String>,

    pub success_count: u32,
    pub failure_count: u32,
}

impl LearnedValidator {
    /// Whether this validator applies to the given URL.
    pub fn applies_to(&self, url: &str) -> bool {
        match &self.url_pattern {
            Some(pattern) => url.contains(pattern.as_str()),
            None => true,
        }
    }

    /// Check content against this validator.
    pub fn check(&self, text: &str) -> Result<(), String> {
        let len = text.chars().count();
        if len < self.expected_min_length {
            return Err(format!(
                "content length {} below learned minimum {}",
                len, self.expected_min_length
            ));
        }
        if let Some(max) = self.expected_max_length {
            if len > max {
                return Err(format!("content length {} above learned maximum {}", len, max));
            }
        }
        if !self.must_contain_any.is_empty()
            && !self.must_contain_any.iter().any(|w| text.contains(w.as_str()))
        {
            return Err("content missing all expected terms".to_string());
        }
        if let Some(missing) = self
            .must_contain_all
            .iter()
            .find(|w| !text.contains(w.as_str()))
        {
            return Err(format!("content missing required term: {missing}"));
        }
        if let Some(forbidden) = self
            .must_not_contain
            .iter()
            .find(|w| text.contains(w.as_str()))
        {
            return Err(format!("content contains forbidden term: {forbidden}"));
        }
        Ok(())
    }
}

/// The typed failure taxonomy recorded per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    AuthExpired,
    NotFound,
    RateLimited,
    ServerError,
    Timeout,
    Blocked,
    Unknown,
}

/// One recorded failure for a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    #[serde(rename = "type")]
    pub failure_type: FailureType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl FailureContext {
    pub fn new(failure_type: FailureType) -> Self {
        Self {
            failure_type,
            error_message: None,
            status_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

/// Rolling summary of what works for a domain.
///
/// Averages are exponential moving averages; the preferred tier is
/// monotonic and only moves toward cheaper tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessProfile {
    pub preferred_tier: Tier,
    pub preferred_strategy: String,
    pub avg_response_time_ms: f64,
    pub avg_content_length: f64,
    pub has_structured_data: bool,
    pub has_framework_data: bool,
    pub has_bypassable_apis: bool,
    pub sample_count: u32,
}

/// Observed content-change frequency for one URL base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPattern {
    pub url_base: String,
    pub min_interval_hours: f64,
    pub max_interval_hours: f64,
    pub avg_interval_hours: f64,
    pub sample_count: u32,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_checked: DateTime<Utc>,

    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_changed: Option<DateTime<Utc>>,
}

/// How a site paginates listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    QueryParam,
    PathSegment,
    NextButton,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationPattern {
    pub kind: PaginationKind,

    /// Parameter name for `QueryParam` pagination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    /// URL template with `{page}` placeholder for `PathSegment` pagination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Everything known about one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEntry {
    /// Ordered set of API patterns, unique by (endpoint, method)
    #[serde(default)]
    pub api_patterns: Vec<ApiPattern>,

    /// Content-type tag → priority-descending selector chain
    #[serde(default)]
    pub selector_chains: IndexMap<String, Vec<SelectorPattern>>,

    /// URL base → refresh descriptor
    #[serde(default)]
    pub refresh_patterns: IndexMap<String, RefreshPattern>,

    /// Learned validators, in learn order
    #[serde(default)]
    pub validators: Vec<LearnedValidator>,

    /// URL base → pagination descriptor
    #[serde(default)]
    pub pagination_patterns: IndexMap<String, PaginationPattern>,

    /// Newest-first, capped at [`DomainEntry::MAX_RECENT_FAILURES`]
    #[serde(default)]
    pub recent_failures: Vec<FailureContext>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_profile: Option<SuccessProfile>,

    pub overall_success_rate: f64,
    pub usage_count: u64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_used: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,

    /// Name of the domain group this domain belongs to, if configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_group: Option<String>,
}

impl DomainEntry {
    pub const MAX_RECENT_FAILURES: usize = 20;

    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            api_patterns: Vec::new(),
            selector_chains: IndexMap::new(),
            refresh_patterns: IndexMap::new(),
            validators: Vec::new(),
            pagination_patterns: IndexMap::new(),
            recent_failures: Vec::new(),
            success_profile: None,
            overall_success_rate: 1.0,
            usage_count: 0,
            created_at: now,
            last_used: now,
            last_updated: now,
            domain_group: None,
        }
    }

    /// Mark the entry as touched by a learning operation.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_used = now;
        self.last_updated = now;
    }

    /// Find an API pattern by key.
    pub fn find_api_pattern(&self, endpoint: &str, method: &str) -> Option<&ApiPattern> {
        self.api_patterns.iter().find(|p| p.matches(endpoint, method))
    }

    pub fn find_api_pattern_mut(&mut self, endpoint: &str, method: &str) -> Option<&mut ApiPattern> {
        self.api_patterns
            .iter_mut()
            .find(|p| p.matches(endpoint, method))
    }

    /// Prepend a failure, keeping the bounded newest-first order.
    pub fn push_failure(&mut self, failure: FailureContext) {
        self.recent_failures.insert(0, failure);
        self.recent_failures.truncate(Self::MAX_RECENT_FAILURES);
    }
}

impl Default for DomainEntry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_pattern_bypass_invariant() {
        let mut pattern = ApiPattern::new("/api/items", "get", Provenance::new("test"));
        assert_eq!(pattern.method, "GET");
        assert_eq!(pattern.confidence, Confidence::High);
        assert!(pattern.can_bypass);

        pattern.set_confidence(Confidence::Medium);
        assert!(!pattern.can_bypass);

        pattern.set_confidence(Confidence::High);
        assert!(pattern.can_bypass);
    }

    #[test]
    fn test_recent_failures_bounded_newest_first() {
        let mut entry = DomainEntry::new();
        for status in 0..25u16 {
            entry.push_failure(FailureContext::new(FailureType::ServerError).with_status(500 + status));
        }

        assert_eq!(entry.recent_failures.len(), DomainEntry::MAX_RECENT_FAILURES);
        // Newest (last pushed) first
        assert_eq!(entry.recent_failures[0].status_code, Some(524));
    }

    #[test]
    fn test_learned_validator_checks() {
        let validator = LearnedValidator {
            url_pattern: Some("/articles/".into()),
            expected_min_length: 10,
            expected_max_length: Some(100),
            must_contain_any: vec!["rust".into(), "cargo".into()],
            must_contain_all: vec![],
            must_not_contain: vec!["error".into()],
            success_count: 0,
            failure_count: 0,
        };

        assert!(validator.applies_to("https://example.com/articles/1"));
        assert!(!validator.applies_to("https://example.com/about"));

        assert!(validator.check("a long post about rust tooling").is_ok());
        assert!(validator.check("short").is_err());
        assert!(validator.check("a long post about python tooling").is_err());
        assert!(validator.check("a long rust post with an error inside").is_err());
    }

    #[test]
    fn test_normalize_domain_lowercases() {
        let url = url::Url::parse("https://EXAMPLE.com/Path").unwrap();
        assert_eq!(normalize_domain(&url), Some("example.com".to_string()));
    }
}
