//! Anti-patterns: persisted records that an approach is known to fail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a pattern failed. This taxonomy is wider than the per-domain
/// [`FailureType`](crate::types::domain::FailureType): it describes
/// pattern-level failures fed back from anti-pattern detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    AuthRequired,
    WrongEndpoint,
    ValidationFailed,
    RateLimited,
    Timeout,
    NetworkError,
    ServerError,
}

/// A persisted record that a given endpoint/approach is known to fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiPattern {
    pub id: String,
    pub failure_category: FailureCategory,

    /// Domains this anti-pattern has been observed on
    #[serde(default)]
    pub domains: Vec<String>,

    pub failure_count: u32,

    /// Epoch milliseconds; 0 means never expires
    pub expires_at: i64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl AntiPattern {
    /// Categories that qualify an anti-pattern for persistence. This set
    /// is independent from the severe-demotion set used by the learning
    /// engine, even though they currently coincide.
    pub const PERSISTABLE_CATEGORIES: [FailureCategory; 3] = [
        FailureCategory::AuthRequired,
        FailureCategory::WrongEndpoint,
        FailureCategory::ValidationFailed,
    ];

    pub fn new(failure_category: FailureCategory, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            failure_category,
            domains: vec![domain.into()],
            failure_count: 1,
            expires_at: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_failure_count(mut self, count: u32) -> Self {
        self.failure_count = count;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at.timestamp_millis();
        self
    }

    /// Persisted only when failures have accumulated and the category is
    /// one of the persistable ones.
    pub fn is_persistable(&self) -> bool {
        self.failure_count >= 5 && Self::PERSISTABLE_CATEGORIES.contains(&self.failure_category)
    }

    /// Whether this anti-pattern has expired (0 = never).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at != 0 && self.expires_at <= now.timestamp_millis()
    }

    /// Record an additional observation on a domain.
    pub fn record_observation(&mut self, domain: &str) {
        self.failure_count += 1;
        if !self.domains.iter().any(|d| d == domain) {
            self.domains.push(domain.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistable_predicate() {
        let mut ap = AntiPattern::new(FailureCategory::AuthRequired, "example.com");
        assert!(!ap.is_persistable());

        ap.failure_count = 5;
        assert!(ap.is_persistable());

        ap.failure_category = FailureCategory::Timeout;
        assert!(!ap.is_persistable());

        ap.failure_category = FailureCategory::ValidationFailed;
        assert!(ap.is_persistable());
    }

    #[test]
    fn test_expiry_zero_means_never() {
        let ap = AntiPattern::new(FailureCategory::WrongEndpoint, "example.com");
        assert_eq!(ap.expires_at, 0);
        assert!(!ap.is_expired(Utc::now() + chrono::Duration::days(365 * 10)));

        let expired = AntiPattern::new(FailureCategory::WrongEndpoint, "example.com")
            .with_expiry(Utc::now() - chrono::Duration::hours(1));
        assert!(expired.is_expired(Utc::now()));
    }

    #[test]
    fn test_observation_dedupes_domains() {
        let mut ap = AntiPattern::new(FailureCategory::AuthRequired, "a.example.com");
        ap.record_observation("b.example.com");
        ap.record_observation("a.example.com");

        assert_eq!(ap.failure_count, 3);
        assert_eq!(ap.domains.len(), 2);
    }
}
