//! Rendering tiers and the orchestrator's result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::content::ContentResult;

/// A rendering approach with a distinct cost/fidelity trade-off.
///
/// Tiers are ordered by ascending cost: `Intelligence` (no JS execution),
/// `Lightweight` (sandboxed JS), `Browser` (full headless browser).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Intelligence,
    Lightweight,
    Browser,
}

impl Tier {
    /// Cost rank: intelligence=1 < lightweight=2 < browser=3.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Intelligence => 1,
            Tier::Lightweight => 2,
            Tier::Browser => 3,
        }
    }

    /// The next more-expensive tier, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Intelligence => Some(Tier::Lightweight),
            Tier::Lightweight => Some(Tier::Browser),
            Tier::Browser => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Intelligence => "intelligence",
            Tier::Lightweight => "lightweight",
            Tier::Browser => "browser",
        }
    }

    /// Parse a tier name. `"static"` is a legacy alias for intelligence.
    pub fn parse(name: &str) -> Option<Tier> {
        match name {
            "intelligence" | "static" => Some(Tier::Intelligence),
            "lightweight" => Some(Tier::Lightweight),
            "browser" => Some(Tier::Browser),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learned per-domain tier preference, owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPreference {
    pub domain: String,
    pub preferred_tier: Tier,
    pub success_count: u32,
    pub failure_count: u32,
    pub last_used: DateTime<Utc>,
    /// Exponential moving average of response time, milliseconds
    pub avg_response_time_ms: f64,
}

impl TierPreference {
    pub fn new(domain: impl Into<String>, tier: Tier) -> Self {
        Self {
            domain: domain.into(),
            preferred_tier: tier,
            success_count: 0,
            failure_count: 0,
            last_used: Utc::now(),
            avg_response_time_ms: 0.0,
        }
    }

    /// Whether this preference is established enough to trust: at least
    /// three successes and used within the last seven days.
    pub fn is_trusted(&self, now: DateTime<Utc>) -> bool {
        self.success_count >= 3 && now - self.last_used < chrono::Duration::days(7)
    }
}

/// Why a tier was skipped during fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSkip {
    pub tier: Tier,
    pub reason: String,
}

/// Budget accounting attached to every orchestrator result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchBudget {
    /// The latency budget was exhausted before the cascade finished
    pub latency_exceeded: bool,

    /// Tiers skipped and why
    #[serde(default)]
    pub tiers_skipped: Vec<TierSkip>,

    /// Set when `max_cost_tier` stopped the cascade
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_tier_enforced: Option<Tier>,

    /// Always false here: caching is a higher-level concern
    pub used_cache: bool,

    /// Set when a freshness requirement influenced the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_applied: Option<String>,
}

/// The orchestrator's result: a content result plus tier accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredFetchResult {
    #[serde(flatten)]
    pub result: ContentResult,

    /// Tier that produced the content (or the last one tried on failure)
    pub tier: Tier,

    /// Tiers run for this request, in order
    pub tiers_attempted: Vec<Tier>,

    /// True when the winning tier was not the starting tier
    pub fell_back: bool,

    /// Why the starting tier was chosen (learned, heuristic, forced)
    pub tier_reason: String,

    pub budget: FetchBudget,
}

impl TieredFetchResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Intelligence.rank() < Tier::Lightweight.rank());
        assert!(Tier::Lightweight.rank() < Tier::Browser.rank());
        assert!(Tier::Intelligence < Tier::Browser);
    }

    #[test]
    fn test_tier_next() {
        assert_eq!(Tier::Intelligence.next(), Some(Tier::Lightweight));
        assert_eq!(Tier::Lightweight.next(), Some(Tier::Browser));
        assert_eq!(Tier::Browser.next(), None);
    }

    #[test]
    fn test_static_is_legacy_alias() {
        assert_eq!(Tier::parse("static"), Some(Tier::Intelligence));
        assert_eq!(Tier::parse("intelligence"), Some(Tier::Intelligence));
        assert_eq!(Tier::parse("bogus"), None);
    }

    #[test]
    fn test_preference_trust_window() {
        let mut pref = TierPreference::new("example.com", Tier::Intelligence);
        let now = Utc::now();

        assert!(!pref.is_trusted(now));

        pref.success_count = 3;
        assert!(pref.is_trusted(now));

        pref.last_used = now - chrono::Duration::days(8);
        assert!(!pref.is_trusted(now));
    }
}
