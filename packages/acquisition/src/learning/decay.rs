//! Confidence decay for API patterns.
//!
//! Patterns that go unverified lose confidence: after a grace period,
//! numeric confidence drops per elapsed week, floored, then
//! re-quantized to a grade. Decay never raises confidence.

use chrono::{DateTime, Utc};

use crate::types::config::LearningConfig;
use crate::types::content::Confidence;
use crate::types::domain::{ApiPattern, DecayEvent};

/// Numeric confidence lost for a pattern last verified `elapsed_days`
/// ago. Zero within the grace period; fractional weeks count.
pub fn decay_drop(elapsed_days: f64, config: &LearningConfig) -> f64 {
    let grace = config.decay_grace_period_days as f64;
    if elapsed_days <= grace {
        return 0.0;
    }
    (elapsed_days - grace) / 7.0 * config.decay_rate_per_week
}

/// Apply decay to one pattern. Returns the recorded event when the
/// grade changed.
pub fn apply_decay(
    pattern: &mut ApiPattern,
    now: DateTime<Utc>,
    config: &LearningConfig,
) -> Option<DecayEvent> {
    let elapsed_days = (now - pattern.last_verified).num_seconds() as f64 / 86_400.0;
    let drop = decay_drop(elapsed_days, config);
    if drop <= 0.0 {
        return None;
    }

    let old = pattern.confidence;
    let new_numeric = (old.numeric() - drop).max(config.decay_floor);
    let new = Confidence::from_numeric(new_numeric);
    if new == old {
        return None;
    }

    pattern.set_confidence(new);
    let event = DecayEvent {
        at: now,
        old_confidence: old,
        new_confidence: new,
        reason: format!("unverified for {elapsed_days:.0} days"),
    };
    pattern.provenance.decay_events.push(event.clone());
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::domain::Provenance;

    fn pattern_verified_days_ago(days: i64) -> ApiPattern {
        let mut pattern = ApiPattern::new("/api/x", "GET", Provenance::new("test"));
        pattern.last_verified = Utc::now() - chrono::Duration::days(days);
        pattern
    }

    #[test]
    fn test_grace_period_boundary() {
        let config = LearningConfig::default();
        // Exactly 14 days: no decay
        assert_eq!(decay_drop(14.0, &config), 0.0);
        // 15 days: decay applies
        assert!(decay_drop(15.0, &config) > 0.0);
    }

    #[test]
    fn test_35_days_high_becomes_medium() {
        let config = LearningConfig::default();
        let mut pattern = pattern_verified_days_ago(35);

        let event = apply_decay(&mut pattern, Utc::now(), &config).unwrap();

        // 14 d grace + 3 full weeks × 0.1 = 0.3 drop; 1.0 → 0.7 → medium
        assert_eq!(pattern.confidence, Confidence::Medium);
        assert!(!pattern.can_bypass);
        assert_eq!(event.old_confidence, Confidence::High);
        assert_eq!(event.new_confidence, Confidence::Medium);
    }

    #[test]
    fn test_decay_is_monotonic() {
        let config = LearningConfig::default();
        let mut pattern = pattern_verified_days_ago(60);

        apply_decay(&mut pattern, Utc::now(), &config);
        let after_first = pattern.confidence;
        apply_decay(&mut pattern, Utc::now(), &config);

        assert!(pattern.confidence <= after_first);
    }

    #[test]
    fn test_floor_holds() {
        let config = LearningConfig::default();
        let mut pattern = pattern_verified_days_ago(365);

        apply_decay(&mut pattern, Utc::now(), &config);
        // Floor 0.3 quantizes to low, never below
        assert_eq!(pattern.confidence, Confidence::Low);
    }

    #[test]
    fn test_no_event_when_grade_unchanged() {
        let config = LearningConfig::default();
        // 15 days: drop ≈ 0.014, grade stays high
        let mut pattern = pattern_verified_days_ago(15);
        assert!(apply_decay(&mut pattern, Utc::now(), &config).is_none());
        assert_eq!(pattern.confidence, Confidence::High);
    }
}
