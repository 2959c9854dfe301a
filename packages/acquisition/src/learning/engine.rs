//! The learning engine: everything the system remembers per domain.
//!
//! Owns no state of its own; every mutation goes through the knowledge
//! store's single writer. Operations mirror the acquisition flow:
//! successes teach patterns, selectors, and validators; failures demote
//! and eventually persist anti-patterns; unverified patterns decay.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::learning::decay;
use crate::learning::semantic::SemanticPatternMatcher;
use crate::learning::store::{KnowledgeStore, LearningEvent};
use crate::types::anti_pattern::{AntiPattern, FailureCategory};
use crate::types::config::LearningConfig;
use crate::types::content::Confidence;
use crate::types::domain::{
    ApiPattern, DecayEvent, DomainEntry, FailureContext, FailureType, LearnedValidator,
    PaginationKind, PaginationPattern, Provenance, RefreshPattern, SelectorPattern,
    SuccessProfile,
};
use crate::types::group::{DomainGroup, DomainGroupConfig};
use crate::types::tier::Tier;

/// Categories that demote patterns at the halved threshold. Kept as a
/// separate constant from the anti-pattern persistence filter even
/// though the sets currently coincide.
pub const SEVERE_DEMOTION_CATEGORIES: [FailureCategory; 3] = [
    FailureCategory::AuthRequired,
    FailureCategory::WrongEndpoint,
    FailureCategory::ValidationFailed,
];

/// Where a learned pattern came from.
#[derive(Debug, Clone, Default)]
pub struct LearnSource {
    pub source: String,
    pub source_url: Option<String>,
    pub source_pattern_id: Option<String>,
}

impl LearnSource {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_url: None,
            source_pattern_id: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// How a pattern lookup matched.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Semantic { similarity: f32 },
}

/// A pattern lookup result. Confidence may be downgraded from the
/// stored pattern's for semantic matches.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub domain: String,
    pub endpoint: String,
    pub method: String,
    pub confidence: Confidence,
    pub can_bypass: bool,
    pub kind: MatchKind,
}

/// Summary of a domain's recent failures.
#[derive(Debug, Clone)]
pub struct FailurePatterns {
    pub most_common_type: Option<FailureType>,
    /// Share of the bounded failure list that landed within the last
    /// hour
    pub recent_failure_rate: f64,
    pub should_backoff: bool,
}

/// One successful acquisition, as the orchestrator reports it.
#[derive(Debug, Clone)]
pub struct SuccessSample {
    pub tier: Tier,
    pub strategy: String,
    pub response_time_ms: u64,
    pub content_length: usize,
    pub has_structured_data: bool,
    pub has_framework_data: bool,
    pub has_bypassable_apis: bool,
}

pub struct LearningEngine {
    store: Arc<KnowledgeStore>,
    config: LearningConfig,
    groups: DomainGroupConfig,
    semantic: Option<Arc<SemanticPatternMatcher>>,
}

impl LearningEngine {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            config: LearningConfig::default(),
            groups: DomainGroupConfig::default(),
            semantic: None,
        }
    }

    pub fn with_config(mut self, config: LearningConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_groups(mut self, groups: DomainGroupConfig) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_semantic_matcher(mut self, matcher: Arc<SemanticPatternMatcher>) -> Self {
        self.semantic = Some(matcher);
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // API patterns
    // ------------------------------------------------------------------

    /// Upsert a pattern by `(endpoint, method)`. Learning an existing
    /// pattern again counts as a verification.
    pub fn learn_api_pattern(
        &self,
        domain: &str,
        endpoint: &str,
        method: &str,
        source: LearnSource,
    ) {
        let now = Utc::now();
        let learned_new = self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            match entry.find_api_pattern_mut(endpoint, method) {
                Some(pattern) => {
                    pattern.verification_count += 1;
                    pattern.last_verified = now;
                    false
                }
                None => {
                    let mut provenance = Provenance::new(source.source.clone());
                    provenance.source_url = source.source_url.clone();
                    provenance.source_pattern_id = source.source_pattern_id.clone();
                    provenance.verification_count = 1;
                    entry
                        .api_patterns
                        .push(ApiPattern::new(endpoint, method, provenance));
                    true
                }
            }
        });

        if learned_new {
            info!(domain = %domain, endpoint = %endpoint, "learned API pattern");
            self.store.push_event(LearningEvent::new(
                "api_pattern_learned",
                domain,
                format!("{method} {endpoint} via {}", source.source),
            ));
        } else {
            debug!(domain = %domain, endpoint = %endpoint, "re-verified known API pattern");
        }

        if let Some(matcher) = &self.semantic {
            let confidence = self
                .store
                .entry(domain)
                .and_then(|e| e.find_api_pattern(endpoint, method).map(|p| p.confidence))
                .unwrap_or(Confidence::High);
            let matcher = Arc::clone(matcher);
            let (domain, endpoint, method) =
                (domain.to_string(), endpoint.to_string(), method.to_string());
            tokio::spawn(async move {
                if let Err(e) = matcher
                    .index_pattern(&domain, &endpoint, &method, confidence)
                    .await
                {
                    debug!(error = %e, "semantic indexing failed");
                }
            });
        }
    }

    /// Record a successful direct use of a pattern.
    pub fn verify_api_pattern(&self, domain: &str, endpoint: &str, method: &str) {
        let now = Utc::now();
        self.store.with_existing_entry_mut(domain, |entry| {
            entry.touch();
            entry.overall_success_rate = (entry.overall_success_rate + 0.05).min(1.0);
            if let Some(pattern) = entry.find_api_pattern_mut(endpoint, method) {
                pattern.verification_count += 1;
                pattern.last_verified = now;
            }
        });
    }

    /// Record a pattern failure and demote confidence when thresholds
    /// are crossed. Severe categories halve the thresholds. Crossing
    /// the anti-pattern bar persists one.
    pub fn record_api_pattern_failure(
        &self,
        domain: &str,
        endpoint: &str,
        method: &str,
        category: FailureCategory,
        message: Option<&str>,
    ) {
        let severe = SEVERE_DEMOTION_CATEGORIES.contains(&category);
        let high_threshold = if severe {
            self.config.demote_high_after_failures.div_ceil(2)
        } else {
            self.config.demote_high_after_failures
        };
        let medium_threshold = if severe {
            self.config.demote_medium_after_failures.div_ceil(2)
        } else {
            self.config.demote_medium_after_failures
        };

        let now = Utc::now();
        let demotion = self.store.with_existing_entry_mut(domain, |entry| {
            entry.touch();
            let pattern = entry.find_api_pattern_mut(endpoint, method)?;
            pattern.failure_count += 1;
            pattern.last_failure = Some(now);

            let old = pattern.confidence;
            let new = match old {
                Confidence::High if pattern.failure_count >= high_threshold => Confidence::Medium,
                Confidence::Medium if pattern.failure_count >= medium_threshold => Confidence::Low,
                current => current,
            };
            if new == old {
                return Some((old, old, pattern.failure_count));
            }

            pattern.set_confidence(new);
            pattern.provenance.decay_events.push(DecayEvent {
                at: now,
                old_confidence: old,
                new_confidence: new,
                reason: format!("failure: {category:?}"),
            });
            Some((old, new, pattern.failure_count))
        });

        let Some(Some((old, new, failure_count))) = demotion else {
            return;
        };

        if new != old {
            info!(
                domain = %domain,
                endpoint = %endpoint,
                from = old.as_str(),
                to = new.as_str(),
                "demoted API pattern"
            );
            self.store.push_event(LearningEvent::new(
                "api_pattern_demoted",
                domain,
                format!(
                    "{method} {endpoint}: {} -> {} ({category:?})",
                    old.as_str(),
                    new.as_str()
                ),
            ));
        }

        let candidate = AntiPattern::new(category, domain).with_failure_count(failure_count);
        if candidate.is_persistable() {
            self.persist_anti_pattern_for(category, domain, failure_count, message);
        }
    }

    /// Decay unverified patterns across every domain. Invoked on load
    /// and periodically.
    pub fn apply_confidence_decay(&self) {
        let now = Utc::now();
        let config = self.config.clone();
        let mut decayed = 0usize;
        let mut events = Vec::new();

        self.store.for_each_entry_mut(|domain, entry| {
            for pattern in entry.api_patterns.iter_mut() {
                if let Some(event) = decay::apply_decay(pattern, now, &config) {
                    decayed += 1;
                    events.push(LearningEvent::new(
                        "confidence_decayed",
                        domain.to_string(),
                        format!(
                            "{} {}: {} -> {}",
                            pattern.method,
                            pattern.endpoint,
                            event.old_confidence.as_str(),
                            event.new_confidence.as_str()
                        ),
                    ));
                }
            }
        });

        for event in events {
            self.store.push_event(event);
        }
        if decayed > 0 {
            info!(patterns = decayed, "applied confidence decay");
        }
    }

    // ------------------------------------------------------------------
    // Pattern lookup
    // ------------------------------------------------------------------

    /// Synchronous lookup: exact path match wins over any prefix match.
    pub fn find_pattern(&self, url: &str) -> Option<PatternMatch> {
        let parsed = Url::parse(url).ok()?;
        let domain = crate::types::domain::normalize_domain(&parsed)?;
        let entry = self.store.entry(&domain)?;
        let path = parsed.path();

        let mut prefix_match: Option<&ApiPattern> = None;
        for pattern in &entry.api_patterns {
            let endpoint_path = endpoint_path(&pattern.endpoint);
            if endpoint_path == path {
                return Some(pattern_match(&domain, pattern, MatchKind::Exact));
            }
            if prefix_match.is_none() && path.starts_with(endpoint_path.as_str()) {
                prefix_match = Some(pattern);
            }
        }
        prefix_match.map(|p| pattern_match(&domain, p, MatchKind::Prefix))
    }

    /// Lookup with semantic fallback. Similarity in [0.7, 0.85)
    /// downgrades confidence one step; below 0.7 forces low.
    pub async fn find_pattern_async(
        &self,
        url: &str,
        min_similarity: Option<f32>,
    ) -> Option<PatternMatch> {
        if let Some(hit) = self.find_pattern(url) {
            return Some(hit);
        }
        let matcher = self.semantic.as_ref()?;
        let parsed = Url::parse(url).ok()?;

        let matches = matcher
            .find_similar(&parsed, min_similarity, 3)
            .await
            .ok()?;
        let best = matches.into_iter().next()?;
        let confidence = semantic_confidence(best.confidence, best.similarity);

        Some(PatternMatch {
            domain: best.domain,
            endpoint: best.endpoint,
            method: best.method,
            confidence,
            can_bypass: confidence == Confidence::High,
            kind: MatchKind::Semantic {
                similarity: best.similarity,
            },
        })
    }

    // ------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------

    /// Upsert a selector in the content-type's chain; success bumps
    /// priority (+1, cap 100).
    pub fn learn_selector(
        &self,
        domain: &str,
        selector: &str,
        content_type: &str,
        url_pattern: Option<&str>,
    ) {
        let bump = self.config.selector_success_bump;
        let now = Utc::now();
        self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            let chain = entry
                .selector_chains
                .entry(content_type.to_string())
                .or_default();
            match chain.iter_mut().find(|s| s.selector == selector) {
                Some(pattern) => {
                    pattern.priority = pattern.priority.saturating_add(bump).min(100);
                    pattern.success_count += 1;
                    pattern.last_worked = now;
                }
                None => {
                    let mut pattern = SelectorPattern::new(selector, content_type);
                    pattern.success_count = 1;
                    pattern.url_pattern = url_pattern.map(String::from);
                    chain.push(pattern);
                }
            }
            sort_chain(chain);
        });
    }

    /// Penalize a selector (−5, floor 0).
    pub fn record_selector_failure(&self, domain: &str, selector: &str, content_type: &str) {
        let penalty = self.config.selector_failure_penalty;
        let now = Utc::now();
        self.store.with_existing_entry_mut(domain, |entry| {
            entry.touch();
            if let Some(chain) = entry.selector_chains.get_mut(content_type) {
                if let Some(pattern) = chain.iter_mut().find(|s| s.selector == selector) {
                    pattern.priority = pattern.priority.saturating_sub(penalty);
                    pattern.failure_count += 1;
                    pattern.last_failed = Some(now);
                }
                sort_chain(chain);
            }
        });
    }

    /// Per-domain chain, else the domain group's shared selectors.
    pub fn get_selector_chain(&self, domain: &str, content_type: &str) -> Vec<SelectorPattern> {
        if let Some(entry) = self.store.entry(domain) {
            if let Some(chain) = entry.selector_chains.get(content_type) {
                if !chain.is_empty() {
                    return chain.clone();
                }
            }
        }

        self.groups
            .group_for(domain)
            .map(|group| {
                group
                    .content_selectors
                    .iter()
                    .map(|s| SelectorPattern::new(s.clone(), content_type))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Success / failure profiles
    // ------------------------------------------------------------------

    /// Fold a success into the domain's profile. The preferred tier is
    /// monotonic: it only moves toward cheaper tiers.
    pub fn record_success(&self, domain: &str, sample: SuccessSample) {
        let alpha = self.config.ema_alpha;
        self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            entry.usage_count += 1;
            entry.overall_success_rate = (entry.overall_success_rate + 0.05).min(1.0);

            match entry.success_profile.as_mut() {
                Some(profile) => {
                    profile.avg_response_time_ms =
                        alpha * sample.response_time_ms as f64
                            + (1.0 - alpha) * profile.avg_response_time_ms;
                    profile.avg_content_length = alpha * sample.content_length as f64
                        + (1.0 - alpha) * profile.avg_content_length;
                    profile.has_structured_data |= sample.has_structured_data;
                    profile.has_framework_data |= sample.has_framework_data;
                    profile.has_bypassable_apis |= sample.has_bypassable_apis;
                    profile.sample_count += 1;
                    if sample.tier.rank() <= profile.preferred_tier.rank() {
                        profile.preferred_tier = sample.tier;
                        profile.preferred_strategy = sample.strategy.clone();
                    }
                }
                None => {
                    entry.success_profile = Some(SuccessProfile {
                        preferred_tier: sample.tier,
                        preferred_strategy: sample.strategy.clone(),
                        avg_response_time_ms: sample.response_time_ms as f64,
                        avg_content_length: sample.content_length as f64,
                        has_structured_data: sample.has_structured_data,
                        has_framework_data: sample.has_framework_data,
                        has_bypassable_apis: sample.has_bypassable_apis,
                        sample_count: 1,
                    });
                }
            }
        });
    }

    /// Prepend a failure (cap 20) and reduce the success rate.
    pub fn record_failure(&self, domain: &str, failure: FailureContext) {
        let step = self.config.failure_rate_step;
        self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            entry.overall_success_rate = (entry.overall_success_rate - step).max(0.0);
            entry.push_failure(failure);
        });
    }

    /// Summarize recent failures for backoff decisions.
    pub fn get_failure_patterns(&self, domain: &str) -> FailurePatterns {
        let Some(entry) = self.store.entry(domain) else {
            return FailurePatterns {
                most_common_type: None,
                recent_failure_rate: 0.0,
                should_backoff: false,
            };
        };

        let mut counts: std::collections::HashMap<FailureType, usize> =
            std::collections::HashMap::new();
        for failure in &entry.recent_failures {
            *counts.entry(failure.failure_type).or_default() += 1;
        }
        let most_common_type = counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(failure_type, _)| *failure_type);

        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let recent = entry
            .recent_failures
            .iter()
            .filter(|f| f.timestamp > hour_ago)
            .count();
        let recent_failure_rate = recent as f64 / DomainEntry::MAX_RECENT_FAILURES as f64;

        let should_backoff = matches!(
            most_common_type,
            Some(FailureType::RateLimited) | Some(FailureType::Blocked)
        ) || recent_failure_rate > 0.5;

        FailurePatterns {
            most_common_type,
            recent_failure_rate,
            should_backoff,
        }
    }

    /// Fixed status/message → failure-type mapping.
    pub fn classify_error(message: &str, status: Option<u16>) -> FailureType {
        match status {
            Some(401) | Some(403) => return FailureType::AuthExpired,
            Some(404) => return FailureType::NotFound,
            Some(429) => return FailureType::RateLimited,
            Some(code) if code >= 500 => return FailureType::ServerError,
            _ => {}
        }
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") {
            FailureType::Timeout
        } else if lower.contains("blocked") || lower.contains("captcha") || lower.contains("cloudflare")
        {
            FailureType::Blocked
        } else {
            FailureType::Unknown
        }
    }

    // ------------------------------------------------------------------
    // Refresh intervals
    // ------------------------------------------------------------------

    /// Track how often content at a URL base changes.
    pub fn record_content_check(&self, domain: &str, url_base: &str, changed: bool) {
        let now = Utc::now();
        self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            let pattern = entry
                .refresh_patterns
                .entry(url_base.to_string())
                .or_insert_with(|| RefreshPattern {
                    url_base: url_base.to_string(),
                    min_interval_hours: f64::MAX,
                    max_interval_hours: 0.0,
                    avg_interval_hours: 0.0,
                    sample_count: 0,
                    last_checked: now,
                    last_changed: None,
                });

            if changed {
                if let Some(last_changed) = pattern.last_changed {
                    let interval_hours =
                        (now - last_changed).num_seconds() as f64 / 3_600.0;
                    let samples = pattern.sample_count as f64;
                    pattern.avg_interval_hours =
                        (pattern.avg_interval_hours * samples + interval_hours) / (samples + 1.0);
                    pattern.min_interval_hours = pattern.min_interval_hours.min(interval_hours);
                    pattern.max_interval_hours = pattern.max_interval_hours.max(interval_hours);
                    pattern.sample_count += 1;
                }
                pattern.last_changed = Some(now);
            }
            pattern.last_checked = now;
        });
    }

    /// Recommended refresh interval in hours: `max(1, 0.8 × avg)` once
    /// three samples exist, else 24.
    pub fn get_recommended_refresh_interval(&self, domain: &str, url_base: &str) -> f64 {
        let Some(entry) = self.store.entry(domain) else {
            return 24.0;
        };
        match entry.refresh_patterns.get(url_base) {
            Some(pattern) if pattern.sample_count >= 3 => {
                (0.8 * pattern.avg_interval_hours).max(1.0)
            }
            _ => 24.0,
        }
    }

    // ------------------------------------------------------------------
    // Validators
    // ------------------------------------------------------------------

    /// Learn a validator from content that passed: top-10 frequent
    /// words (len > 4, freq ≥ 3) and length bounds [0.5×, 2×].
    pub fn learn_validator(&self, domain: &str, content: &str, url_pattern: Option<&str>) {
        let words = frequent_words(content, 4, 3, 10);
        let len = content.chars().count();

        self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            let exists = entry.validators.iter().any(|v| {
                v.url_pattern.as_deref() == url_pattern
            });
            if exists {
                return;
            }
            entry.validators.push(LearnedValidator {
                url_pattern: url_pattern.map(String::from),
                expected_min_length: len / 2,
                expected_max_length: Some(len * 2),
                must_contain_any: words,
                must_contain_all: Vec::new(),
                must_not_contain: Vec::new(),
                success_count: 0,
                failure_count: 0,
            });
        });
    }

    /// Learned validators applicable to a URL, in learn order.
    pub fn get_validators(&self, domain: &str, url: &str) -> Vec<LearnedValidator> {
        self.store
            .entry(domain)
            .map(|entry| {
                entry
                    .validators
                    .iter()
                    .filter(|v| v.applies_to(url))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Update the matching validator's counters after a validation.
    pub fn record_validator_outcome(&self, domain: &str, url: &str, passed: bool) {
        self.store.with_existing_entry_mut(domain, |entry| {
            if let Some(validator) = entry.validators.iter_mut().find(|v| v.applies_to(url)) {
                if passed {
                    validator.success_count += 1;
                } else {
                    validator.failure_count += 1;
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Domain groups and transfer
    // ------------------------------------------------------------------

    pub fn get_domain_group(&self, domain: &str) -> Option<&DomainGroup> {
        self.groups.group_for(domain)
    }

    /// Copy selectors (priority × 0.5, counters reset) and validators
    /// (counters reset) between same-group domains. No-op across
    /// groups; idempotent within one.
    pub fn transfer_patterns(&self, from: &str, to: &str) -> bool {
        if !self.groups.same_group(from, to) {
            debug!(from = %from, to = %to, "transfer skipped: different domain groups");
            return false;
        }
        let Some(source) = self.store.entry(from) else {
            return false;
        };

        self.store.with_entry_mut(to, |entry| {
            entry.touch();
            for (content_type, chain) in &source.selector_chains {
                let target = entry
                    .selector_chains
                    .entry(content_type.clone())
                    .or_default();
                for pattern in chain {
                    if target.iter().any(|p| p.selector == pattern.selector) {
                        continue;
                    }
                    let mut copied = pattern.clone();
                    copied.priority = (pattern.priority as f64 * 0.5) as u8;
                    copied.success_count = 0;
                    copied.failure_count = 0;
                    target.push(copied);
                }
                sort_chain(target);
            }

            for validator in &source.validators {
                let exists = entry
                    .validators
                    .iter()
                    .any(|v| v.url_pattern == validator.url_pattern
                        && v.expected_min_length == validator.expected_min_length);
                if exists {
                    continue;
                }
                let mut copied = validator.clone();
                copied.success_count = 0;
                copied.failure_count = 0;
                entry.validators.push(copied);
            }
        });

        self.store.push_event(LearningEvent::new(
            "patterns_transferred",
            to,
            format!("from {from}"),
        ));
        true
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    /// Infer a pagination pattern from at least two listing URLs.
    pub fn learn_pagination_pattern(&self, domain: &str, urls: &[String]) -> Option<PaginationPattern> {
        if urls.len() < 2 {
            return None;
        }
        let parsed: Vec<Url> = urls.iter().filter_map(|u| Url::parse(u).ok()).collect();
        if parsed.len() < 2 {
            return None;
        }

        let pattern = infer_pagination(&parsed);
        let url_base = format!(
            "{}://{}{}",
            parsed[0].scheme(),
            parsed[0].host_str().unwrap_or_default(),
            common_path_prefix(&parsed)
        );

        self.store.with_entry_mut(domain, |entry| {
            entry.touch();
            entry
                .pagination_patterns
                .insert(url_base.clone(), pattern.clone());
        });
        Some(pattern)
    }

    // ------------------------------------------------------------------
    // Anti-patterns
    // ------------------------------------------------------------------

    /// Persist an anti-pattern when it meets the persistable predicate;
    /// update it when already present.
    pub fn persist_anti_pattern(&self, anti_pattern: AntiPattern) -> bool {
        if !anti_pattern.is_persistable() {
            return false;
        }
        self.store.upsert_anti_pattern(anti_pattern);
        true
    }

    fn persist_anti_pattern_for(
        &self,
        category: FailureCategory,
        domain: &str,
        failure_count: u32,
        message: Option<&str>,
    ) {
        let anti_pattern = match self.store.find_anti_pattern(category, domain) {
            Some(mut existing) => {
                existing.failure_count = existing.failure_count.max(failure_count);
                existing.record_observation(domain);
                existing
            }
            None => AntiPattern::new(category, domain).with_failure_count(failure_count),
        };

        if self.persist_anti_pattern(anti_pattern) {
            info!(domain = %domain, category = ?category, "persisted anti-pattern");
            self.store.push_event(LearningEvent::new(
                "anti_pattern_persisted",
                domain,
                message.map(String::from).unwrap_or_else(|| format!("{category:?}")),
            ));
        }
    }

    /// Feedback path from anti-pattern detection: demote the pattern at
    /// `endpoint` using the pattern-failure thresholds (severe
    /// categories use the lower one).
    pub fn record_pattern_failure(
        &self,
        domain: &str,
        endpoint: &str,
        category: FailureCategory,
        message: Option<&str>,
    ) {
        let severe = SEVERE_DEMOTION_CATEGORIES.contains(&category);
        let threshold = if severe {
            self.config.severe_pattern_failure_threshold
        } else {
            self.config.pattern_failure_threshold
        };

        let now = Utc::now();
        self.store.with_existing_entry_mut(domain, |entry| {
            entry.touch();
            let Some(pattern) = entry
                .api_patterns
                .iter_mut()
                .find(|p| p.endpoint == endpoint)
            else {
                return;
            };
            pattern.failure_count += 1;
            pattern.last_failure = Some(now);

            let old = pattern.confidence;
            let new = match old {
                Confidence::High if pattern.failure_count >= threshold => Confidence::Medium,
                Confidence::Medium if pattern.failure_count >= threshold * 2 => Confidence::Low,
                current => current,
            };
            if new != old {
                pattern.set_confidence(new);
                pattern.provenance.decay_events.push(DecayEvent {
                    at: now,
                    old_confidence: old,
                    new_confidence: new,
                    reason: message
                        .map(String::from)
                        .unwrap_or_else(|| format!("pattern failure: {category:?}")),
                });
            }
        });
    }
}

fn sort_chain(chain: &mut [SelectorPattern]) {
    chain.sort_by(|a, b| b.priority.cmp(&a.priority));
}

/// Confidence carried by a semantic match: one step down in the
/// uncertain band [0.7, 0.85), low below it.
fn semantic_confidence(stored: Confidence, similarity: f32) -> Confidence {
    if similarity < 0.7 {
        Confidence::Low
    } else if similarity < 0.85 {
        stored.downgraded()
    } else {
        stored
    }
}

fn pattern_match(domain: &str, pattern: &ApiPattern, kind: MatchKind) -> PatternMatch {
    PatternMatch {
        domain: domain.to_string(),
        endpoint: pattern.endpoint.clone(),
        method: pattern.method.clone(),
        confidence: pattern.confidence,
        can_bypass: pattern.can_bypass,
        kind,
    }
}

/// Path component of an endpoint that may be absolute or relative.
fn endpoint_path(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(url) => url.path().to_string(),
        Err(_) => endpoint.split('?').next().unwrap_or(endpoint).to_string(),
    }
}

/// Words longer than `min_len` occurring at least `min_freq` times,
/// most frequent first, capped.
fn frequent_words(content: &str, min_len: usize, min_freq: usize, cap: usize) -> Vec<String> {
    let mut counts: indexmap::IndexMap<String, usize> = indexmap::IndexMap::new();
    for word in content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > min_len)
    {
        *counts.entry(word.to_ascii_lowercase()).or_default() += 1;
    }
    let mut frequent: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_freq)
        .collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1));
    frequent.into_iter().take(cap).map(|(word, _)| word).collect()
}

fn infer_pagination(urls: &[Url]) -> PaginationPattern {
    const PAGE_PARAMS: &[&str] = &["page", "p", "offset", "start", "cursor", "after"];

    // Query-parameter pagination: a known param present on ≥2 URLs
    for param in PAGE_PARAMS {
        let with_param = urls
            .iter()
            .filter(|u| u.query_pairs().any(|(k, _)| k == *param))
            .count();
        if with_param >= 2 {
            return PaginationPattern {
                kind: PaginationKind::QueryParam,
                param: Some((*param).to_string()),
                template: None,
            };
        }
    }

    // Numeric path segment that varies across URLs
    let first_segments: Vec<String> = urls[0]
        .path_segments()
        .map(|s| s.map(String::from).collect())
        .unwrap_or_default();
    let second_segments: Vec<String> = urls[1]
        .path_segments()
        .map(|s| s.map(String::from).collect())
        .unwrap_or_default();

    if first_segments.len() == second_segments.len() {
        for (i, (a, b)) in first_segments.iter().zip(&second_segments).enumerate() {
            let numeric =
                a.chars().all(|c| c.is_ascii_digit()) && b.chars().all(|c| c.is_ascii_digit());
            if numeric && a != b {
                let mut template_segments = first_segments.clone();
                template_segments[i] = "{page}".to_string();
                return PaginationPattern {
                    kind: PaginationKind::PathSegment,
                    param: None,
                    template: Some(format!("/{}", template_segments.join("/"))),
                };
            }
        }
    }

    PaginationPattern {
        kind: PaginationKind::NextButton,
        param: None,
        template: None,
    }
}

fn common_path_prefix(urls: &[Url]) -> String {
    let paths: Vec<Vec<&str>> = urls
        .iter()
        .map(|u| u.path().split('/').filter(|s| !s.is_empty()).collect())
        .collect();
    let mut prefix = Vec::new();
    if let Some(first) = paths.first() {
        'outer: for (i, segment) in first.iter().enumerate() {
            for other in &paths[1..] {
                if other.get(i) != Some(segment) {
                    break 'outer;
                }
            }
            prefix.push(*segment);
        }
    }
    if prefix.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", prefix.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LearningEngine {
        LearningEngine::new(KnowledgeStore::in_memory())
    }

    #[test]
    fn test_learn_twice_is_one_pattern_with_verification_bump() {
        let engine = engine();
        engine.learn_api_pattern(
            "dev.to",
            "https://dev.to/api/articles/alice/hello",
            "GET",
            LearnSource::new("extraction-success"),
        );
        engine.learn_api_pattern(
            "dev.to",
            "https://dev.to/api/articles/alice/hello",
            "GET",
            LearnSource::new("extraction-success"),
        );

        let entry = engine.store().entry("dev.to").unwrap();
        assert_eq!(entry.api_patterns.len(), 1);
        assert_eq!(entry.api_patterns[0].verification_count, 2);
        assert_eq!(entry.api_patterns[0].confidence, Confidence::High);
        assert!(entry.api_patterns[0].can_bypass);
    }

    #[test]
    fn test_verify_bumps_count_and_success_rate() {
        let engine = engine();
        engine.learn_api_pattern("api.example", "/v1/items", "GET", LearnSource::new("test"));
        engine.store().with_entry_mut("api.example", |entry| {
            entry.overall_success_rate = 0.5;
        });

        engine.verify_api_pattern("api.example", "/v1/items", "GET");

        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].verification_count, 2);
        assert!((entry.overall_success_rate - 0.55).abs() < 1e-9);

        // Unknown domains are not created by verification
        engine.verify_api_pattern("unknown.example", "/v1/items", "GET");
        assert!(engine.store().entry("unknown.example").is_none());
    }

    #[test]
    fn test_demotion_ladder_with_severe_category() {
        let engine = engine();
        engine.learn_api_pattern("api.example", "/v1/items", "GET", LearnSource::new("test"));

        // Severe: high threshold halves from 3 to 2, medium from 5 to 3
        for _ in 0..2 {
            engine.record_api_pattern_failure(
                "api.example",
                "/v1/items",
                "GET",
                FailureCategory::AuthRequired,
                None,
            );
        }
        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].confidence, Confidence::Medium);
        assert!(!entry.api_patterns[0].can_bypass);

        engine.record_api_pattern_failure(
            "api.example",
            "/v1/items",
            "GET",
            FailureCategory::AuthRequired,
            None,
        );
        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].confidence, Confidence::Low);

        // Decay events carry the pre-change confidence
        let events = &entry.api_patterns[0].provenance.decay_events;
        assert_eq!(events[0].old_confidence, Confidence::High);
        assert_eq!(events[0].new_confidence, Confidence::Medium);
        assert_eq!(events[1].old_confidence, Confidence::Medium);
        assert_eq!(events[1].new_confidence, Confidence::Low);
    }

    #[test]
    fn test_five_auth_failures_persist_anti_pattern() {
        let engine = engine();
        engine.learn_api_pattern("api.example", "/v1/secure", "GET", LearnSource::new("test"));

        for _ in 0..5 {
            engine.record_api_pattern_failure(
                "api.example",
                "/v1/secure",
                "GET",
                FailureCategory::AuthRequired,
                Some("401 from upstream"),
            );
        }

        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].confidence, Confidence::Low);

        let anti_patterns = engine.store().anti_patterns();
        assert_eq!(anti_patterns.len(), 1);
        assert!(anti_patterns[0].failure_count >= 5);
        assert_eq!(
            anti_patterns[0].failure_category,
            FailureCategory::AuthRequired
        );
    }

    #[test]
    fn test_non_persistable_category_never_persists() {
        let engine = engine();
        engine.learn_api_pattern("api.example", "/v1/slow", "GET", LearnSource::new("test"));

        for _ in 0..10 {
            engine.record_api_pattern_failure(
                "api.example",
                "/v1/slow",
                "GET",
                FailureCategory::Timeout,
                None,
            );
        }
        assert!(engine.store().anti_patterns().is_empty());
    }

    #[test]
    fn test_selector_asymmetric_bump_and_penalty() {
        let engine = engine();
        engine.learn_selector("example.com", "article.post", "article", None);
        engine.learn_selector("example.com", "article.post", "article", None);

        let chain = engine.get_selector_chain("example.com", "article");
        assert_eq!(chain[0].priority, 51); // 50 on insert, +1 on re-learn
        assert_eq!(chain[0].success_count, 2);

        engine.record_selector_failure("example.com", "article.post", "article");
        let chain = engine.get_selector_chain("example.com", "article");
        assert_eq!(chain[0].priority, 46); // −5
        assert_eq!(chain[0].failure_count, 1);
    }

    #[test]
    fn test_selector_chain_stays_sorted() {
        let engine = engine();
        engine.learn_selector("example.com", "div.a", "article", None);
        engine.learn_selector("example.com", "div.b", "article", None);
        for _ in 0..10 {
            engine.learn_selector("example.com", "div.b", "article", None);
        }

        let chain = engine.get_selector_chain("example.com", "article");
        assert_eq!(chain[0].selector, "div.b");
        assert!(chain.windows(2).all(|w| w[0].priority >= w[1].priority));
    }

    #[test]
    fn test_group_selectors_as_fallback() {
        let groups = DomainGroupConfig::new(vec![DomainGroup::new(
            "news",
            vec!["a.example".into(), "b.example".into()],
        )
        .with_content_selectors(vec!["div.story".into()])]);
        let engine = LearningEngine::new(KnowledgeStore::in_memory()).with_groups(groups);

        let chain = engine.get_selector_chain("a.example", "article");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].selector, "div.story");
    }

    #[test]
    fn test_preferred_tier_only_upgrades_cheaper() {
        let engine = engine();
        let sample = |tier: Tier| SuccessSample {
            tier,
            strategy: "static".into(),
            response_time_ms: 100,
            content_length: 1000,
            has_structured_data: false,
            has_framework_data: false,
            has_bypassable_apis: false,
        };

        engine.record_success("example.com", sample(Tier::Browser));
        engine.record_success("example.com", sample(Tier::Lightweight));
        let profile = engine.store().entry("example.com").unwrap().success_profile.unwrap();
        assert_eq!(profile.preferred_tier, Tier::Lightweight);

        // Never downgrades back toward expensive
        engine.record_success("example.com", sample(Tier::Browser));
        let profile = engine.store().entry("example.com").unwrap().success_profile.unwrap();
        assert_eq!(profile.preferred_tier, Tier::Lightweight);
    }

    #[test]
    fn test_ema_alpha() {
        let engine = engine();
        let mut sample = SuccessSample {
            tier: Tier::Intelligence,
            strategy: "static".into(),
            response_time_ms: 100,
            content_length: 1000,
            has_structured_data: false,
            has_framework_data: false,
            has_bypassable_apis: false,
        };
        engine.record_success("example.com", sample.clone());
        sample.response_time_ms = 200;
        engine.record_success("example.com", sample);

        let profile = engine.store().entry("example.com").unwrap().success_profile.unwrap();
        // 0.3 × 200 + 0.7 × 100 = 130
        assert!((profile.avg_response_time_ms - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_backoff_on_rate_limit() {
        let engine = engine();
        for _ in 0..3 {
            engine.record_failure(
                "example.com",
                FailureContext::new(FailureType::RateLimited),
            );
        }

        let patterns = engine.get_failure_patterns("example.com");
        assert_eq!(patterns.most_common_type, Some(FailureType::RateLimited));
        assert!(patterns.should_backoff);

        let entry = engine.store().entry("example.com").unwrap();
        assert!((entry.overall_success_rate - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_classify_error_mapping() {
        assert_eq!(
            LearningEngine::classify_error("", Some(401)),
            FailureType::AuthExpired
        );
        assert_eq!(
            LearningEngine::classify_error("", Some(403)),
            FailureType::AuthExpired
        );
        assert_eq!(
            LearningEngine::classify_error("", Some(404)),
            FailureType::NotFound
        );
        assert_eq!(
            LearningEngine::classify_error("", Some(429)),
            FailureType::RateLimited
        );
        assert_eq!(
            LearningEngine::classify_error("", Some(503)),
            FailureType::ServerError
        );
        assert_eq!(
            LearningEngine::classify_error("connection timeout", None),
            FailureType::Timeout
        );
        assert_eq!(
            LearningEngine::classify_error("request blocked by cloudflare", None),
            FailureType::Blocked
        );
        assert_eq!(
            LearningEngine::classify_error("something odd", None),
            FailureType::Unknown
        );
    }

    #[test]
    fn test_find_pattern_exact_beats_prefix() {
        let engine = engine();
        engine.learn_api_pattern(
            "api.example",
            "https://api.example/v1",
            "GET",
            LearnSource::new("test"),
        );
        engine.learn_api_pattern(
            "api.example",
            "https://api.example/v1/items",
            "GET",
            LearnSource::new("test"),
        );

        let hit = engine.find_pattern("https://api.example/v1/items").unwrap();
        assert_eq!(hit.endpoint, "https://api.example/v1/items");
        assert_eq!(hit.kind, MatchKind::Exact);

        let prefix_hit = engine.find_pattern("https://api.example/v1/other").unwrap();
        assert_eq!(prefix_hit.endpoint, "https://api.example/v1");
        assert_eq!(prefix_hit.kind, MatchKind::Prefix);

        assert!(engine.find_pattern("https://unknown.example/x").is_none());
    }

    #[test]
    fn test_transfer_requires_same_group_and_is_idempotent() {
        let groups = DomainGroupConfig::new(vec![DomainGroup::new(
            "net",
            vec!["a.example".into(), "b.example".into()],
        )]);
        let engine = LearningEngine::new(KnowledgeStore::in_memory()).with_groups(groups);

        for _ in 0..20 {
            engine.learn_selector("a.example", "div.content", "article", None);
        }
        let source_priority = engine.get_selector_chain("a.example", "article")[0].priority;

        // Different group (unknown domain): no-op
        assert!(!engine.transfer_patterns("a.example", "c.example"));

        assert!(engine.transfer_patterns("a.example", "b.example"));
        let chain = engine.get_selector_chain("b.example", "article");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].priority, (source_priority as f64 * 0.5) as u8);
        assert_eq!(chain[0].success_count, 0);

        // Idempotent across repeated calls
        assert!(engine.transfer_patterns("a.example", "b.example"));
        assert_eq!(engine.get_selector_chain("b.example", "article").len(), 1);
    }

    #[test]
    fn test_pagination_inference() {
        let engine = engine();

        let query = engine
            .learn_pagination_pattern(
                "example.com",
                &[
                    "https://example.com/posts?page=1".to_string(),
                    "https://example.com/posts?page=2".to_string(),
                ],
            )
            .unwrap();
        assert_eq!(query.kind, PaginationKind::QueryParam);
        assert_eq!(query.param.as_deref(), Some("page"));

        let path = engine
            .learn_pagination_pattern(
                "example.com",
                &[
                    "https://example.com/archive/1".to_string(),
                    "https://example.com/archive/2".to_string(),
                ],
            )
            .unwrap();
        assert_eq!(path.kind, PaginationKind::PathSegment);
        assert_eq!(path.template.as_deref(), Some("/archive/{page}"));

        let fallback = engine
            .learn_pagination_pattern(
                "example.com",
                &[
                    "https://example.com/list/alpha".to_string(),
                    "https://example.com/list/beta".to_string(),
                ],
            )
            .unwrap();
        assert_eq!(fallback.kind, PaginationKind::NextButton);

        assert!(engine
            .learn_pagination_pattern("example.com", &["https://example.com/one".to_string()])
            .is_none());
    }

    #[test]
    fn test_pattern_failure_feedback_thresholds() {
        let engine = engine();
        engine.learn_api_pattern("api.example", "/v1/data", "GET", LearnSource::new("test"));

        // Severe category: first demotion at 2, second at 4
        engine.record_pattern_failure(
            "api.example",
            "/v1/data",
            FailureCategory::WrongEndpoint,
            Some("payload shape changed"),
        );
        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].confidence, Confidence::High);

        engine.record_pattern_failure(
            "api.example",
            "/v1/data",
            FailureCategory::WrongEndpoint,
            None,
        );
        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].confidence, Confidence::Medium);
        assert!(!entry.api_patterns[0].can_bypass);

        for _ in 0..2 {
            engine.record_pattern_failure(
                "api.example",
                "/v1/data",
                FailureCategory::WrongEndpoint,
                None,
            );
        }
        let entry = engine.store().entry("api.example").unwrap();
        assert_eq!(entry.api_patterns[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_content_check_builds_refresh_pattern() {
        let engine = engine();

        // First observed change seeds the baseline without a sample
        engine.record_content_check("example.com", "/news", true);
        let entry = engine.store().entry("example.com").unwrap();
        let pattern = entry.refresh_patterns.get("/news").unwrap();
        assert_eq!(pattern.sample_count, 0);
        assert!(pattern.last_changed.is_some());

        // Unchanged checks only move the checked timestamp
        engine.record_content_check("example.com", "/news", false);
        let entry = engine.store().entry("example.com").unwrap();
        assert_eq!(entry.refresh_patterns.get("/news").unwrap().sample_count, 0);

        // A later change records an interval sample
        engine.store().with_entry_mut("example.com", |entry| {
            entry.refresh_patterns.get_mut("/news").unwrap().last_changed =
                Some(Utc::now() - chrono::Duration::hours(10));
        });
        engine.record_content_check("example.com", "/news", true);
        let entry = engine.store().entry("example.com").unwrap();
        let pattern = entry.refresh_patterns.get("/news").unwrap();
        assert_eq!(pattern.sample_count, 1);
        assert!((pattern.avg_interval_hours - 10.0).abs() < 0.1);
    }

    #[test]
    fn test_learn_validator_extracts_frequent_words() {
        let engine = engine();
        let content = "kernel kernel kernel scheduler scheduler scheduler memory memory short words";
        engine.learn_validator("example.com", content, Some("/docs/"));

        let validators = engine.get_validators("example.com", "https://example.com/docs/page");
        assert_eq!(validators.len(), 1);
        assert!(validators[0].must_contain_any.contains(&"kernel".to_string()));
        assert!(validators[0].must_contain_any.contains(&"scheduler".to_string()));
        // "memory" appears twice only... freq threshold is 3
        assert!(!validators[0].must_contain_any.contains(&"memory".to_string()));
        assert_eq!(validators[0].expected_min_length, content.chars().count() / 2);

        // Different URL pattern: not applicable
        assert!(engine
            .get_validators("example.com", "https://example.com/blog/x")
            .is_empty());
    }

    #[test]
    fn test_semantic_confidence_bands() {
        assert_eq!(
            semantic_confidence(Confidence::High, 0.9),
            Confidence::High
        );
        assert_eq!(
            semantic_confidence(Confidence::High, 0.8),
            Confidence::Medium
        );
        assert_eq!(
            semantic_confidence(Confidence::Medium, 0.75),
            Confidence::Low
        );
        assert_eq!(semantic_confidence(Confidence::High, 0.6), Confidence::Low);
    }

    #[tokio::test]
    async fn test_find_pattern_async_semantic_fallback() {
        use crate::learning::semantic::{MemoryVectorStore, SemanticPatternMatcher};
        use crate::testing::MockEmbeddingProvider;

        let matcher = Arc::new(SemanticPatternMatcher::new(
            Arc::new(MockEmbeddingProvider::new()),
            Arc::new(MemoryVectorStore::new()),
        ));
        // Numeric path segments are stripped from signatures, so these
        // two URLs embed identically
        matcher
            .index_pattern(
                "api.example",
                "https://api.example/v1/posts/11111",
                "GET",
                Confidence::High,
            )
            .await
            .unwrap();

        let engine = LearningEngine::new(KnowledgeStore::in_memory())
            .with_semantic_matcher(Arc::clone(&matcher));

        // No stored entry: the exact/prefix path misses, semantic hits
        let hit = engine
            .find_pattern_async("https://api.example/v1/posts/99999", None)
            .await
            .unwrap();
        assert_eq!(hit.endpoint, "https://api.example/v1/posts/11111");
        assert!(matches!(hit.kind, MatchKind::Semantic { .. }));
        // Identical signature means similarity ≈ 1.0: no downgrade
        assert_eq!(hit.confidence, Confidence::High);
        assert!(hit.can_bypass);

        // A completely different URL shape finds nothing
        assert!(engine
            .find_pattern_async("https://other.example/about", None)
            .await
            .is_none());
    }

    #[test]
    fn test_refresh_interval_recommendation() {
        let engine = engine();
        // Fewer than 3 samples: default 24h
        assert_eq!(
            engine.get_recommended_refresh_interval("example.com", "/news"),
            24.0
        );

        // Seed a pattern with enough samples directly
        engine.store().with_entry_mut("example.com", |entry| {
            entry.refresh_patterns.insert(
                "/news".to_string(),
                RefreshPattern {
                    url_base: "/news".into(),
                    min_interval_hours: 2.0,
                    max_interval_hours: 8.0,
                    avg_interval_hours: 5.0,
                    sample_count: 3,
                    last_checked: Utc::now(),
                    last_changed: Some(Utc::now()),
                },
            );
        });
        assert!((engine.get_recommended_refresh_interval("example.com", "/news") - 4.0).abs() < 1e-9);

        // 0.8 × avg floors at 1
        engine.store().with_entry_mut("example.com", |entry| {
            entry
                .refresh_patterns
                .get_mut("/news")
                .unwrap()
                .avg_interval_hours = 0.5;
        });
        assert_eq!(
            engine.get_recommended_refresh_interval("example.com", "/news"),
            1.0
        );
    }
}
