//! Universal page-anomaly detection.
//!
//! Classifies challenge pages, captchas, rate-limit notices, error pages,
//! and empty shells without any prior learning. The detector only looks
//! at the HTML (plus an optional topic hint), so it works on domains the
//! engine has never seen.

use serde::{Deserialize, Serialize};

/// What kind of anomaly was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ChallengePage,
    Captcha,
    RateLimited,
    ErrorPage,
    EmptyContent,
    RedirectNotice,
}

/// What the caller should do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Wait `wait_time_ms` and retry
    Wait,
    /// A real browser session is required
    NeedsSession,
    /// Do not retry this URL
    Skip,
    /// Retry immediately (possibly with a different tier)
    Retry,
}

/// Classifier output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub is_anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<AnomalyType>,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<SuggestedAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time_ms: Option<u64>,
}

impl AnomalyReport {
    fn clean() -> Self {
        Self {
            is_anomaly: false,
            anomaly_type: None,
            confidence: 0.0,
            reasons: Vec::new(),
            suggested_action: None,
            wait_time_ms: None,
        }
    }
}

/// Weighted text patterns per anomaly type. Matching is
/// case-insensitive substring search over the raw HTML.
const CHALLENGE_PATTERNS: &[(&str, f64)] = &[
    ("checking your browser", 0.9),
    ("just a moment", 0.7),
    ("verify you are human", 0.8),
    ("verifying you are human", 0.8),
    ("attention required", 0.6),
    ("ddos protection", 0.7),
    ("cf-browser-verification", 0.9),
    ("challenge-platform", 0.8),
    ("enable javascript and cookies to continue", 0.7),
];

const CAPTCHA_PATTERNS: &[(&str, f64)] = &[
    ("g-recaptcha", 0.9),
    ("recaptcha", 0.7),
    ("hcaptcha", 0.8),
    ("cf-turnstile", 0.9),
    ("solve the captcha", 0.9),
    ("prove you are not a robot", 0.8),
];

const RATE_LIMIT_PATTERNS: &[(&str, f64)] = &[
    ("too many requests", 0.9),
    ("rate limit", 0.8),
    ("rate-limited", 0.8),
    ("try again later", 0.4),
    ("retry-after", 0.6),
    ("slow down", 0.5),
];

const ERROR_PAGE_PATTERNS: &[(&str, f64)] = &[
    ("page not found", 0.8),
    ("404 not found", 0.9),
    ("this page doesn't exist", 0.8),
    ("500 internal server error", 0.9),
    ("service unavailable", 0.8),
    ("something went wrong", 0.5),
    ("an error occurred", 0.5),
];

const REDIRECT_PATTERNS: &[(&str, f64)] = &[
    ("you are being redirected", 0.8),
    ("redirecting you", 0.7),
    ("http-equiv=\"refresh\"", 0.6),
];

/// Bodies shorter than this are suspicious on their own.
const SHORT_BODY_THRESHOLD: usize = 300;

/// Input to a single classification.
#[derive(Debug, Clone)]
pub struct AnomalyInput<'a> {
    pub html: &'a str,
    pub url: &'a str,
    pub expected_topic: Option<&'a str>,
}

/// Stateless classifier. Cheap enough to run on every fetched page.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, input: &AnomalyInput<'_>) -> AnomalyReport {
        let lower = input.html.to_ascii_lowercase();
        let mut reasons = Vec::new();

        let challenge = score_patterns(&lower, CHALLENGE_PATTERNS, "challenge", &mut reasons);
        let captcha = score_patterns(&lower, CAPTCHA_PATTERNS, "captcha", &mut reasons);
        let rate_limited = score_patterns(&lower, RATE_LIMIT_PATTERNS, "rate-limit", &mut reasons);
        let error_page = score_patterns(&lower, ERROR_PAGE_PATTERNS, "error-page", &mut reasons);
        let redirect = score_patterns(&lower, REDIRECT_PATTERNS, "redirect", &mut reasons);

        // Content length and structure
        let visible_len = visible_text_len(&lower);
        let mut empty = 0.0;
        if visible_len < SHORT_BODY_THRESHOLD {
            empty += 0.5;
            reasons.push(format!("very short visible body ({visible_len} chars)"));
        }
        if !has_structure(&lower) {
            empty += 0.3;
            reasons.push("no paragraphs, lists, or headings".to_string());
        }

        // Topic-term overlap, when a topic hint was supplied
        let mut topic_penalty = 0.0;
        if let Some(topic) = input.expected_topic {
            let overlap = topic_overlap(&lower, topic);
            if overlap < 0.2 {
                topic_penalty = 0.2;
                reasons.push(format!("topic overlap {overlap:.2} below 0.20"));
            }
        }

        let mut candidates = [
            (AnomalyType::Captcha, captcha),
            (AnomalyType::ChallengePage, challenge),
            (AnomalyType::RateLimited, rate_limited),
            (AnomalyType::ErrorPage, error_page),
            (AnomalyType::RedirectNotice, redirect),
            (AnomalyType::EmptyContent, empty),
        ];
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (anomaly_type, base_score) = candidates[0];
        let confidence = (base_score + topic_penalty).min(1.0);

        if confidence <= 0.5 {
            let mut report = AnomalyReport::clean();
            report.confidence = confidence;
            report.reasons = reasons;
            return report;
        }

        let (action, wait_time_ms) = match anomaly_type {
            AnomalyType::ChallengePage | AnomalyType::RedirectNotice => {
                (SuggestedAction::Wait, Some(10_000))
            }
            AnomalyType::Captcha => (SuggestedAction::NeedsSession, None),
            AnomalyType::RateLimited => (SuggestedAction::Wait, Some(60_000)),
            AnomalyType::ErrorPage => (SuggestedAction::Skip, None),
            AnomalyType::EmptyContent => (SuggestedAction::Retry, None),
        };

        tracing::debug!(
            url = %input.url,
            anomaly = ?anomaly_type,
            confidence = confidence,
            "anomaly detected"
        );

        AnomalyReport {
            is_anomaly: true,
            anomaly_type: Some(anomaly_type),
            confidence,
            reasons,
            suggested_action: Some(action),
            wait_time_ms,
        }
    }
}

fn score_patterns(
    lower_html: &str,
    patterns: &[(&str, f64)],
    label: &str,
    reasons: &mut Vec<String>,
) -> f64 {
    let mut score: f64 = 0.0;
    for (pattern, weight) in patterns {
        if lower_html.contains(pattern) {
            score = score.max(*weight) + (score.min(*weight) * 0.3);
            reasons.push(format!("{label} marker: {pattern:?}"));
        }
    }
    score.min(1.0)
}

/// Rough visible-text length: tags stripped, whitespace collapsed.
fn visible_text_len(html: &str) -> usize {
    let mut len = 0usize;
    let mut in_tag = false;
    let mut last_space = true;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => {
                if c.is_whitespace() {
                    if !last_space {
                        len += 1;
                        last_space = true;
                    }
                } else {
                    len += 1;
                    last_space = false;
                }
            }
            _ => {}
        }
    }
    len
}

fn has_structure(lower_html: &str) -> bool {
    lower_html.contains("<p")
        || lower_html.contains("<li")
        || lower_html.contains("<h1")
        || lower_html.contains("<h2")
        || lower_html.contains("<h3")
        || lower_html.contains("<article")
}

/// Share of topic terms (len > 3) present in the page.
fn topic_overlap(lower_html: &str, topic: &str) -> f64 {
    let terms: Vec<String> = topic
        .to_ascii_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 3)
        .map(String::from)
        .collect();
    if terms.is_empty() {
        return 1.0;
    }
    let hits = terms.iter().filter(|t| lower_html.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}
