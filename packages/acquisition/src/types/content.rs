//! Content result types - what a successful acquisition returns.

use serde::{Deserialize, Serialize};

/// Ordinal confidence grade carried by API patterns and extraction results.
///
/// `can_bypass` on an API pattern mirrors this grade: only `High`
/// confidence patterns may bypass page rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Numeric value used by confidence decay (high=1.0, medium=0.6, low=0.3).
    pub fn numeric(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.6,
            Confidence::Low => 0.3,
        }
    }

    /// Re-quantize a numeric confidence back to a grade.
    ///
    /// Uses the midpoints between the grade values: ≥0.8 is high,
    /// ≥0.45 is medium, otherwise low.
    pub fn from_numeric(value: f64) -> Self {
        if value >= 0.8 {
            Confidence::High
        } else if value >= 0.45 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// One step down the ordinal scale (semantic matches use this).
    pub fn downgraded(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Extracted content in the three canonical renditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Page or item title
    pub title: String,

    /// Plain text rendition
    pub text: String,

    /// Markdown rendition
    pub markdown: String,

    /// Structured payload when the strategy produced one (API responses,
    /// framework data, JSON-LD)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl ExtractedContent {
    /// Create content where text and markdown are the same rendition.
    pub fn plain(title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            title: title.into(),
            markdown: text.clone(),
            text,
            structured: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }

    /// Length of the plain-text rendition in characters.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Metadata about how a result was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    /// URL as requested
    pub url: String,

    /// URL the content actually came from (after redirects, or the API
    /// endpoint for `api:*` strategies)
    pub final_url: String,

    /// Name of the strategy that produced the content
    pub strategy: String,

    /// Every strategy tried for this request, in order, including the
    /// winning one. A strategy appears at most once.
    pub strategies_attempted: Vec<String>,

    /// Wall-clock time spent, milliseconds
    pub timing_ms: u64,

    /// Confidence declared by the winning strategy
    pub confidence: Confidence,

    /// Selector that located the content region, when the strategy
    /// used one (feeds selector learning)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_used: Option<String>,
}

impl ResultMeta {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            strategy: String::new(),
            strategies_attempted: Vec::new(),
            timing_ms: 0,
            confidence: Confidence::Low,
            selector_used: None,
        }
    }
}

/// The result of a single extraction attempt.
///
/// A failed extraction still carries meta (which strategies ran) and
/// warnings; `error` is set and `content` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResult {
    pub content: ExtractedContent,
    pub meta: ResultMeta,

    /// Non-fatal notes accumulated along the strategy chain
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Set when every strategy failed (or the forced one did)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContentResult {
    /// Successful result from a strategy.
    pub fn ok(content: ExtractedContent, meta: ResultMeta) -> Self {
        Self {
            content,
            meta,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Failed result carrying the attempted-strategy trail.
    pub fn failed(meta: ResultMeta, error: impl Into<String>) -> Self {
        Self {
            content: ExtractedContent::default(),
            meta,
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_numeric_round_trip() {
        for grade in [Confidence::High, Confidence::Medium, Confidence::Low] {
            assert_eq!(Confidence::from_numeric(grade.numeric()), grade);
        }
    }

    #[test]
    fn test_confidence_downgrade() {
        assert_eq!(Confidence::High.downgraded(), Confidence::Medium);
        assert_eq!(Confidence::Medium.downgraded(), Confidence::Low);
        assert_eq!(Confidence::Low.downgraded(), Confidence::Low);
    }

    #[test]
    fn test_text_len_counts_chars() {
        let content = ExtractedContent::plain("t", "héllo");
        assert_eq!(content.text_len(), 5);
    }
}
