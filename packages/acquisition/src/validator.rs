//! Content validation: the gate between a strategy hit and a returned
//! result.
//!
//! Three checks, in order: minimum length (strategies may override the
//! default), any matching learned validator, and generic
//! incomplete-content markers. A rejected result sends the pipeline to
//! the next strategy.

use crate::types::domain::LearnedValidator;

/// Generic markers of a page that has not finished rendering.
///
/// Known limitation, preserved from observed behavior: the `"Loading"`
/// check is a plain substring match and can false-positive on articles
/// that are genuinely about loading screens.
const INCOMPLETE_MARKERS: &[&str] = &["Loading", "Please enable JavaScript"];

#[derive(Debug, Clone)]
pub struct ValidationInput<'a> {
    pub text: &'a str,
    pub url: &'a str,
    pub min_content_length: usize,
    pub learned: &'a [LearnedValidator],
}

/// Stateless validator; learned-validator counters are updated by the
/// learning engine after the verdict.
#[derive(Debug, Clone, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    /// `Ok(())` when the content is acceptable, `Err(reason)` otherwise.
    pub fn validate(&self, input: &ValidationInput<'_>) -> Result<(), String> {
        let text = input.text.trim();
        if text.is_empty() {
            return Err("empty content".to_string());
        }

        let len = text.chars().count();
        if len < input.min_content_length {
            return Err(format!(
                "content too short: {len} < {}",
                input.min_content_length
            ));
        }

        for validator in input.learned {
            if validator.applies_to(input.url) {
                validator.check(text)?;
            }
        }

        for marker in INCOMPLETE_MARKERS {
            if text.contains(marker) {
                return Err(format!("incomplete-content marker present: {marker:?}"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(text: &'a str, learned: &'a [LearnedValidator]) -> ValidationInput<'a> {
        ValidationInput {
            text,
            url: "https://example.com/page",
            min_content_length: 20,
            learned,
        }
    }

    #[test]
    fn test_length_gate() {
        let validator = ContentValidator::new();
        assert!(validator.validate(&input("short", &[])).is_err());

        let long = "long enough content to pass the gate".to_string();
        assert!(validator.validate(&input(&long, &[])).is_ok());
    }

    #[test]
    fn test_loading_marker_rejects() {
        let validator = ContentValidator::new();
        let text = "Loading more stories, please wait while we fetch them";
        let err = validator.validate(&input(text, &[])).unwrap_err();
        assert!(err.contains("Loading"));
    }

    #[test]
    fn test_learned_validator_applies() {
        let validator = ContentValidator::new();
        let learned = vec![LearnedValidator {
            url_pattern: None,
            expected_min_length: 10,
            expected_max_length: None,
            must_contain_any: vec!["rust".into()],
            must_contain_all: vec![],
            must_not_contain: vec![],
            success_count: 0,
            failure_count: 0,
        }];

        let about_rust = "a reasonably long text mentioning rust tooling";
        assert!(validator.validate(&input(about_rust, &learned)).is_ok());

        let about_go = "a reasonably long text mentioning golang tooling";
        assert!(validator.validate(&input(about_go, &learned)).is_err());
    }

    #[test]
    fn test_empty_rejected() {
        let validator = ContentValidator::new();
        assert!(validator.validate(&input("   ", &[])).is_err());
    }
}
