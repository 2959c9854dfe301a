//! Typed text-leaf walker over arbitrary JSON.
//!
//! Framework payloads (`__NEXT_DATA__`, `__NUXT__`, Gatsby page data)
//! bury their prose in deeply nested objects. The walker visits a
//! [`serde_json::Value`] with a text-leaf predicate and a depth bound,
//! collecting likely-content strings in traversal order.

use serde_json::Value;

/// Minimum length for a string leaf to count as content.
pub const DEFAULT_MIN_LEAF_LEN: usize = 40;

/// Maximum recursion depth into the payload.
pub const DEFAULT_MAX_DEPTH: usize = 24;

/// Keys whose values are never content, whatever their length.
const NOISE_KEYS: &[&str] = &[
    "id", "url", "href", "src", "slug", "path", "route", "key", "hash",
    "token", "className", "class", "style", "color", "font", "image",
    "thumbnail", "icon", "buildId", "assetPrefix",
];

#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub min_leaf_len: usize,
    pub max_depth: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            min_leaf_len: DEFAULT_MIN_LEAF_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Whether a string leaf looks like prose rather than an identifier,
/// URL, or encoded blob.
pub fn is_text_leaf(value: &str, min_len: usize) -> bool {
    let trimmed = value.trim();
    if trimmed.len() < min_len {
        return false;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") || trimmed.starts_with("data:") {
        return false;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('<') {
        return false;
    }
    // Prose has spaces; identifiers and blobs rarely do
    trimmed.contains(' ')
}

/// Collect text-bearing leaves in traversal order.
pub fn collect_text_leaves(value: &Value, config: &WalkConfig) -> Vec<String> {
    let mut out = Vec::new();
    walk(value, None, 0, config, &mut out);
    out
}

fn walk(value: &Value, key: Option<&str>, depth: usize, config: &WalkConfig, out: &mut Vec<String>) {
    if depth > config.max_depth {
        return;
    }
    match value {
        Value::String(s) => {
            if let Some(key) = key {
                if NOISE_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k)) {
                    return;
                }
            }
            if is_text_leaf(s, config.min_leaf_len) {
                let trimmed = s.trim().to_string();
                // Adjacent duplicates show up when frameworks mirror
                // content across render passes
                if out.last().map(String::as_str) != Some(trimmed.as_str()) {
                    out.push(trimmed);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, key, depth + 1, config, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                walk(v, Some(k.as_str()), depth + 1, config, out);
            }
        }
        _ => {}
    }
}

/// Pull a plausible title out of a framework payload: the first
/// reasonably short string under a title-ish key.
pub fn find_title(value: &Value) -> Option<String> {
    const TITLE_KEYS: &[&str] = &["title", "headline", "name", "pageTitle"];

    fn search(value: &Value, depth: usize) -> Option<String> {
        if depth > 12 {
            return None;
        }
        match value {
            Value::Object(map) => {
                for key in TITLE_KEYS {
                    if let Some(Value::String(s)) = map.get(*key) {
                        let trimmed = s.trim();
                        if !trimmed.is_empty() && trimmed.len() <= 300 {
                            return Some(trimmed.to_string());
                        }
                    }
                }
                map.values().find_map(|v| search(v, depth + 1))
            }
            Value::Array(items) => items.iter().find_map(|v| search(v, depth + 1)),
            _ => None,
        }
    }

    search(value, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collects_prose_skips_noise() {
        let value = json!({
            "props": {
                "pageProps": {
                    "article": {
                        "title": "Short title",
                        "body": "This is a long paragraph of article text that should be collected by the walker.",
                        "url": "https://example.com/a-very-long-url-that-is-not-content-at-all/xyz",
                        "tags": ["a", "b"]
                    }
                }
            },
            "buildId": "abcdefabcdefabcdefabcdefabcdefabcdefabcd plus spaces to fool length"
        });

        let leaves = collect_text_leaves(&value, &WalkConfig::default());
        assert_eq!(leaves.len(), 1);
        assert!(leaves[0].starts_with("This is a long paragraph"));
    }

    #[test]
    fn test_depth_bound() {
        let mut value = json!("this deep string has spaces and is long enough to be collected");
        for _ in 0..30 {
            value = json!({ "level": value });
        }

        let leaves = collect_text_leaves(&value, &WalkConfig::default());
        assert!(leaves.is_empty());
    }

    #[test]
    fn test_adjacent_duplicates_collapsed() {
        let text = "the same long paragraph of text appearing twice in the payload body";
        let value = json!([text, text]);

        let leaves = collect_text_leaves(&value, &WalkConfig::default());
        assert_eq!(leaves.len(), 1);
    }

    #[test]
    fn test_find_title() {
        let value = json!({
            "props": { "pageProps": { "article": { "headline": "Hello World" } } }
        });
        assert_eq!(find_title(&value).as_deref(), Some("Hello World"));

        let no_title = json!({ "data": [1, 2, 3] });
        assert_eq!(find_title(&no_title), None);
    }

    #[test]
    fn test_is_text_leaf_rejects_urls_and_json() {
        assert!(!is_text_leaf("https://example.com/page with spaces somehow padding", 10));
        assert!(!is_text_leaf("{\"key\": \"value with spaces and enough length\"}", 10));
        assert!(!is_text_leaf("<div>markup with spaces and enough length</div>", 10));
        assert!(is_text_leaf("ordinary sentence with plenty of words in it", 10));
    }
}
