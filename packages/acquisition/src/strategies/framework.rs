//! Framework-data strategies: SSR payloads embedded by Next.js, Nuxt,
//! Angular Universal, VitePress, VuePress, and Gatsby.
//!
//! Each strategy is gated on a framework marker, pulls the embedded
//! JSON, and feeds it through the typed text-leaf walker. Frameworks
//! that ship markup instead of a payload fall back to a region parse
//! with the framework's content selector.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::strategies::json_walk::{collect_text_leaves, find_title, WalkConfig};
use crate::strategies::static_parse::parse_content;
use crate::strategies::{Strategy, StrategyContext, StrategyHit, StrategyOutcome};
use crate::types::content::{Confidence, ExtractedContent};

/// Minimum combined leaf text before a framework payload counts as
/// content.
const MIN_WALK_TEXT_LEN: usize = 80;

pub fn framework_strategies() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(NextJsStrategy),
        Arc::new(NuxtStrategy),
        Arc::new(AngularStrategy),
        Arc::new(VitePressStrategy),
        Arc::new(VuePressStrategy),
        Arc::new(GatsbyStrategy),
    ]
}

/// Build a hit from a walked payload, or None when the payload holds
/// too little prose.
fn hit_from_payload(html: &str, payload: Value) -> Option<StrategyHit> {
    let leaves = collect_text_leaves(&payload, &WalkConfig::default());
    let text = leaves.join("\n\n");
    if text.len() < MIN_WALK_TEXT_LEN {
        return None;
    }

    let title = find_title(&payload)
        .or_else(|| page_title(html))
        .unwrap_or_default();

    let content = ExtractedContent::plain(title, text).with_structured(payload);
    Some(StrategyHit::new(content))
}

fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").unwrap();
    let title: String = doc.select(&selector).next()?.text().collect();
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Extract a JSON value that follows `marker` in a script: either a
/// bare object/array literal or a `JSON.parse("...")` call.
pub fn extract_json_after(source: &str, marker: &str) -> Option<Value> {
    let start = source.find(marker)? + marker.len();
    let rest = &source[start..];
    let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=');

    if let Some(stripped) = rest.strip_prefix("JSON.parse(") {
        let literal = read_js_string_literal(stripped)?;
        return serde_json::from_str(&literal).ok();
    }

    let open = rest.chars().next()?;
    if open != '{' && open != '[' {
        return None;
    }
    let body = read_balanced(rest, open)?;
    serde_json::from_str(body).ok()
}

/// Read a balanced `{...}` or `[...]` span, string-aware.
fn read_balanced(source: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (i, c) in source.char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a quoted JS string literal and unescape it.
fn read_js_string_literal(source: &str) -> Option<String> {
    let mut chars = source.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }

    let mut out = String::new();
    let mut escaped = false;
    for (_, c) in chars {
        if escaped {
            match c {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                '\'' => out.push('\''),
                '/' => out.push('/'),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
    None
}

fn inline_scripts(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("script").unwrap();
    doc.select(&selector)
        .filter(|el| el.value().attr("src").is_none())
        .map(|el| el.text().collect::<String>())
        .collect()
}

fn generator_meta(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="generator"]"#).unwrap();
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(String::from)
}

/// Next.js: `<script id="__NEXT_DATA__" type="application/json">`.
pub struct NextJsStrategy;

#[async_trait]
impl Strategy for NextJsStrategy {
    fn name(&self) -> &'static str {
        "framework:nextjs"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        let doc = Html::parse_document(html);
        let selector = Selector::parse("script#__NEXT_DATA__").unwrap();
        let Some(el) = doc.select(&selector).next() else {
            return Ok(None);
        };
        let raw: String = el.text().collect();
        let payload: Value = serde_json::from_str(raw.trim())
            .map_err(|e| format!("__NEXT_DATA__ parse error: {e}"))?;

        Ok(hit_from_payload(html, payload))
    }
}

/// Nuxt: `window.__NUXT__ = {...}` (function-wrapped payloads are
/// left to the sandbox tier).
pub struct NuxtStrategy;

#[async_trait]
impl Strategy for NuxtStrategy {
    fn name(&self) -> &'static str {
        "framework:nuxt"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        if !html.contains("__NUXT__") {
            return Ok(None);
        }
        for script in inline_scripts(html) {
            if let Some(payload) = extract_json_after(&script, "window.__NUXT__") {
                return Ok(hit_from_payload(html, payload));
            }
        }
        Ok(None)
    }
}

/// Angular Universal transfer state:
/// `#serverApp-state | #transfer-state | #ng-state | script[ngh]`.
pub struct AngularStrategy;

#[async_trait]
impl Strategy for AngularStrategy {
    fn name(&self) -> &'static str {
        "framework:angular"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        let doc = Html::parse_document(html);
        let selectors = [
            "script#serverApp-state",
            "script#transfer-state",
            "script#ng-state",
            "script[ngh]",
        ];

        for candidate in selectors {
            let selector = Selector::parse(candidate).unwrap();
            if let Some(el) = doc.select(&selector).next() {
                let raw: String = el.text().collect();
                let decoded = decode_angular_escapes(raw.trim());
                if let Ok(payload) = serde_json::from_str::<Value>(&decoded) {
                    return Ok(hit_from_payload(html, payload));
                }
            }
        }
        Ok(None)
    }
}

/// Angular escapes its transfer-state JSON with a private entity set.
fn decode_angular_escapes(raw: &str) -> String {
    raw.replace("&q;", "\"")
        .replace("&a;", "&")
        .replace("&s;", "'")
        .replace("&l;", "<")
        .replace("&g;", ">")
}

/// VitePress: route-data payload, hash-map marker, or generator meta;
/// markup fallback is the `.vp-doc` region.
pub struct VitePressStrategy;

#[async_trait]
impl Strategy for VitePressStrategy {
    fn name(&self) -> &'static str {
        "framework:vitepress"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        let generator = generator_meta(html).unwrap_or_default();
        let detected = html.contains("__VP_ROUTE_DATA__")
            || html.contains("__VP_HASH_MAP__")
            || generator.starts_with("VitePress");
        if !detected {
            return Ok(None);
        }

        for script in inline_scripts(html) {
            if let Some(payload) = extract_json_after(&script, "__VP_ROUTE_DATA__") {
                if let Some(hit) = hit_from_payload(html, payload) {
                    return Ok(Some(hit));
                }
            }
        }

        Ok(region_fallback(html, "div.vp-doc"))
    }
}

/// VuePress: SSR context, generator meta, or the v1 theme content
/// class.
pub struct VuePressStrategy;

#[async_trait]
impl Strategy for VuePressStrategy {
    fn name(&self) -> &'static str {
        "framework:vuepress"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        let generator = generator_meta(html).unwrap_or_default();
        let detected = html.contains("__VUEPRESS_SSR_CONTEXT__")
            || generator.starts_with("VuePress")
            || html.contains("theme-default-content");
        if !detected {
            return Ok(None);
        }

        for script in inline_scripts(html) {
            if let Some(payload) = extract_json_after(&script, "__VUEPRESS_SSR_CONTEXT__") {
                if let Some(hit) = hit_from_payload(html, payload) {
                    return Ok(Some(hit));
                }
            }
        }

        Ok(region_fallback(html, "div.theme-default-content"))
    }
}

/// Gatsby: `window.___GATSBY` marker; content lives in the
/// `#___gatsby` SSR container.
pub struct GatsbyStrategy;

#[async_trait]
impl Strategy for GatsbyStrategy {
    fn name(&self) -> &'static str {
        "framework:gatsby"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        if !html.contains("___GATSBY") {
            return Ok(None);
        }

        for script in inline_scripts(html) {
            if let Some(payload) = extract_json_after(&script, "window.___GATSBY") {
                if let Some(hit) = hit_from_payload(html, payload) {
                    return Ok(Some(hit));
                }
            }
        }

        Ok(region_fallback(html, "div#___gatsby"))
    }
}

/// Markup fallback: parse the framework's content region statically.
fn region_fallback(html: &str, selector: &str) -> Option<StrategyHit> {
    let parsed = parse_content(html, &[selector.to_string()])?;
    // Only accept the fallback when the framework region itself
    // matched; body-level fallback belongs to the static strategy.
    if parsed.selector_used.as_deref() != Some(selector) {
        return None;
    }
    let content = ExtractedContent {
        title: parsed.title,
        text: parsed.text,
        markdown: parsed.markdown,
        structured: None,
    };
    let mut hit = StrategyHit::new(content);
    hit.selector_used = parsed.selector_used;
    Some(hit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/post").unwrap()
    }

    #[tokio::test]
    async fn test_nextjs_payload_walked() {
        let body = "This is the article body text, long enough to pass the minimum threshold for framework payload extraction.";
        let html = format!(
            r#"<html><head><title>Fallback</title></head><body>
            <script id="__NEXT_DATA__" type="application/json">
            {{"props":{{"pageProps":{{"post":{{"title":"Next Post","content":"{body}"}}}}}},"buildId":"x"}}
            </script></body></html>"#
        );

        let hit = NextJsStrategy
            .extract(&url(), &html, &crate::testing::test_context())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(hit.content.title, "Next Post");
        assert!(hit.content.text.contains("article body text"));
        assert!(hit.content.structured.is_some());
    }

    #[tokio::test]
    async fn test_nuxt_assignment_extracted() {
        let body = "Nuxt page content with enough prose to satisfy the walker minimum length requirement for extraction.";
        let html = format!(
            r#"<html><body><script>window.__NUXT__ = {{"data":[{{"title":"Nuxt Page","body":"{body}"}}]}};</script></body></html>"#
        );

        let hit = NuxtStrategy
            .extract(&url(), &html, &crate::testing::test_context())
            .await
            .unwrap()
            .unwrap();

        assert!(hit.content.text.contains("Nuxt page content"));
    }

    #[tokio::test]
    async fn test_angular_escaped_state() {
        let html = r#"<html><body>
            <script id="ng-state" type="application/json">{&q;article&q;:{&q;headline&q;:&q;Ng Title&q;,&q;body&q;:&q;Angular transfer state body content that is comfortably past the minimum threshold.&q;}}</script>
            </body></html>"#;

        let hit = AngularStrategy
            .extract(&url(), html, &crate::testing::test_context())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(hit.content.title, "Ng Title");
    }

    #[tokio::test]
    async fn test_gatsby_region_fallback() {
        let paragraph = "Gatsby rendered paragraph with plenty of text to count as article content for the fallback parser. ".repeat(3);
        let html = format!(
            r#"<html><body><div id="___gatsby"><p>{paragraph}</p></div>
            <script>window.___GATSBY = true;</script></body></html>"#
        );

        let hit = GatsbyStrategy
            .extract(&url(), &html, &crate::testing::test_context())
            .await
            .unwrap()
            .unwrap();

        assert!(hit.content.text.contains("Gatsby rendered paragraph"));
    }

    #[tokio::test]
    async fn test_non_framework_page_is_none() {
        let html = "<html><body><p>plain page</p></body></html>";
        assert!(NextJsStrategy
            .extract(&url(), html, &crate::testing::test_context())
            .await
            .unwrap()
            .is_none());
        assert!(NuxtStrategy
            .extract(&url(), html, &crate::testing::test_context())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_extract_json_after_json_parse_form() {
        let script = r#"window.__VP_ROUTE_DATA__ = JSON.parse("{\"title\":\"Doc\"}");"#;
        let value = extract_json_after(script, "__VP_ROUTE_DATA__").unwrap();
        assert_eq!(value["title"], "Doc");
    }

    #[test]
    fn test_read_balanced_string_aware() {
        let source = r#"{"a":"}b{","c":{"d":1}} trailing"#;
        let span = read_balanced(source, '{').unwrap();
        assert!(span.ends_with("}}"));
        let value: Value = serde_json::from_str(span).unwrap();
        assert_eq!(value["c"]["d"], 1);
    }
}
