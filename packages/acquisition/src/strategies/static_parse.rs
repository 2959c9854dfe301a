//! Static HTML parsing: strip page chrome, find the content region,
//! convert to markdown.
//!
//! Works on server-rendered pages without any JS execution. Learned
//! selector chains run ahead of the built-in region heuristics.

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::strategies::{Strategy, StrategyContext, StrategyHit, StrategyOutcome};
use crate::types::content::{Confidence, ExtractedContent};

/// Class/id fragments that mark removable chrome.
const CHROME_CLASS_PATTERNS: &[&str] = &[
    "cookie",
    "consent",
    "banner",
    "popup",
    "modal",
    "overlay",
    "advert",
    "adsbox",
    "ad-slot",
    "sidebar",
    "newsletter",
    "subscribe",
    "promo",
    "share-buttons",
    "related-posts",
    "comments",
];

/// Elements removed wholesale before region selection.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "aside", "iframe", "svg", "form",
];

pub struct StaticParseStrategy;

impl StaticParseStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StaticParseStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for StaticParseStrategy {
    fn name(&self) -> &'static str {
        "static"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if html.trim().is_empty() {
            return Ok(None);
        }

        let learned: Vec<String> = ctx
            .learned_selectors
            .iter()
            .map(|s| s.selector.clone())
            .collect();
        let Some(parsed) = parse_content(html, &learned) else {
            return Ok(None);
        };

        let content = ExtractedContent {
            title: parsed.title,
            text: parsed.text,
            markdown: parsed.markdown,
            structured: None,
        };

        let mut hit = StrategyHit::new(content);
        hit.selector_used = parsed.selector_used;
        Ok(Some(hit))
    }
}

pub struct ParsedContent {
    pub title: String,
    pub text: String,
    pub markdown: String,
    /// The learned or heuristic selector that located the region
    pub selector_used: Option<String>,
}

/// Full static parse: strip chrome, pick the region, convert.
///
/// `learned_selectors` are tried in order before the `article`/`main`/
/// body heuristics.
pub fn parse_content(html: &str, learned_selectors: &[String]) -> Option<ParsedContent> {
    let mut doc = Html::parse_document(html);
    strip_chrome(&mut doc);

    let title = extract_title(&doc);

    let mut selector_used = None;
    let mut region_html = None;

    for candidate in learned_selectors {
        if let Ok(selector) = Selector::parse(candidate) {
            if let Some(el) = doc.select(&selector).next() {
                let inner = el.inner_html();
                if !inner.trim().is_empty() {
                    selector_used = Some(candidate.clone());
                    region_html = Some(inner);
                    break;
                }
            }
        }
    }

    if region_html.is_none() {
        for candidate in ["article", "main", "body"] {
            let selector = Selector::parse(candidate).unwrap();
            if let Some(el) = doc.select(&selector).next() {
                let inner = el.inner_html();
                if !inner.trim().is_empty() {
                    if candidate != "body" {
                        selector_used = Some(candidate.to_string());
                    }
                    region_html = Some(inner);
                    break;
                }
            }
        }
    }

    let region_html = region_html?;
    let markdown = html_to_markdown(&region_html);
    let text = markdown_to_text(&markdown);

    if text.trim().is_empty() {
        return None;
    }

    Some(ParsedContent {
        title,
        text,
        markdown,
        selector_used,
    })
}

/// Detach chrome elements from the parsed tree.
fn strip_chrome(doc: &mut Html) {
    let mut to_detach = Vec::new();

    for node in doc.tree.nodes() {
        let scraper::Node::Element(el) = node.value() else {
            continue;
        };
        let name = el.name();
        if CHROME_TAGS.contains(&name) {
            to_detach.push(node.id());
            continue;
        }
        let class_attr = el.attr("class").unwrap_or("").to_ascii_lowercase();
        let id_attr = el.attr("id").unwrap_or("").to_ascii_lowercase();
        if CHROME_CLASS_PATTERNS
            .iter()
            .any(|p| class_attr.contains(p) || id_attr.contains(p))
        {
            to_detach.push(node.id());
        }
    }

    for id in to_detach {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn extract_title(doc: &Html) -> String {
    for candidate in ["title", "h1"] {
        let selector = Selector::parse(candidate).unwrap();
        if let Some(el) = doc.select(&selector).next() {
            let text: String = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Deterministic HTML → markdown mapping: `em → _x_`, `strong → **x**`,
/// headings preserved, links, lists, paragraphs.
pub fn html_to_markdown(html: &str) -> String {
    let mut text = html.to_string();

    // Remove scripts and styles that survived region extraction
    let script_pattern = regex::Regex::new(r"(?s)<script[^>]*>.*?</script>").unwrap();
    let style_pattern = regex::Regex::new(r"(?s)<style[^>]*>.*?</style>").unwrap();
    text = script_pattern.replace_all(&text, "").to_string();
    text = style_pattern.replace_all(&text, "").to_string();

    // Headings
    for level in 1..=6usize {
        let pattern =
            regex::Regex::new(&format!(r"(?s)<h{level}[^>]*>(.*?)</h{level}>")).unwrap();
        let hashes = "#".repeat(level);
        text = pattern
            .replace_all(&text, format!("\n{hashes} $1\n"))
            .to_string();
    }

    // Emphasis
    let em_pattern = regex::Regex::new(r"(?s)<em[^>]*>(.*?)</em>").unwrap();
    let i_pattern = regex::Regex::new(r"(?s)<i[^>]*>(.*?)</i>").unwrap();
    let strong_pattern = regex::Regex::new(r"(?s)<strong[^>]*>(.*?)</strong>").unwrap();
    let b_pattern = regex::Regex::new(r"(?s)<b[^>]*>(.*?)</b>").unwrap();
    text = em_pattern.replace_all(&text, "_$1_").to_string();
    text = i_pattern.replace_all(&text, "_$1_").to_string();
    text = strong_pattern.replace_all(&text, "**$1**").to_string();
    text = b_pattern.replace_all(&text, "**$1**").to_string();

    // Code
    let code_pattern = regex::Regex::new(r"(?s)<code[^>]*>(.*?)</code>").unwrap();
    let pre_pattern = regex::Regex::new(r"(?s)<pre[^>]*>(.*?)</pre>").unwrap();
    text = pre_pattern.replace_all(&text, "\n```\n$1\n```\n").to_string();
    text = code_pattern.replace_all(&text, "`$1`").to_string();

    // Blockquotes
    let quote_pattern = regex::Regex::new(r"(?s)<blockquote[^>]*>(.*?)</blockquote>").unwrap();
    text = quote_pattern.replace_all(&text, "\n> $1\n").to_string();

    // Paragraphs and line breaks
    let p_pattern = regex::Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap();
    let br_pattern = regex::Regex::new(r"<br\s*/?>").unwrap();
    text = p_pattern.replace_all(&text, "$1\n\n").to_string();
    text = br_pattern.replace_all(&text, "\n").to_string();

    // Links and images
    let img_pattern =
        regex::Regex::new(r#"<img[^>]*alt\s*=\s*["']([^"']*)["'][^>]*>"#).unwrap();
    text = img_pattern.replace_all(&text, "![$1]").to_string();
    let link_pattern =
        regex::Regex::new(r#"(?s)<a[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    text = link_pattern.replace_all(&text, "[$2]($1)").to_string();

    // Lists
    let li_pattern = regex::Regex::new(r"(?s)<li[^>]*>(.*?)</li>").unwrap();
    text = li_pattern.replace_all(&text, "- $1\n").to_string();

    // Remaining tags
    let tag_pattern = regex::Regex::new(r"<[^>]+>").unwrap();
    text = tag_pattern.replace_all(&text, "").to_string();

    // Whitespace cleanup
    let multi_newline = regex::Regex::new(r"\n{3,}").unwrap();
    text = multi_newline.replace_all(&text, "\n\n").to_string();

    decode_entities(&text).trim().to_string()
}

/// Plain text from markdown: emphasis and link syntax removed.
pub fn markdown_to_text(markdown: &str) -> String {
    let link_pattern = regex::Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap();
    let mut text = link_pattern.replace_all(markdown, "$1").to_string();

    text = text
        .replace("**", "")
        .replace("```", "")
        .replace('`', "");

    let heading_pattern = regex::Regex::new(r"(?m)^#{1,6}\s*").unwrap();
    text = heading_pattern.replace_all(&text, "").to_string();

    let emphasis_pattern = regex::Regex::new(r"_([^_]+)_").unwrap();
    text = emphasis_pattern.replace_all(&text, "$1").to_string();

    text.trim().to_string()
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
