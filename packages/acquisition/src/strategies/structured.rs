//! Structured-data strategies: JSON-LD blocks and OpenGraph metas.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::strategies::static_parse::decode_entities;
use crate::strategies::{Strategy, StrategyContext, StrategyHit, StrategyOutcome};
use crate::types::content::{Confidence, ExtractedContent};

pub fn structured_strategies() -> Vec<Arc<dyn Strategy>> {
    vec![Arc::new(JsonLdStrategy), Arc::new(OpenGraphStrategy)]
}

/// `application/ld+json` blocks. A page may carry several; the first
/// block with a `name` or `headline` wins for the title, and article
/// bodies/descriptions are concatenated in document order.
pub struct JsonLdStrategy;

#[async_trait]
impl Strategy for JsonLdStrategy {
    fn name(&self) -> &'static str {
        "structured:jsonld"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        let blocks = extract_jsonld_blocks(html);
        if blocks.is_empty() {
            return Ok(None);
        }

        let mut title = String::new();
        let mut body_parts = Vec::new();
        let mut structured = Vec::new();

        for block in &blocks {
            if title.is_empty() {
                if let Some(t) = first_string(block, &["name", "headline"]) {
                    title = t;
                }
            }
            for key in ["articleBody", "text", "description", "abstract"] {
                if let Some(text) = first_string(block, &[key]) {
                    if !body_parts.contains(&text) {
                        body_parts.push(text);
                    }
                }
            }
            structured.push(block.clone());
        }

        if body_parts.is_empty() {
            return Ok(None);
        }

        let text = body_parts.join("\n\n");
        let content = ExtractedContent::plain(title, text)
            .with_structured(Value::Array(structured));
        Ok(Some(StrategyHit::new(content)))
    }
}

/// JSON-LD script payloads, parsed leniently. Arrays and `@graph`
/// wrappers are flattened.
pub fn extract_jsonld_blocks(html: &str) -> Vec<Value> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();

    let mut blocks = Vec::new();
    for el in doc.select(&selector) {
        let raw: String = el.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        match value {
            Value::Array(items) => blocks.extend(items),
            Value::Object(ref map) if map.contains_key("@graph") => {
                if let Some(Value::Array(items)) = map.get("@graph") {
                    blocks.extend(items.clone());
                } else {
                    blocks.push(value);
                }
            }
            other => blocks.push(other),
        }
    }
    blocks
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    let map = value.as_object()?;
    for key in keys {
        if let Some(Value::String(s)) = map.get(*key) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// `meta[property="og:*"]` tags. Descriptions are short, so this
/// strategy mostly wins on pages that have nothing better; the
/// validator keeps it honest.
pub struct OpenGraphStrategy;

#[async_trait]
impl Strategy for OpenGraphStrategy {
    fn name(&self) -> &'static str {
        "structured:opengraph"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    async fn extract(&self, _url: &Url, html: &str, _ctx: &StrategyContext) -> StrategyOutcome {
        let tags = extract_og_tags(html);
        if tags.is_empty() {
            return Ok(None);
        }

        let title = tags.get("og:title").cloned().unwrap_or_default();
        let description = tags.get("og:description").cloned().unwrap_or_default();
        if title.is_empty() && description.is_empty() {
            return Ok(None);
        }

        let structured = serde_json::to_value(&tags).unwrap_or(Value::Null);
        let content =
            ExtractedContent::plain(title, description).with_structured(structured);
        Ok(Some(StrategyHit::new(content)))
    }
}

/// All `og:`-prefixed meta properties, first value wins.
pub fn extract_og_tags(html: &str) -> HashMap<String, String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("meta[property]").unwrap();

    let mut tags = HashMap::new();
    for el in doc.select(&selector) {
        let Some(property) = el.value().attr("property") else {
            continue;
        };
        if !property.starts_with("og:") {
            continue;
        }
        let Some(content) = el.value().attr("content") else {
            continue;
        };
        tags.entry(property.to_string())
            .or_insert_with(|| decode_entities(content.trim()));
    }
    tags
}
