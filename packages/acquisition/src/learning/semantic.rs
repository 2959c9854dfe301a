//! Semantic pattern matching (optional collaborator).
//!
//! Builds a textual signature for a URL, embeds it via a pluggable
//! provider, and searches a pluggable vector store for similar learned
//! patterns. Scoring combines vector similarity, pattern confidence,
//! and recency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use url::Url;

use crate::types::content::Confidence;

/// Embeds text into a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// A pattern embedding stored for retrieval.
#[derive(Debug, Clone)]
pub struct StoredPatternEmbedding {
    pub domain: String,
    pub endpoint: String,
    pub method: String,
    pub confidence: Confidence,
    pub last_used: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

/// Vector store seam; search returns `(record, cosine similarity)`.
#[async_trait]
pub trait PatternVectorStore: Send + Sync {
    async fn upsert(&self, record: StoredPatternEmbedding) -> Result<(), String>;

    async fn search(
        &self,
        embedding: &[f32],
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(StoredPatternEmbedding, f32)>, String>;
}

/// A semantic retrieval hit.
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub domain: String,
    pub endpoint: String,
    pub method: String,
    pub confidence: Confidence,
    pub similarity: f32,
    /// Combined similarity × confidence × recency score
    pub score: f32,
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Decompose a URL into the text that gets embedded: host with `www.`
/// stripped, path segments with numeric and UUID-like segments
/// removed, and query parameter names (not values).
pub fn url_signature(url: &Url) -> String {
    let host = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_ascii_lowercase();

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty() && !is_identifier_segment(s))
                .collect()
        })
        .unwrap_or_default();

    let mut params: Vec<String> = url.query_pairs().map(|(k, _)| k.to_string()).collect();
    params.sort();
    params.dedup();

    let mut signature = host;
    if !segments.is_empty() {
        signature.push(' ');
        signature.push_str(&segments.join(" "));
    }
    if !params.is_empty() {
        signature.push(' ');
        signature.push_str(&params.join(" "));
    }
    signature
}

/// Numeric ids and UUID-ish segments carry no semantics.
fn is_identifier_segment(segment: &str) -> bool {
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let hex_or_dash = segment
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == '-');
    hex_or_dash && segment.len() >= 16
}

/// The matcher itself: provider + store + threshold.
pub struct SemanticPatternMatcher {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn PatternVectorStore>,
    pub min_similarity: f32,
}

impl SemanticPatternMatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn PatternVectorStore>) -> Self {
        Self {
            provider,
            store,
            min_similarity: 0.75,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Index a learned pattern for later retrieval.
    pub async fn index_pattern(
        &self,
        domain: &str,
        endpoint: &str,
        method: &str,
        confidence: Confidence,
    ) -> Result<(), String> {
        let Ok(url) = Url::parse(endpoint) else {
            return Ok(()); // relative endpoints are not indexable
        };
        let embedding = self.provider.embed(&url_signature(&url)).await?;
        self.store
            .upsert(StoredPatternEmbedding {
                domain: domain.to_string(),
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                confidence,
                last_used: Utc::now(),
                embedding,
            })
            .await
    }

    /// Top-K similar patterns above `min_similarity`.
    pub async fn find_similar(
        &self,
        url: &Url,
        min_similarity: Option<f32>,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>, String> {
        let threshold = min_similarity.unwrap_or(self.min_similarity);
        let embedding = self.provider.embed(&url_signature(url)).await?;
        let domain = url.host_str().map(|h| h.to_ascii_lowercase());

        let candidates = self
            .store
            .search(&embedding, domain.as_deref(), limit.max(1) * 2)
            .await?;

        let now = Utc::now();
        let mut matches: Vec<SemanticMatch> = candidates
            .into_iter()
            .filter(|(_, similarity)| *similarity >= threshold)
            .map(|(record, similarity)| {
                let confidence_weight = record.confidence.numeric() as f32;
                let age_days = (now - record.last_used).num_days().max(0) as f32;
                let recency_weight = 1.0 / (1.0 + age_days / 30.0);
                SemanticMatch {
                    score: similarity * confidence_weight * recency_weight,
                    domain: record.domain,
                    endpoint: record.endpoint,
                    method: record.method,
                    confidence: record.confidence,
                    similarity,
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }
}

/// In-memory vector store: linear cosine scan. Fine for the pattern
/// counts a single engine accumulates.
#[derive(Default)]
pub struct MemoryVectorStore {
    records: RwLock<Vec<StoredPatternEmbedding>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PatternVectorStore for MemoryVectorStore {
    async fn upsert(&self, record: StoredPatternEmbedding) -> Result<(), String> {
        let mut records = self.records.write().unwrap();
        match records
            .iter_mut()
            .find(|r| r.endpoint == record.endpoint && r.method == record.method)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(StoredPatternEmbedding, f32)>, String> {
        let records = self.records.read().unwrap();
        let mut scored: Vec<(StoredPatternEmbedding, f32)> = records
            .iter()
            .filter(|r| domain.map_or(true, |d| r.domain == d))
            .map(|r| (r.clone(), cosine_similarity(&r.embedding, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}
