//! Testing utilities including mock implementations.
//!
//! Deterministic stand-ins for the network, the browser driver, and
//! the embedding provider, plus the HTML fixtures the integration
//! scenarios use. No test in this crate touches the real network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{HttpError, HttpResult};
use crate::http::{CookieJar, FetchResponse, HttpFetch, RequestOptions};
use crate::learning::{EmbeddingProvider, KnowledgeStore, LearningEngine};
use crate::sandbox::SandboxRuntime;
use crate::strategies::{BrowserDriver, StrategyContext};

/// A canned response for one URL.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub final_url: Option<String>,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
            final_url: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }
}

/// HTTP mock with canned routes and a call log.
///
/// Unrouted URLs answer 404 with an empty body, so chains keep moving
/// the way they would on a dead link.
#[derive(Default)]
pub struct MockHttpClient {
    routes: RwLock<HashMap<String, MockResponse>>,
    calls: RwLock<Vec<String>>,
    latency: Option<std::time::Duration>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: &[(&str, &str)]) -> Self {
        let client = Self::new();
        for (url, body) in routes {
            client.route(url, MockResponse::ok(*body));
        }
        client
    }

    /// Add a fixed per-request delay (latency-budget tests).
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a route.
    pub fn route(&self, url: &str, response: MockResponse) {
        self.routes
            .write()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == url)
            .count()
    }
}

#[async_trait]
impl HttpFetch for MockHttpClient {
    async fn fetch(&self, url: &str, _options: &RequestOptions) -> HttpResult<FetchResponse> {
        self.calls.write().unwrap().push(url.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let Some(canned) = self.routes.read().unwrap().get(url).cloned() else {
            return Ok(FetchResponse {
                status: 404,
                headers: HashMap::new(),
                final_url: url.to_string(),
                body_text: String::new(),
                cookies: Vec::new(),
            });
        };

        let mut headers = HashMap::new();
        for (name, value) in &canned.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        Ok(FetchResponse {
            status: canned.status,
            headers,
            final_url: canned.final_url.unwrap_or_else(|| url.to_string()),
            body_text: canned.body,
            cookies: Vec::new(),
        })
    }
}

/// An HTTP mock that always fails at the transport level.
pub struct FailingHttpClient;

#[async_trait]
impl HttpFetch for FailingHttpClient {
    async fn fetch(&self, url: &str, _options: &RequestOptions) -> HttpResult<FetchResponse> {
        Err(HttpError::Timeout {
            url: url.to_string(),
        })
    }
}

/// Browser driver mock: canned HTML per URL, or a default error.
#[derive(Default)]
pub struct MockBrowser {
    pages: RwLock<HashMap<String, String>>,
    calls: RwLock<Vec<String>>,
    /// When set, every render fails with this message
    failure: RwLock<Option<String>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, html: impl Into<String>) {
        self.pages.write().unwrap().insert(url.to_string(), html.into());
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().unwrap() = Some(message.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn render(&self, url: &str) -> Result<String, String> {
        self.calls.write().unwrap().push(url.to_string());
        if let Some(message) = self.failure.read().unwrap().clone() {
            return Err(message);
        }
        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no canned page for {url}"))
    }

    fn name(&self) -> &str {
        "mock-browser"
    }
}

/// Deterministic embeddings seeded from a SHA-256 of the text.
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self { dimension: 64 }
    }
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();

        Ok((0..self.dimension)
            .map(|i| {
                let byte = hash[i % 32] as f32;
                (byte / 127.5) - 1.0
            })
            .collect())
    }
}

/// A strategy context over an empty mock network.
pub fn test_context() -> StrategyContext {
    test_context_with_routes(&[])
}

/// A strategy context whose HTTP layer serves the given routes.
pub fn test_context_with_routes(routes: &[(&str, &str)]) -> StrategyContext {
    let http: Arc<dyn HttpFetch> = Arc::new(MockHttpClient::with_routes(routes));
    let jar = CookieJar::new();
    StrategyContext {
        sandbox: Arc::new(SandboxRuntime::new(Arc::clone(&http), jar)),
        http,
        browser: None,
        learned_selectors: Vec::new(),
        min_content_length: 500,
        async_wait_time_ms: None,
    }
}

/// A learning engine over an in-memory store.
pub fn test_learning() -> Arc<LearningEngine> {
    Arc::new(LearningEngine::new(KnowledgeStore::in_memory()))
}

/// HTML fixtures shared by unit and integration tests.
pub mod fixtures {
    /// Server-rendered article with well over 500 characters of body
    /// text inside `<main>`.
    pub const ARTICLE_HTML: &str = r#"<html>
<head><title>Understanding Walrus Migration</title></head>
<body>
<nav><a href="/">Home</a><a href="/about">About</a></nav>
<main>
<h1>Understanding Walrus Migration</h1>
<p>Walruses undertake seasonal migrations between their summer feeding
grounds in the shallow continental shelf waters and their winter haulout
sites along the pack ice edge. These journeys can cover several thousand
kilometers in a single year, and individual animals show remarkable
fidelity to particular routes across decades of travel.</p>
<p>Researchers tracking tagged individuals have found that adult females
with calves favor routes that maximize access to benthic feeding areas,
while adult males more often take direct paths between haulouts. The
difference appears to reflect the energetic demands of nursing rather
than any navigational preference, and it narrows considerably outside
the calving season when both sexes travel similar corridors.</p>
<p>Climate-driven reductions in sea ice have shifted both the timing and
the geometry of these migrations, pushing haulout sites northward and
concentrating animals in fewer locations than historical records show
for any comparable period.</p>
</main>
<footer>Copyright 2024</footer>
</body>
</html>"#;

    /// Single-page-app shell: an empty root node plus a script that
    /// fills it with a long article. Only the sandbox tier can see the
    /// content.
    pub const SPA_HTML: &str = r#"<html>
<head><title>SPA Article</title></head>
<body>
<div id="root"></div>
<script>
var paragraph = 'Rendered client-side: the harbor seal population of the outer ' +
  'islands has tripled since systematic counts began, and haulout surveys ' +
  'now record animals on ledges that stood empty for decades. ';
var body = '';
for (var i = 0; i < 6; i++) { body += paragraph; }
document.getElementById('root').innerHTML =
  '<article><h1>Client Rendered</h1><p>' + body + '</p></article>';
</script>
</body>
</html>"#;

    /// Page guarded by an anti-bot challenge marker; the sandbox must
    /// short-circuit and hand it to the browser tier.
    pub const CF_CHALLENGE_HTML: &str = r#"<html>
<head><title>Just a moment...</title></head>
<body>
<div id="cf-chl-bypass" class="challenge-platform">
Checking your browser before accessing example.com
</div>
</body>
</html>"#;

    /// Dev.to API article payload (S5).
    pub const DEVTO_ARTICLE_JSON: &str = r#"{
  "title": "Hello",
  "description": "A greeting",
  "body_markdown": "A short greeting article whose body comfortably clears the fifty character minimum for API results.",
  "user": { "name": "Alice" },
  "tags": ["meta"]
}"#;

    /// Browser-rendered article used when the mock browser answers.
    pub const BROWSER_RENDERED_HTML: &str = r#"<html>
<head><title>Browser Only</title></head>
<body>
<article>
<h1>Browser Only</h1>
<p>This page only renders inside a full browser because its markup is
assembled by scripts the sandbox refuses to run. The rendered article
carries enough prose to clear the default validation threshold, which
is five hundred characters of visible text. To make certain of that,
this paragraph continues at some length about nothing in particular:
the weather over the strait, the ferry timetable, the price of coffee
at the terminal kiosk, and the seabirds working the tide line, until
the character count is comfortably past the bar that the validator
enforces for non-API extraction strategies.</p>
</article>
</body>
</html>"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_http_routes_and_404() {
        let client = MockHttpClient::with_routes(&[("https://a.example/x", "body")]);

        let hit = client
            .fetch("https://a.example/x", &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body_text, "body");

        let miss = client
            .fetch("https://a.example/missing", &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(miss.status, 404);

        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_browser() {
        let browser = MockBrowser::new();
        browser.page("https://a.example/", "<html></html>");

        assert!(browser.render("https://a.example/").await.is_ok());
        assert!(browser.render("https://other.example/").await.is_err());

        browser.fail_with("crashed");
        assert_eq!(
            browser.render("https://a.example/").await.unwrap_err(),
            "crashed"
        );
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("hello").await.unwrap();
        let b = provider.embed("hello").await.unwrap();
        let c = provider.embed("different").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fixture_article_is_long_enough() {
        // Rough visible-length check: strip tags, count chars
        let stripped: String = {
            let mut out = String::new();
            let mut in_tag = false;
            for c in fixtures::ARTICLE_HTML.chars() {
                match c {
                    '<' => in_tag = true,
                    '>' => in_tag = false,
                    c if !in_tag => out.push(c),
                    _ => {}
                }
            }
            out
        };
        assert!(stripped.chars().count() >= 500);
        assert!(!fixtures::ARTICLE_HTML.contains("Loading"));
    }
}
