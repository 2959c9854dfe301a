//! HTTP client wrapper.
//!
//! Redirects are followed manually so cookies can be captured on every
//! hop; a single timeout bounds the whole operation. The wrapper is the
//! only place the engine touches the transport, and it is also what the
//! sandbox routes its `fetch`/`XMLHttpRequest` through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{HttpError, HttpResult};
use crate::http::cookies::CookieJar;
use crate::http::validation::UrlValidator;

/// Default redirect budget per fetch.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Default overall timeout, milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36 AcquisitionBot/0.1";

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub timeout_ms: u64,
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Vec::new(),
            user_agent: None,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON Accept header shortcut used by the API strategies.
    pub fn accept_json(self) -> Self {
        self.with_header("Accept", "application/json")
    }
}

/// A completed fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Response headers, lowercased names; later hops win
    pub headers: HashMap<String, String>,
    /// URL after redirects
    pub final_url: String,
    pub body_text: String,
    /// Cookies visible for the final host after the fetch
    pub cookies: Vec<(String, String)>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Transport abstraction so tests and the sandbox share one seam.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, url: &str, options: &RequestOptions) -> HttpResult<FetchResponse>;
}

/// Configuration for the HTTP client wrapper.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// The production HTTP client: reqwest with redirects disabled at the
/// transport level, cookie capture per hop, SSRF validation up front.
pub struct HttpClient {
    client: reqwest::Client,
    jar: CookieJar,
    validator: UrlValidator,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(jar: CookieJar) -> HttpResult<Self> {
        Self::with_config(jar, HttpConfig::default(), UrlValidator::new())
    }

    pub fn with_config(
        jar: CookieJar,
        config: HttpConfig,
        validator: UrlValidator,
    ) -> HttpResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| HttpError::Transport(Box::new(e)))?;

        Ok(Self {
            client,
            jar,
            validator,
            config,
        })
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }

    /// One redirect-following fetch bounded by a single timeout.
    async fn fetch_inner(&self, url: &str, options: &RequestOptions) -> HttpResult<FetchResponse> {
        let mut current = Url::parse(url).map_err(|_| HttpError::InvalidUrl { url: url.to_string() })?;
        let max_redirects = options.max_redirects.min(20);
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| self.config.user_agent.clone());

        let mut hops = 0usize;
        loop {
            self.validator.validate(current.as_str())?;

            let host = current.host_str().unwrap_or_default().to_string();
            let method: reqwest::Method = options
                .method
                .parse()
                .map_err(|_| HttpError::InvalidUrl { url: current.to_string() })?;

            let mut request = self
                .client
                .request(method, current.clone())
                .header("User-Agent", &user_agent);

            for (name, value) in &options.headers {
                request = request.header(name, value);
            }
            if let Some(cookie_header) = self.jar.cookie_header(&host) {
                request = request.header("Cookie", cookie_header);
            }
            if let Some(body) = &options.body {
                request = request.body(body.clone());
            }

            debug!(url = %current, hop = hops, "HTTP fetch");
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::Timeout { url: current.to_string() }
                } else {
                    HttpError::Transport(Box::new(e))
                }
            })?;

            // Capture cookies on every hop
            let set_cookies: Vec<String> = response
                .headers()
                .get_all("set-cookie")
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(String::from)
                .collect();
            self.jar
                .ingest_response_cookies(&host, set_cookies.iter().map(String::as_str));

            let status = response.status().as_u16();
            if options.follow_redirects && (300..400).contains(&status) && status != 304 {
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                if let Some(location) = location {
                    hops += 1;
                    if hops > max_redirects {
                        return Err(HttpError::TooManyRedirects {
                            url: url.to_string(),
                            limit: max_redirects,
                        });
                    }
                    current = current.join(&location).map_err(|_| HttpError::InvalidUrl {
                        url: location.clone(),
                    })?;
                    continue;
                }
                // Redirect status without a Location header: fall through
                // and return it as-is.
            }

            let mut headers: HashMap<String, String> = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
                }
            }

            let final_url = response.url().to_string();
            let final_host = response
                .url()
                .host_str()
                .unwrap_or(&host)
                .to_string();
            let body_text = response
                .text()
                .await
                .map_err(|e| HttpError::Transport(Box::new(e)))?;

            return Ok(FetchResponse {
                status,
                headers,
                final_url,
                body_text,
                cookies: self.jar.cookies_for(&final_host),
            });
        }
    }
}

#[async_trait]
impl HttpFetch for HttpClient {
    async fn fetch(&self, url: &str, options: &RequestOptions) -> HttpResult<FetchResponse> {
        let timeout = Duration::from_millis(options.timeout_ms.max(1));
        match tokio::time::timeout(timeout, self.fetch_inner(url, options)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %url, timeout_ms = options.timeout_ms, "HTTP fetch timed out");
                Err(HttpError::Timeout { url: url.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::new()
            .with_method("post")
            .with_header("Accept", "application/json")
            .with_body("{}")
            .with_timeout_ms(1_000);

        assert_eq!(options.method, "POST");
        assert_eq!(options.timeout_ms, 1_000);
        assert_eq!(options.body.as_deref(), Some("{}"));
        assert_eq!(options.headers.len(), 1);
    }

    #[test]
    fn test_fetch_response_helpers() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());

        let response = FetchResponse {
            status: 200,
            headers,
            final_url: "https://example.com/".to_string(),
            body_text: "<html></html>".to_string(),
            cookies: vec![],
        };

        assert!(response.is_success());
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.header("x-missing"), None);
    }
}
