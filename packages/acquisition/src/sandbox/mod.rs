//! Sandboxed JavaScript rendering (the lightweight tier).
//!
//! Parses HTML into an in-engine DOM, executes page scripts in an
//! isolated boa context with a strict capability whitelist, then
//! serializes the DOM back to HTML. Script errors never propagate: the
//! rendered DOM is best-effort.
//!
//! Pages carrying anti-bot challenge markers are pre-classified and
//! returned untouched with `needs_full_browser` set, since running
//! challenge scripts in a mock environment only burns time.

pub mod bridge;
pub mod capabilities;
pub mod prelude;

use boa_engine::{Context, Source};
use futures::future::join_all;
use scraper::{Html, Selector};
use serde_json::json;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::SandboxError;
use crate::http::{CookieJar, HttpFetch, RequestOptions};
pub use capabilities::SandboxCapabilities;

/// External script URLs matching any of these substrings are never
/// fetched or executed: analytics and tracker payloads cannot produce
/// content.
pub const ANALYTICS_SKIP_PATTERNS: &[&str] = &[
    "google-analytics",
    "googletagmanager",
    "gtag",
    "facebook.net",
    "twitter.com/widgets",
    "connect.facebook",
    "platform.twitter",
    "hotjar",
    "segment.io",
    "segment.com",
    "mixpanel",
    "sentry.io",
    "newrelic",
    "doubleclick",
    "adsense",
    "adsbygoogle",
    "cloudflare-challenge",
    "recaptcha",
    "hcaptcha",
];

/// HTML markers that short-circuit the sandbox entirely: these pages
/// need a full browser.
pub const NEEDS_FULL_BROWSER_PATTERNS: &[&str] = &[
    "cloudflare",
    "challenge-platform",
    "cf-chl-bypass",
    "__cf_chl",
    "recaptcha",
    "hcaptcha",
    "turnstile",
];

/// Per-callback timer delay cap, mirrored in the JS prelude.
pub const TIMER_DELAY_CAP_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Budget per script, milliseconds
    pub script_timeout_ms: u64,

    /// How long queued tasks (timers, microtasks) may run after the
    /// script phase, milliseconds. Capped at ~1 s.
    pub async_wait_time_ms: u64,

    /// Hard wall-clock cap for one render, milliseconds
    pub total_timeout_ms: u64,

    /// Timeout for fetching external script sources, milliseconds
    pub script_fetch_timeout_ms: u64,

    /// Engine loop-iteration bound per script (runaway-loop guard)
    pub loop_iteration_limit: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            script_timeout_ms: 5_000,
            async_wait_time_ms: 1_000,
            total_timeout_ms: 30_000,
            script_fetch_timeout_ms: 10_000,
            loop_iteration_limit: 5_000_000,
        }
    }
}

/// What one render produced.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// Serialized DOM after the script phase (the input HTML when
    /// `needs_full_browser` is set)
    pub html: String,

    /// Collected script errors; never propagated
    pub script_errors: Vec<String>,

    /// Console output from the page scripts
    pub console: Vec<String>,

    pub scripts_executed: usize,
    pub scripts_skipped: usize,

    /// The page carries challenge markers; hand it to the browser tier
    pub needs_full_browser: bool,
}

struct PageScript {
    label: String,
    code: String,
}

/// The sandbox runtime: one instance per engine, one render per call.
pub struct SandboxRuntime {
    http: Arc<dyn HttpFetch>,
    jar: CookieJar,
    capabilities: SandboxCapabilities,
    config: SandboxConfig,
}

impl SandboxRuntime {
    pub fn new(http: Arc<dyn HttpFetch>, jar: CookieJar) -> Self {
        Self {
            http,
            jar,
            capabilities: SandboxCapabilities::default(),
            config: SandboxConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_capabilities(mut self, capabilities: SandboxCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Classify whether a page needs the full browser before any
    /// script work.
    pub fn needs_full_browser(html: &str) -> bool {
        let lower = html.to_ascii_lowercase();
        NEEDS_FULL_BROWSER_PATTERNS.iter().any(|p| lower.contains(p))
    }

    /// Render a page: execute its scripts and serialize the DOM.
    pub async fn render(
        &self,
        url: &str,
        html: &str,
        async_wait_override_ms: Option<u64>,
    ) -> Result<SandboxOutcome, SandboxError> {
        if Self::needs_full_browser(html) {
            debug!(url = %url, "sandbox pre-classification: needs full browser");
            return Ok(SandboxOutcome {
                html: html.to_string(),
                script_errors: Vec::new(),
                console: Vec::new(),
                scripts_executed: 0,
                scripts_skipped: 0,
                needs_full_browser: true,
            });
        }

        let base_url = Url::parse(url)
            .map_err(|e| SandboxError::Setup(format!("invalid page URL {url}: {e}")))?;

        let (scripts, scripts_skipped) = self.collect_scripts(&base_url, html).await;
        let seed_json = dom_seed_json(html);
        let cookie_header = base_url
            .host_str()
            .and_then(|host| self.jar.cookie_header(host))
            .unwrap_or_default();
        let env_json = env_json(&base_url, &cookie_header);

        let async_wait = async_wait_override_ms
            .unwrap_or(self.config.async_wait_time_ms)
            .min(1_000);
        let budget_ms = (self.config.script_timeout_ms * (scripts.len() as u64 + 1)
            + async_wait
            + 2_000)
            .min(self.config.total_timeout_ms);

        let bridge = bridge::HostBridge {
            http: Arc::clone(&self.http),
            runtime: tokio::runtime::Handle::current(),
            base_url,
            script_fetch_timeout_ms: self.config.script_fetch_timeout_ms,
            console: RefCell::new(Vec::new()),
        };

        let capabilities = self.capabilities.clone();
        let config = self.config.clone();
        let task = tokio::task::spawn_blocking(move || {
            bridge::with_bridge(bridge, || {
                execute_scripts(&capabilities, &config, &seed_json, &env_json, &scripts, async_wait)
            })
        });

        let (exec, console) = tokio::time::timeout(Duration::from_millis(budget_ms), task)
            .await
            .map_err(|_| SandboxError::Timeout { timeout_ms: budget_ms })?
            .map_err(|e| SandboxError::Join(e.to_string()))?;

        let exec = exec?;
        Ok(SandboxOutcome {
            html: exec.html,
            script_errors: exec.script_errors,
            console,
            scripts_executed: exec.scripts_executed,
            scripts_skipped,
            needs_full_browser: false,
        })
    }

    /// Select and prefetch the page's scripts in document order.
    ///
    /// Module scripts, non-JS script types, and analytics sources are
    /// skipped. External sources are fetched through the host HTTP
    /// client so cookies apply.
    async fn collect_scripts(&self, base_url: &Url, html: &str) -> (Vec<PageScript>, usize) {
        let selector = Selector::parse("script").unwrap();
        let mut skipped = 0usize;

        // Gather attributes first: scraper's Html is not Send, so no
        // awaits happen while it is alive.
        struct ScriptRef {
            src: Option<String>,
            inline: String,
        }
        let refs: Vec<ScriptRef> = {
            let doc = Html::parse_document(html);
            doc.select(&selector)
                .filter_map(|el| {
                    let script_type = el.value().attr("type").unwrap_or("");
                    if !script_type.is_empty()
                        && !matches!(
                            script_type,
                            "text/javascript" | "application/javascript" | "text/ecmascript"
                        )
                    {
                        // Covers type="module", JSON payloads, templates
                        skipped += 1;
                        return None;
                    }
                    Some(ScriptRef {
                        src: el.value().attr("src").map(String::from),
                        inline: el.text().collect::<String>(),
                    })
                })
                .collect()
        };

        // Prefetch external sources concurrently; document order is
        // preserved by the join
        enum Resolved {
            Script(PageScript),
            Skipped,
            Empty,
        }

        let outcomes = join_all(refs.into_iter().enumerate().map(|(index, script)| {
            let http = Arc::clone(&self.http);
            let base = base_url.clone();
            let timeout_ms = self.config.script_fetch_timeout_ms;
            async move {
                let Some(src) = script.src else {
                    if script.inline.trim().is_empty() {
                        return Resolved::Empty;
                    }
                    return Resolved::Script(PageScript {
                        label: format!("inline#{index}"),
                        code: script.inline,
                    });
                };

                let lower = src.to_ascii_lowercase();
                if ANALYTICS_SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
                    debug!(src = %src, "skipping analytics script");
                    return Resolved::Skipped;
                }
                let Ok(resolved) = base.join(&src) else {
                    return Resolved::Skipped;
                };
                let options = RequestOptions::new().with_timeout_ms(timeout_ms);
                match http.fetch(resolved.as_str(), &options).await {
                    Ok(response) if response.is_success() => Resolved::Script(PageScript {
                        label: src,
                        code: response.body_text,
                    }),
                    Ok(response) => {
                        warn!(src = %src, status = response.status, "external script fetch failed");
                        Resolved::Skipped
                    }
                    Err(e) => {
                        warn!(src = %src, error = %e, "external script fetch failed");
                        Resolved::Skipped
                    }
                }
            }
        }))
        .await;

        let mut scripts = Vec::new();
        for outcome in outcomes {
            match outcome {
                Resolved::Script(script) => scripts.push(script),
                Resolved::Skipped => skipped += 1,
                Resolved::Empty => {}
            }
        }

        (scripts, skipped)
    }
}

struct ExecOutcome {
    html: String,
    script_errors: Vec<String>,
    scripts_executed: usize,
}

/// Runs on a blocking thread with the host bridge installed.
fn execute_scripts(
    capabilities: &SandboxCapabilities,
    config: &SandboxConfig,
    seed_json: &str,
    env_json: &str,
    scripts: &[PageScript],
    async_wait_ms: u64,
) -> Result<ExecOutcome, SandboxError> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(config.loop_iteration_limit);
    context.runtime_limits_mut().set_recursion_limit(512);

    capabilities
        .install(&mut context)
        .map_err(SandboxError::Setup)?;

    context
        .eval(Source::from_bytes(&format!("__seedDocument({seed_json});")))
        .map_err(|e| SandboxError::Setup(format!("document seed failed: {e}")))?;
    context
        .eval(Source::from_bytes(&format!("__initEnv({env_json});")))
        .map_err(|e| SandboxError::Setup(format!("environment seed failed: {e}")))?;

    let mut script_errors = Vec::new();
    let mut scripts_executed = 0usize;

    for script in scripts {
        match context.eval(Source::from_bytes(&script.code)) {
            Ok(_) => scripts_executed += 1,
            Err(e) => {
                script_errors.push(format!("{}: {e}", script.label));
            }
        }
        // Drain microtasks queued by this script (promise callbacks)
        context.run_jobs();
    }

    // Drain the virtual timer queue, interleaving microtasks, bounded
    // by the async wait budget and a task cap.
    let drain = format!("__runNextTimer({async_wait_ms})");
    for _ in 0..1_000 {
        let ran = context
            .eval(Source::from_bytes(&drain))
            .map(|v| v.as_boolean().unwrap_or(false))
            .unwrap_or(false);
        context.run_jobs();
        if !ran {
            break;
        }
    }

    // Collect errors recorded by the prelude (timer callbacks)
    if let Ok(value) = context.eval(Source::from_bytes("JSON.stringify(__scriptErrors)")) {
        if let Ok(errors) = value.to_string(&mut context) {
            let raw = errors.to_std_string_escaped();
            if let Ok(list) = serde_json::from_str::<Vec<String>>(&raw) {
                script_errors.extend(list);
            }
        }
    }

    let html = context
        .eval(Source::from_bytes("__serializeDocument()"))
        .ok()
        .and_then(|v| v.to_string(&mut context).ok())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default();

    Ok(ExecOutcome {
        html,
        script_errors,
        scripts_executed,
    })
}

/// Serialize the parsed document into the JSON tree consumed by
/// `__seedDocument`.
fn dom_seed_json(html: &str) -> String {
    let doc = Html::parse_document(html);

    fn walk(node: ego_tree::NodeRef<'_, scraper::Node>) -> Option<serde_json::Value> {
        match node.value() {
            scraper::Node::Element(el) => {
                let attrs: serde_json::Map<String, serde_json::Value> = el
                    .attrs()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                    .collect();
                let children: Vec<serde_json::Value> =
                    node.children().filter_map(walk).collect();
                Some(json!({
                    "t": "el",
                    "tag": el.name(),
                    "attrs": attrs,
                    "ch": children,
                }))
            }
            scraper::Node::Text(text) => Some(json!({
                "t": "tx",
                "text": text.text.to_string(),
            })),
            _ => None,
        }
    }

    let root = doc
        .tree
        .root()
        .children()
        .find_map(|child| match child.value() {
            scraper::Node::Element(_) => walk(child),
            _ => None,
        })
        .unwrap_or_else(|| json!({"t": "el", "tag": "html", "attrs": {}, "ch": []}));

    escape_for_eval(root.to_string())
}

fn env_json(base_url: &Url, cookie_header: &str) -> String {
    let origin = format!(
        "{}://{}",
        base_url.scheme(),
        base_url.host_str().unwrap_or_default()
    );
    escape_for_eval(
        json!({
            "href": base_url.as_str(),
            "protocol": format!("{}:", base_url.scheme()),
            "host": base_url.host_str().unwrap_or_default(),
            "hostname": base_url.host_str().unwrap_or_default(),
            "port": base_url.port().map(|p| p.to_string()).unwrap_or_default(),
            "pathname": base_url.path(),
            "search": base_url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            "hash": base_url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
            "origin": origin,
            "userAgent": "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
            "cookieHeader": cookie_header,
        })
        .to_string(),
    )
}

/// JSON is almost a JS literal; U+2028/U+2029 are the exception.
fn escape_for_eval(json: String) -> String {
    json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}
