//! Site-specific API strategies.
//!
//! Well-known sites expose JSON or oEmbed endpoints that are cheaper
//! and cleaner than scraping their pages. Each strategy is gated by a
//! URL-shape test and returns high-confidence content formatted from
//! the API response.
//!
//! These are the only strategies that produce extraction-success
//! events, which is how the learning engine acquires bypassable API
//! patterns.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::http::RequestOptions;
use crate::strategies::static_parse::html_to_markdown;
use crate::strategies::{Strategy, StrategyContext, StrategyHit, StrategyOutcome};
use crate::types::content::{Confidence, ExtractedContent};

/// JSON-hijacking prefixes stripped before parsing. Order matters:
/// longest first.
pub const JSON_HIJACK_PREFIXES: &[&str] = &["])}while(1);</x>", "while(1);", ")]}',", ")]}"];

/// Minimum content length for API results: a short API payload is
/// still authoritative.
const API_MIN_CONTENT_LENGTH: usize = 50;

pub fn site_api_strategies() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(RedditStrategy),
        Arc::new(HackerNewsStrategy),
        Arc::new(GitHubStrategy),
        Arc::new(WikipediaStrategy),
        Arc::new(StackOverflowStrategy),
        Arc::new(NpmStrategy),
        Arc::new(PypiStrategy),
        Arc::new(DevToStrategy),
        Arc::new(MediumStrategy),
        Arc::new(YouTubeStrategy),
    ]
}

/// Strip a JSON-hijacking prefix if present.
pub fn strip_json_hijack(body: &str) -> &str {
    let trimmed = body.trim_start();
    for prefix in JSON_HIJACK_PREFIXES {
        if let Some(stripped) = trimmed.strip_prefix(prefix) {
            return stripped.trim_start();
        }
    }
    trimmed
}

/// `host == base` or `host` ends with `.base`.
fn host_matches(url: &Url, base: &str) -> bool {
    match url.host_str() {
        Some(host) => host == base || host.ends_with(&format!(".{base}")),
        None => false,
    }
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// GET a JSON endpoint through the shared client, stripping hijack
/// prefixes. Non-2xx statuses are errors so the pipeline records a
/// warning and the chain continues.
async fn get_json(ctx: &StrategyContext, api_url: &str) -> Result<Value, String> {
    let options = RequestOptions::new().accept_json();
    let response = ctx
        .http
        .fetch(api_url, &options)
        .await
        .map_err(|e| format!("{api_url}: {e}"))?;

    if !response.is_success() {
        return Err(format!("{api_url}: HTTP {}", response.status));
    }

    serde_json::from_str(strip_json_hijack(&response.body_text))
        .map_err(|e| format!("{api_url}: invalid JSON: {e}"))
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or_default()
}

/// Reddit post pages: `…reddit.com/r/<sub>/comments/<id>/…` → the
/// post's `.json` listing.
pub struct RedditStrategy;

#[async_trait]
impl Strategy for RedditStrategy {
    fn name(&self) -> &'static str {
        "api:reddit"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "reddit.com") || !url.path().contains("/comments/") {
            return Ok(None);
        }

        let api_url = format!(
            "https://www.reddit.com{}.json",
            url.path().trim_end_matches('/')
        );
        let payload = get_json(ctx, &api_url).await?;

        let post = payload
            .get(0)
            .and_then(|l| l.pointer("/data/children/0/data"))
            .ok_or_else(|| format!("{api_url}: unexpected listing shape"))?;

        let title = str_field(post, "title").to_string();
        let selftext = str_field(post, "selftext");
        let author = str_field(post, "author");
        let subreddit = str_field(post, "subreddit");
        let score = u64_field(post, "score");

        let mut markdown = format!("# {title}\n\nr/{subreddit} · u/{author} · {score} points\n");
        if !selftext.is_empty() {
            markdown.push_str(&format!("\n{selftext}\n"));
        }

        let comments: Vec<&Value> = payload
            .get(1)
            .and_then(|l| l.pointer("/data/children"))
            .and_then(Value::as_array)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|c| c.get("data"))
                    .filter(|d| !str_field(d, "body").is_empty())
                    .take(10)
                    .collect()
            })
            .unwrap_or_default();

        if !comments.is_empty() {
            markdown.push_str("\n## Comments\n\n");
            for comment in comments {
                markdown.push_str(&format!(
                    "- u/{}: {}\n",
                    str_field(comment, "author"),
                    str_field(comment, "body")
                ));
            }
        }

        let text = markdown.clone();
        let content = ExtractedContent {
            title,
            text,
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// Hacker News item pages → Firebase item endpoint.
pub struct HackerNewsStrategy;

#[async_trait]
impl Strategy for HackerNewsStrategy {
    fn name(&self) -> &'static str {
        "api:hackernews"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "news.ycombinator.com") || url.path() != "/item" {
            return Ok(None);
        }
        let Some(id) = url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.to_string())
        else {
            return Ok(None);
        };

        let api_url = format!("https://hacker-news.firebaseio.com/v0/item/{id}.json");
        let item = get_json(ctx, &api_url).await?;
        if item.is_null() {
            return Err(format!("{api_url}: no such item"));
        }

        let title = str_field(&item, "title").to_string();
        let by = str_field(&item, "by");
        let score = u64_field(&item, "score");
        let descendants = u64_field(&item, "descendants");
        let body = html_to_markdown(str_field(&item, "text"));

        let mut markdown =
            format!("# {title}\n\nby {by} · {score} points · {descendants} comments\n");
        if !body.is_empty() {
            markdown.push_str(&format!("\n{body}\n"));
        }
        if let Some(story_url) = item.get("url").and_then(Value::as_str) {
            markdown.push_str(&format!("\n[link]({story_url})\n"));
        }

        let content = ExtractedContent {
            title,
            text: markdown.clone(),
            markdown,
            structured: Some(item),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// GitHub repository roots → repos API plus the raw README.
pub struct GitHubStrategy;

#[async_trait]
impl Strategy for GitHubStrategy {
    fn name(&self) -> &'static str {
        "api:github"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "github.com") {
            return Ok(None);
        }
        let segments = path_segments(url);
        if segments.len() != 2 {
            return Ok(None);
        }
        let (owner, repo) = (&segments[0], &segments[1]);

        let api_url = format!("https://api.github.com/repos/{owner}/{repo}");
        let payload = get_json(ctx, &api_url).await?;

        let name = str_field(&payload, "full_name").to_string();
        let description = str_field(&payload, "description");
        let language = str_field(&payload, "language");
        let stars = u64_field(&payload, "stargazers_count");

        let mut markdown = format!("# {name}\n\n{description}\n\n{language} · {stars} stars\n");

        // README is best-effort; the repo metadata alone is a result
        let readme_url =
            format!("https://raw.githubusercontent.com/{owner}/{repo}/HEAD/README.md");
        let options = RequestOptions::new();
        if let Ok(response) = ctx.http.fetch(&readme_url, &options).await {
            if response.is_success() && !response.body_text.trim().is_empty() {
                markdown.push_str("\n---\n\n");
                markdown.push_str(&response.body_text);
            }
        }

        let content = ExtractedContent {
            title: name,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// Wikipedia articles → REST summary endpoint on the same language
/// subdomain.
pub struct WikipediaStrategy;

#[async_trait]
impl Strategy for WikipediaStrategy {
    fn name(&self) -> &'static str {
        "api:wikipedia"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        let Some(host) = url.host_str() else {
            return Ok(None);
        };
        if !host.ends_with(".wikipedia.org") {
            return Ok(None);
        }
        let Some(title) = url.path().strip_prefix("/wiki/") else {
            return Ok(None);
        };
        if title.is_empty() {
            return Ok(None);
        }

        let api_url = format!("https://{host}/api/rest_v1/page/summary/{title}");
        let payload = get_json(ctx, &api_url).await?;

        let page_title = str_field(&payload, "title").to_string();
        let description = str_field(&payload, "description");
        let extract = str_field(&payload, "extract");

        let mut markdown = format!("# {page_title}\n");
        if !description.is_empty() {
            markdown.push_str(&format!("\n_{description}_\n"));
        }
        markdown.push_str(&format!("\n{extract}\n"));

        let content = ExtractedContent {
            title: page_title,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// Stack Overflow questions → Stack Exchange API with bodies.
pub struct StackOverflowStrategy;

#[async_trait]
impl Strategy for StackOverflowStrategy {
    fn name(&self) -> &'static str {
        "api:stackoverflow"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "stackoverflow.com") {
            return Ok(None);
        }
        let segments = path_segments(url);
        if segments.len() < 2 || segments[0] != "questions" {
            return Ok(None);
        }
        let id = &segments[1];
        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }

        let api_url = format!(
            "https://api.stackexchange.com/2.3/questions/{id}?site=stackoverflow&filter=withbody"
        );
        let payload = get_json(ctx, &api_url).await?;
        let question = payload
            .pointer("/items/0")
            .ok_or_else(|| format!("{api_url}: question not found"))?;

        let title = str_field(question, "title").to_string();
        let score = question.get("score").and_then(Value::as_i64).unwrap_or(0);
        let body = html_to_markdown(str_field(question, "body"));

        let mut markdown = format!("# {title}\n\nscore {score}\n\n{body}\n");

        // Top answers, best effort
        let answers_url = format!(
            "https://api.stackexchange.com/2.3/questions/{id}/answers?site=stackoverflow&filter=withbody&sort=votes"
        );
        if let Ok(answers) = get_json(ctx, &answers_url).await {
            if let Some(items) = answers.get("items").and_then(Value::as_array) {
                for answer in items.iter().take(3) {
                    let answer_score =
                        answer.get("score").and_then(Value::as_i64).unwrap_or(0);
                    markdown.push_str(&format!(
                        "\n## Answer (score {answer_score})\n\n{}\n",
                        html_to_markdown(str_field(answer, "body"))
                    ));
                }
            }
        }

        let content = ExtractedContent {
            title,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// npm package pages → the public registry document.
pub struct NpmStrategy;

#[async_trait]
impl Strategy for NpmStrategy {
    fn name(&self) -> &'static str {
        "api:npm"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "npmjs.com") {
            return Ok(None);
        }
        let segments = path_segments(url);
        if segments.first().map(String::as_str) != Some("package") || segments.len() < 2 {
            return Ok(None);
        }
        // Scoped packages occupy two segments: @scope/name
        let name = segments[1..].join("/");

        let api_url = format!("https://registry.npmjs.org/{name}");
        let payload = get_json(ctx, &api_url).await?;

        let pkg_name = str_field(&payload, "name").to_string();
        let description = str_field(&payload, "description");
        let latest = payload
            .pointer("/dist-tags/latest")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let readme = str_field(&payload, "readme");

        let mut markdown = format!("# {pkg_name}\n\n{description}\n\nlatest: {latest}\n");
        if !readme.is_empty() {
            markdown.push_str("\n---\n\n");
            markdown.push_str(readme);
        }

        let content = ExtractedContent {
            title: pkg_name,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// PyPI project pages → the JSON API.
pub struct PypiStrategy;

#[async_trait]
impl Strategy for PypiStrategy {
    fn name(&self) -> &'static str {
        "api:pypi"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "pypi.org") {
            return Ok(None);
        }
        let segments = path_segments(url);
        if segments.first().map(String::as_str) != Some("project") || segments.len() < 2 {
            return Ok(None);
        }
        let name = &segments[1];

        let api_url = format!("https://pypi.org/pypi/{name}/json");
        let payload = get_json(ctx, &api_url).await?;
        let info = payload
            .get("info")
            .ok_or_else(|| format!("{api_url}: missing info"))?;

        let pkg_name = str_field(info, "name").to_string();
        let version = str_field(info, "version");
        let summary = str_field(info, "summary");
        let description = str_field(info, "description");

        let mut markdown = format!("# {pkg_name} {version}\n\n{summary}\n");
        if !description.is_empty() {
            markdown.push_str("\n---\n\n");
            markdown.push_str(description);
        }

        let content = ExtractedContent {
            title: pkg_name,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// Dev.to articles → the public articles API.
pub struct DevToStrategy;

#[async_trait]
impl Strategy for DevToStrategy {
    fn name(&self) -> &'static str {
        "api:devto"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "dev.to") {
            return Ok(None);
        }
        let segments = path_segments(url);
        if segments.len() != 2 || segments[0].starts_with('@') {
            return Ok(None);
        }
        let (user, slug) = (&segments[0], &segments[1]);

        let api_url = format!("https://dev.to/api/articles/{user}/{slug}");
        let payload = get_json(ctx, &api_url).await?;

        let title = str_field(&payload, "title").to_string();
        let body_markdown = str_field(&payload, "body_markdown");
        let author = payload
            .pointer("/user/name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let markdown = format!("# {title}\n\nby {author}\n\n{body_markdown}\n");
        let content = ExtractedContent {
            title,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// Medium posts → `?format=json` with the hijack prefix stripped.
pub struct MediumStrategy;

#[async_trait]
impl Strategy for MediumStrategy {
    fn name(&self) -> &'static str {
        "api:medium"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        API_MIN_CONTENT_LENGTH
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        if !host_matches(url, "medium.com") {
            return Ok(None);
        }
        let segments = path_segments(url);
        if segments.is_empty() {
            return Ok(None);
        }

        let mut api = url.clone();
        api.set_query(Some("format=json"));
        let api_url = api.to_string();
        let payload = get_json(ctx, &api_url).await?;

        let value = payload
            .pointer("/payload/value")
            .ok_or_else(|| format!("{api_url}: unexpected payload shape"))?;

        let title = str_field(value, "title").to_string();
        let paragraphs: Vec<&str> = value
            .pointer("/content/bodyModel/paragraphs")
            .and_then(Value::as_array)
            .map(|ps| {
                ps.iter()
                    .map(|p| str_field(p, "text"))
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if paragraphs.is_empty() {
            return Err(format!("{api_url}: no paragraphs in payload"));
        }

        let body = paragraphs.join("\n\n");
        let markdown = format!("# {title}\n\n{body}\n");
        let content = ExtractedContent {
            title,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

/// YouTube videos → the oEmbed endpoint. Channel and profile URLs are
/// not videos and return None.
pub struct YouTubeStrategy;

/// Parse a video id out of the URL shapes YouTube uses.
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let segments = path_segments(url);

    let id = if host == "youtu.be" {
        segments.first().cloned()
    } else if host.ends_with("youtube.com") || host.ends_with("youtube-nocookie.com") {
        match segments.first().map(String::as_str) {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.to_string()),
            Some("embed") | Some("shorts") => segments.get(1).cloned(),
            // channels, profiles, playlists: not videos
            _ => None,
        }
    } else {
        None
    };

    id.filter(|id| !id.is_empty())
}

#[async_trait]
impl Strategy for YouTubeStrategy {
    fn name(&self) -> &'static str {
        "api:youtube"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn min_content_length(&self, _default: usize) -> usize {
        10
    }

    async fn extract(&self, url: &Url, _html: &str, ctx: &StrategyContext) -> StrategyOutcome {
        let Some(id) = youtube_video_id(url) else {
            return Ok(None);
        };

        let watch_url = format!("https://www.youtube.com/watch?v={id}");
        let api_url = format!(
            "https://www.youtube.com/oembed?url={}&format=json",
            urlencode(&watch_url)
        );
        let payload = get_json(ctx, &api_url).await?;

        let title = str_field(&payload, "title").to_string();
        let author = str_field(&payload, "author_name");

        let markdown = format!("# {title}\n\nby {author}\n\n[watch]({watch_url})\n");
        let content = ExtractedContent {
            title,
            text: markdown.clone(),
            markdown,
            structured: Some(payload),
        };
        Ok(Some(StrategyHit::new(content).with_final_url(api_url)))
    }
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_hijack_all_prefixes() {
        for prefix in JSON_HIJACK_PREFIXES {
            let body = format!("{prefix}{{\"ok\":true}}");
            assert_eq!(strip_json_hijack(&body), "{\"ok\":true}");
        }
        assert_eq!(strip_json_hijack("{\"ok\":true}"), "{\"ok\":true}");
    }

    #[test]
    fn test_youtube_id_shapes() {
        let cases = [
            ("https://www.youtube.com/watch?v=abc123", Some("abc123")),
            ("https://youtu.be/abc123", Some("abc123")),
            ("https://www.youtube.com/embed/abc123", Some("abc123")),
            ("https://www.youtube.com/shorts/abc123", Some("abc123")),
            (
                "https://www.youtube-nocookie.com/embed/abc123",
                Some("abc123"),
            ),
            ("https://www.youtube.com/@somechannel", None),
            ("https://www.youtube.com/channel/UCxyz", None),
            ("https://www.youtube.com/c/somechannel", None),
            ("https://www.youtube.com/user/someuser", None),
        ];

        for (input, expected) in cases {
            let url = Url::parse(input).unwrap();
            assert_eq!(
                youtube_video_id(&url).as_deref(),
                expected,
                "for {input}"
            );
        }
    }

    #[test]
    fn test_host_matches_subdomains() {
        let www = Url::parse("https://www.reddit.com/r/rust/comments/1/post/").unwrap();
        let bare = Url::parse("https://reddit.com/r/rust/comments/1/post/").unwrap();
        let other = Url::parse("https://notreddit.com/r/rust/comments/1/").unwrap();

        assert!(host_matches(&www, "reddit.com"));
        assert!(host_matches(&bare, "reddit.com"));
        assert!(!host_matches(&other, "reddit.com"));
    }

    #[tokio::test]
    async fn test_devto_gate_and_endpoint() {
        let ctx = crate::testing::test_context_with_routes(&[(
            "https://dev.to/api/articles/alice/hello",
            r#"{"title":"Hello","body_markdown":"Body of the article, long enough for the API minimum.","user":{"name":"Alice"}}"#,
        )]);

        let url = Url::parse("https://dev.to/alice/hello").unwrap();
        let hit = DevToStrategy.extract(&url, "", &ctx).await.unwrap().unwrap();

        assert_eq!(
            hit.final_url.as_deref(),
            Some("https://dev.to/api/articles/alice/hello")
        );
        assert_eq!(hit.content.title, "Hello");

        // Profile pages do not match
        let profile = Url::parse("https://dev.to/alice").unwrap();
        assert!(DevToStrategy
            .extract(&profile, "", &ctx)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_medium_hijack_prefix_stripped() {
        let body = format!(
            "])}}while(1);</x>{}",
            r#"{"payload":{"value":{"title":"M","content":{"bodyModel":{"paragraphs":[{"text":"First paragraph of the Medium post body."},{"text":"Second paragraph with more words."}]}}}}}"#
        );
        let ctx = crate::testing::test_context_with_routes(&[(
            "https://medium.com/@a/post-1?format=json",
            body.as_str(),
        )]);

        let url = Url::parse("https://medium.com/@a/post-1").unwrap();
        let hit = MediumStrategy.extract(&url, "", &ctx).await.unwrap().unwrap();

        assert_eq!(hit.content.title, "M");
        assert!(hit.content.text.contains("First paragraph"));
    }

    #[tokio::test]
    async fn test_github_gate() {
        let ctx = crate::testing::test_context();
        // Three path segments: not a repo root
        let url = Url::parse("https://github.com/owner/repo/issues").unwrap();
        assert!(GitHubStrategy.extract(&url, "", &ctx).await.unwrap().is_none());
    }
}
