//! Per-host cookie storage.
//!
//! The jar consumes `Set-Cookie` headers per redirect hop and emits a
//! `Cookie` header for subsequent requests to the same host. Invalid
//! cookies are silently dropped.

use chrono::{DateTime, Utc};
use cookie::Cookie;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    /// Absolute expiry; None = session cookie
    expires_at: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Thread-safe per-host cookie jar. Cloning shares the underlying store.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    // host → cookie name → cookie
    store: Arc<RwLock<HashMap<String, HashMap<String, StoredCookie>>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one `Set-Cookie` header value for a host.
    ///
    /// Unparseable headers are dropped without error.
    pub fn set_cookie(&self, host: &str, header_value: &str) {
        let Ok(parsed) = Cookie::parse(header_value.to_string()) else {
            tracing::debug!(host = %host, "dropping unparseable Set-Cookie header");
            return;
        };

        let now = Utc::now();
        let expires_at = cookie_expiry(&parsed, now);

        let mut store = self.store.write().unwrap();
        let host_cookies = store.entry(host.to_ascii_lowercase()).or_default();

        // Max-Age=0 / past Expires is a deletion
        if matches!(expires_at, Some(at) if at <= now) {
            host_cookies.remove(parsed.name());
            return;
        }

        host_cookies.insert(
            parsed.name().to_string(),
            StoredCookie {
                value: parsed.value().to_string(),
                expires_at,
            },
        );
    }

    /// Ingest every `Set-Cookie` header from a response.
    pub fn ingest_response_cookies<'a>(&self, host: &str, headers: impl Iterator<Item = &'a str>) {
        for header in headers {
            self.set_cookie(host, header);
        }
    }

    /// Seed a cookie directly (e.g. caller-provided session cookies).
    pub fn insert(&self, host: &str, name: &str, value: &str) {
        self.store
            .write()
            .unwrap()
            .entry(host.to_ascii_lowercase())
            .or_default()
            .insert(
                name.to_string(),
                StoredCookie {
                    value: value.to_string(),
                    expires_at: None,
                },
            );
    }

    /// Build the `Cookie` header value for a host, or None if the jar
    /// holds nothing valid for it.
    pub fn cookie_header(&self, host: &str) -> Option<String> {
        let now = Utc::now();
        let store = self.store.read().unwrap();
        let host_cookies = store.get(&host.to_ascii_lowercase())?;

        let mut pairs: Vec<String> = host_cookies
            .iter()
            .filter(|(_, c)| !c.is_expired(now))
            .map(|(name, c)| format!("{}={}", name, c.value))
            .collect();

        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        Some(pairs.join("; "))
    }

    /// All live cookies for a host as pairs.
    pub fn cookies_for(&self, host: &str) -> Vec<(String, String)> {
        let now = Utc::now();
        let store = self.store.read().unwrap();
        store
            .get(&host.to_ascii_lowercase())
            .map(|cookies| {
                cookies
                    .iter()
                    .filter(|(_, c)| !c.is_expired(now))
                    .map(|(name, c)| (name.clone(), c.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every cookie for every host.
    pub fn clear(&self) {
        self.store.write().unwrap().clear();
    }
}

fn cookie_expiry(parsed: &Cookie<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(max_age) = parsed.max_age() {
        let seconds = max_age.whole_seconds();
        return Some(now + chrono::Duration::seconds(seconds));
    }
    if let Some(expires) = parsed.expires_datetime() {
        return DateTime::<Utc>::from_timestamp(expires.unix_timestamp(), 0);
    }
    None
}
