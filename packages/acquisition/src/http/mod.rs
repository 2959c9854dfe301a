//! HTTP layer: client wrapper, cookie jar, SSRF validation.

pub mod client;
pub mod cookies;
pub mod validation;

pub use client::{
    FetchResponse, HttpClient, HttpConfig, HttpFetch, RequestOptions, DEFAULT_MAX_REDIRECTS,
    DEFAULT_TIMEOUT_MS,
};
pub use cookies::CookieJar;
pub use validation::UrlValidator;
