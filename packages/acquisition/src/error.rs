//! Typed errors for the acquisition engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors surfaced by fetch and extraction operations.
///
/// Variants form a fixed taxonomy; the orchestrator reports the
/// most severe failure observed across tiers when nothing succeeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP 404 or an empty page after all strategies
    #[error("not found: {url}")]
    NotFound { url: String },

    /// HTTP 401/403 or a persisted anti-pattern says authentication is required
    #[error("authentication required: {url}")]
    AuthRequired { url: String },

    /// HTTP 429 or an anomaly classified as rate limiting
    #[error("rate limited: {url}")]
    RateLimited { url: String },

    /// Anti-bot challenge or captcha detected
    #[error("blocked by anti-bot protection: {url}")]
    Blocked { url: String },

    /// Per-tier or total timeout exceeded
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Upstream returned a 5xx status
    #[error("server error {status} from: {url}")]
    ServerError { url: String, status: u16 },

    /// Content too short, missing required markers, or a learned validator rejected it
    #[error("content validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// No strategy matched and the browser tier was disallowed
    #[error("no strategy could handle: {url}")]
    Unsupported { url: String },

    /// Anything that does not fit the taxonomy
    #[error("fetch failed: {message}")]
    Unknown { message: String },
}

impl FetchError {
    /// Severity rank used when the orchestrator has to pick one failure
    /// to surface. Higher is more severe.
    pub fn severity(&self) -> u8 {
        match self {
            FetchError::Unknown { .. } => 0,
            FetchError::ValidationFailed { .. } => 1,
            FetchError::Unsupported { .. } => 2,
            FetchError::NotFound { .. } => 3,
            FetchError::Timeout { .. } => 4,
            FetchError::ServerError { .. } => 5,
            FetchError::RateLimited { .. } => 6,
            FetchError::AuthRequired { .. } => 7,
            FetchError::Blocked { .. } => 8,
        }
    }

    /// Failures that stay sticky for a domain (see the orchestrator's
    /// recent-failure window).
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            FetchError::AuthRequired { .. }
                | FetchError::RateLimited { .. }
                | FetchError::Blocked { .. }
        )
    }

    /// Pick the more severe of two failures.
    pub fn most_severe(self, other: FetchError) -> FetchError {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// The per-domain failure type recorded for this error.
    pub fn failure_type(&self) -> crate::types::domain::FailureType {
        use crate::types::domain::FailureType;
        match self {
            FetchError::NotFound { .. } => FailureType::NotFound,
            FetchError::AuthRequired { .. } => FailureType::AuthExpired,
            FetchError::RateLimited { .. } => FailureType::RateLimited,
            FetchError::Blocked { .. } => FailureType::Blocked,
            FetchError::Timeout { .. } => FailureType::Timeout,
            FetchError::ServerError { .. } => FailureType::ServerError,
            FetchError::ValidationFailed { .. }
            | FetchError::Unsupported { .. }
            | FetchError::Unknown { .. } => FailureType::Unknown,
        }
    }
}

/// Errors from the HTTP client wrapper.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Security validation rejected the URL
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Redirect budget exhausted
    #[error("too many redirects (limit {limit}): {url}")]
    TooManyRedirects { url: String, limit: usize },

    /// Overall request timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, metadata endpoints)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Errors from the sandbox runtime.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The sandbox host timed out waiting for script execution
    #[error("sandbox timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Engine setup failed (capability installation, prelude evaluation)
    #[error("sandbox setup failed: {0}")]
    Setup(String),

    /// The blocking execution task died
    #[error("sandbox execution task failed: {0}")]
    Join(String),
}

/// Errors from the knowledge store. Save failures are logged by the
/// store itself and never propagated to callers; these are for load
/// and explicit flush paths.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for HTTP operations.
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Result type alias for security checks.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        let validation = FetchError::ValidationFailed {
            reason: "too short".into(),
        };
        let blocked = FetchError::Blocked {
            url: "https://example.com".into(),
        };

        assert!(blocked.severity() > validation.severity());
        assert_eq!(validation.clone().most_severe(blocked.clone()), blocked);
        assert_eq!(blocked.clone().most_severe(validation), blocked);
    }

    #[test]
    fn test_sticky_failures() {
        assert!(FetchError::Blocked { url: "u".into() }.is_sticky());
        assert!(FetchError::RateLimited { url: "u".into() }.is_sticky());
        assert!(FetchError::AuthRequired { url: "u".into() }.is_sticky());
        assert!(!FetchError::NotFound { url: "u".into() }.is_sticky());
        assert!(!FetchError::Timeout { url: "u".into() }.is_sticky());
    }
}
