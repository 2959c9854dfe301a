//! Data model for the acquisition engine.

pub mod anti_pattern;
pub mod config;
pub mod content;
pub mod domain;
pub mod group;
pub mod tier;

pub use anti_pattern::{AntiPattern, FailureCategory};
pub use config::{
    ExtractOptions, FetchOptions, Freshness, LearningConfig, DEFAULT_MIN_CONTENT_LENGTH,
};
pub use content::{Confidence, ContentResult, ExtractedContent, ResultMeta};
pub use domain::{
    normalize_domain, ApiPattern, DecayEvent, DomainEntry, FailureContext, FailureType,
    LearnedValidator, PaginationKind, PaginationPattern, Provenance, RefreshPattern,
    SelectorPattern, SuccessProfile,
};
pub use group::{DomainGroup, DomainGroupConfig};
pub use tier::{FetchBudget, Tier, TierPreference, TierSkip, TieredFetchResult};
