//! Domain groups: curated sets of related domains sharing selectors.
//!
//! Group membership is declared via configuration; the engine never
//! infers it.

use serde::{Deserialize, Serialize};

/// Immutable configuration mapping a group name to shared site traits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainGroup {
    pub name: String,

    /// Member domains (normalized hostnames)
    pub domains: Vec<String>,

    /// Cookie-banner dismissal selectors shared across the group
    #[serde(default)]
    pub cookie_banner_selectors: Vec<String>,

    /// Content selectors shared across the group
    #[serde(default)]
    pub content_selectors: Vec<String>,

    /// Navigation selectors shared across the group
    #[serde(default)]
    pub navigation_selectors: Vec<String>,

    /// Common auth type (e.g. "oauth", "session-cookie")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    /// Primary content language
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl DomainGroup {
    pub fn new(name: impl Into<String>, domains: Vec<String>) -> Self {
        Self {
            name: name.into(),
            domains,
            cookie_banner_selectors: Vec::new(),
            content_selectors: Vec::new(),
            navigation_selectors: Vec::new(),
            auth_type: None,
            language: None,
        }
    }

    pub fn with_content_selectors(mut self, selectors: Vec<String>) -> Self {
        self.content_selectors = selectors;
        self
    }

    pub fn with_cookie_banner_selectors(mut self, selectors: Vec<String>) -> Self {
        self.cookie_banner_selectors = selectors;
        self
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d == domain)
    }
}

/// The full group configuration handed to the learning engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainGroupConfig {
    pub groups: Vec<DomainGroup>,
}

impl DomainGroupConfig {
    pub fn new(groups: Vec<DomainGroup>) -> Self {
        Self { groups }
    }

    /// The group a domain belongs to, if any.
    pub fn group_for(&self, domain: &str) -> Option<&DomainGroup> {
        self.groups.iter().find(|g| g.contains(domain))
    }

    /// Whether two domains share a group.
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        match (self.group_for(a), self.group_for(b)) {
            (Some(ga), Some(gb)) => ga.name == gb.name,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DomainGroupConfig {
        DomainGroupConfig::new(vec![
            DomainGroup::new(
                "news-network",
                vec!["news-a.example".into(), "news-b.example".into()],
            ),
            DomainGroup::new("docs", vec!["docs.example".into()]),
        ])
    }

    #[test]
    fn test_group_membership() {
        let config = config();
        assert_eq!(config.group_for("news-a.example").map(|g| g.name.as_str()), Some("news-network"));
        assert!(config.group_for("unrelated.example").is_none());
    }

    #[test]
    fn test_same_group() {
        let config = config();
        assert!(config.same_group("news-a.example", "news-b.example"));
        assert!(!config.same_group("news-a.example", "docs.example"));
        assert!(!config.same_group("news-a.example", "unrelated.example"));
    }
}
