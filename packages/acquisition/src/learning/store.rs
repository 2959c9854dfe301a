//! Knowledge store: debounced, atomic persistence of per-domain
//! learning state.
//!
//! The store exclusively owns every [`DomainEntry`] and [`AntiPattern`].
//! All mutation goes through `&self` methods behind a single writer
//! lock; persistence is a background task that coalesces dirty marks
//! at one-second granularity and writes atomically (temp sibling, then
//! rename).

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::anti_pattern::AntiPattern;
use crate::types::domain::{ApiPattern, DomainEntry, Provenance};

/// Maximum learning events retained, newest-last.
pub const MAX_LEARNING_EVENTS: usize = 100;

/// Debounce window for persistence.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(1);

/// Marker file suppressing legacy re-migration.
pub const MIGRATION_MARKER: &str = ".knowledge-base-migrated";

/// One recorded learning occurrence (for observability, capped).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEvent {
    pub id: String,
    pub kind: String,
    pub domain: String,
    pub detail: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: chrono::DateTime<Utc>,
}

impl LearningEvent {
    pub fn new(kind: impl Into<String>, domain: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            domain: domain.into(),
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

/// The single persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    #[serde(default)]
    pub entries: IndexMap<String, DomainEntry>,

    /// Newest-last, cap 100
    #[serde(default)]
    pub learning_events: Vec<LearningEvent>,

    /// Non-expired only
    #[serde(default)]
    pub anti_patterns: Vec<AntiPattern>,

    /// Epoch milliseconds of the last save
    #[serde(default)]
    pub last_saved: i64,
}

/// Legacy flat format: `{domain → {patterns, usageCount, successRate,
/// lastUsed}}`, absorbed once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDomainRecord {
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    usage_count: u64,
    #[serde(default)]
    success_rate: f64,
    #[serde(default)]
    last_used: i64,
}

pub struct KnowledgeStore {
    path: Option<PathBuf>,
    state: RwLock<KnowledgeDocument>,
    dirty: Notify,
    debounce: Duration,
}

impl KnowledgeStore {
    /// In-memory store; nothing is ever written to disk.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            path: None,
            state: RwLock::new(KnowledgeDocument::default()),
            dirty: Notify::new(),
            debounce: SAVE_DEBOUNCE,
        })
    }

    /// Load (or initialize) the store at `path` and start the flush
    /// task. Load failures yield empty state plus a warning; they are
    /// never fatal.
    pub async fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let document = Self::load_document(&path).await;

        let store = Arc::new(Self {
            path: Some(path),
            state: RwLock::new(document),
            dirty: Notify::new(),
            debounce: SAVE_DEBOUNCE,
        });
        store.clone().spawn_flush_task();
        store
    }

    async fn load_document(path: &Path) -> KnowledgeDocument {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no knowledge base yet, starting empty");
                return KnowledgeDocument::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "knowledge base unreadable, starting empty");
                return KnowledgeDocument::default();
            }
        };

        // Current format first
        if let Ok(mut document) = serde_json::from_str::<KnowledgeDocument>(&raw) {
            // A legacy file can deserialize into an all-default
            // document; only accept it when it has the entries key.
            let looks_current = serde_json::from_str::<serde_json::Value>(&raw)
                .map(|v| v.get("entries").is_some() || v.as_object().map_or(true, |o| o.is_empty()))
                .unwrap_or(false);
            if looks_current {
                let now = Utc::now();
                let before = document.anti_patterns.len();
                document.anti_patterns.retain(|ap| !ap.is_expired(now));
                if document.anti_patterns.len() < before {
                    debug!(
                        expired = before - document.anti_patterns.len(),
                        "dropped expired anti-patterns on load"
                    );
                }
                return document;
            }
        }

        // Legacy flat format, one-shot migration guarded by a marker
        let marker = migration_marker_path(path);
        if marker.exists() {
            warn!(path = %path.display(), "unparseable knowledge base (already migrated), starting empty");
            return KnowledgeDocument::default();
        }

        match serde_json::from_str::<IndexMap<String, LegacyDomainRecord>>(&raw) {
            Ok(legacy) => {
                info!(domains = legacy.len(), "migrating legacy knowledge base");
                let document = migrate_legacy(legacy);
                // Write migrated state first, then the marker: a crash
                // between the two re-runs an idempotent migration.
                if let Err(e) = write_atomic(path, &document).await {
                    warn!(error = %e, "failed to persist migrated knowledge base");
                }
                if let Err(e) = tokio::fs::write(&marker, b"migrated\n").await {
                    warn!(error = %e, "failed to write migration marker");
                }
                document
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "knowledge base unparseable, starting empty");
                KnowledgeDocument::default()
            }
        }
    }

    fn spawn_flush_task(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                self.dirty.notified().await;
                // Coalesce further marks within the debounce window
                tokio::time::sleep(self.debounce).await;
                self.flush().await;
            }
        });
    }

    /// Mark state dirty; the flush task persists after the debounce
    /// window.
    pub fn mark_dirty(&self) {
        self.dirty.notify_one();
    }

    /// Persist immediately. Failures are logged, never propagated.
    pub async fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = {
            let mut state = self.state.write().unwrap();
            state.last_saved = Utc::now().timestamp_millis();
            state.clone()
        };
        if let Err(e) = write_atomic(path, &snapshot).await {
            warn!(path = %path.display(), error = %e, "knowledge base save failed");
        } else {
            debug!(path = %path.display(), domains = snapshot.entries.len(), "knowledge base saved");
        }
    }

    /// Read access to a consistent snapshot of one entry.
    pub fn entry(&self, domain: &str) -> Option<DomainEntry> {
        self.state.read().unwrap().entries.get(domain).cloned()
    }

    pub fn domains(&self) -> Vec<String> {
        self.state.read().unwrap().entries.keys().cloned().collect()
    }

    pub fn entry_count(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    /// Mutate (creating if absent) one entry under the writer lock.
    pub fn with_entry_mut<T>(&self, domain: &str, f: impl FnOnce(&mut DomainEntry) -> T) -> T {
        let result = {
            let mut state = self.state.write().unwrap();
            let entry = state
                .entries
                .entry(domain.to_string())
                .or_insert_with(DomainEntry::new);
            f(entry)
        };
        self.mark_dirty();
        result
    }

    /// Mutate an entry only if it exists.
    pub fn with_existing_entry_mut<T>(
        &self,
        domain: &str,
        f: impl FnOnce(&mut DomainEntry) -> T,
    ) -> Option<T> {
        let result = {
            let mut state = self.state.write().unwrap();
            state.entries.get_mut(domain).map(f)
        };
        if result.is_some() {
            self.mark_dirty();
        }
        result
    }

    /// Run a closure over every entry under the writer lock.
    pub fn for_each_entry_mut(&self, mut f: impl FnMut(&str, &mut DomainEntry)) {
        {
            let mut state = self.state.write().unwrap();
            for (domain, entry) in state.entries.iter_mut() {
                f(domain, entry);
            }
        }
        self.mark_dirty();
    }

    /// Append a learning event, keeping the newest-last cap.
    pub fn push_event(&self, event: LearningEvent) {
        {
            let mut state = self.state.write().unwrap();
            state.learning_events.push(event);
            let overflow = state.learning_events.len().saturating_sub(MAX_LEARNING_EVENTS);
            if overflow > 0 {
                state.learning_events.drain(..overflow);
            }
        }
        self.mark_dirty();
    }

    pub fn events(&self) -> Vec<LearningEvent> {
        self.state.read().unwrap().learning_events.clone()
    }

    /// Upsert an anti-pattern by id.
    pub fn upsert_anti_pattern(&self, anti_pattern: AntiPattern) {
        {
            let mut state = self.state.write().unwrap();
            match state
                .anti_patterns
                .iter_mut()
                .find(|ap| ap.id == anti_pattern.id)
            {
                Some(existing) => *existing = anti_pattern,
                None => state.anti_patterns.push(anti_pattern),
            }
        }
        self.mark_dirty();
    }

    pub fn anti_patterns(&self) -> Vec<AntiPattern> {
        self.state.read().unwrap().anti_patterns.clone()
    }

    /// Find a live anti-pattern by category and domain.
    pub fn find_anti_pattern(
        &self,
        category: crate::types::anti_pattern::FailureCategory,
        domain: &str,
    ) -> Option<AntiPattern> {
        let now = Utc::now();
        self.state
            .read()
            .unwrap()
            .anti_patterns
            .iter()
            .find(|ap| {
                ap.failure_category == category
                    && !ap.is_expired(now)
                    && ap.domains.iter().any(|d| d == domain)
            })
            .cloned()
    }

    /// Serialize the current state (tests and diagnostics).
    pub fn snapshot(&self) -> KnowledgeDocument {
        self.state.read().unwrap().clone()
    }
}

fn migration_marker_path(path: &Path) -> PathBuf {
    path.with_file_name(MIGRATION_MARKER)
}

fn migrate_legacy(legacy: IndexMap<String, LegacyDomainRecord>) -> KnowledgeDocument {
    let mut document = KnowledgeDocument::default();
    for (domain, record) in legacy {
        let mut entry = DomainEntry::new();
        entry.usage_count = record.usage_count;
        entry.overall_success_rate = record.success_rate.clamp(0.0, 1.0);
        if let Some(last_used) = chrono::DateTime::from_timestamp_millis(record.last_used) {
            entry.last_used = last_used;
        }
        for endpoint in record.patterns {
            let mut pattern =
                ApiPattern::new(endpoint, "GET", Provenance::new("legacy-migration"));
            // Legacy patterns carried no verification history; do not
            // trust them with bypass until re-verified.
            pattern.set_confidence(crate::types::content::Confidence::Medium);
            entry.api_patterns.push(pattern);
        }
        document.entries.insert(domain, entry);
    }
    document.learning_events.push(LearningEvent::new(
        "migration",
        "*",
        format!("absorbed {} legacy domains", document.entries.len()),
    ));
    document
}

async fn write_atomic(path: &Path, document: &KnowledgeDocument) -> StoreResult<()> {
    let serialized = serde_json::to_string_pretty(document)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serialized.as_bytes()).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::anti_pattern::FailureCategory;

    #[tokio::test]
    async fn test_missing_file_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path().join("kb.json")).await;
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_persist_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");

        let store = KnowledgeStore::open(&path).await;
        store.with_entry_mut("example.com", |entry| {
            entry.usage_count = 7;
            entry.api_patterns.push(ApiPattern::new(
                "https://example.com/api/items",
                "GET",
                Provenance::new("test"),
            ));
        });
        store.push_event(LearningEvent::new("test", "example.com", "learned"));
        store.flush().await;

        let reloaded = KnowledgeStore::open(&path).await;
        let entry = reloaded.entry("example.com").unwrap();
        assert_eq!(entry.usage_count, 7);
        assert_eq!(entry.api_patterns.len(), 1);
        assert_eq!(reloaded.events().len(), 1);

        // Round trip: serialize → reload → serialize matches modulo lastSaved
        let mut a = store.snapshot();
        let mut b = reloaded.snapshot();
        a.last_saved = 0;
        b.last_saved = 0;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn test_legacy_migration_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");

        let legacy = r#"{
            "old.example.com": {
                "patterns": ["https://old.example.com/api/v1/posts"],
                "usageCount": 42,
                "successRate": 0.9,
                "lastUsed": 1700000000000
            }
        }"#;
        tokio::fs::write(&path, legacy).await.unwrap();

        let store = KnowledgeStore::open(&path).await;
        let entry = store.entry("old.example.com").unwrap();
        assert_eq!(entry.usage_count, 42);
        assert_eq!(entry.api_patterns.len(), 1);
        assert!(!entry.api_patterns[0].can_bypass);

        // Marker written after migrated state
        assert!(dir.path().join(MIGRATION_MARKER).exists());

        // Reload reads the migrated document, not the legacy path
        let reloaded = KnowledgeStore::open(&path).await;
        assert!(reloaded.entry("old.example.com").is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        tokio::fs::write(&path, "{{{{ not json").await.unwrap();

        let store = KnowledgeStore::open(&path).await;
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_anti_patterns_filtered_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");

        let store = KnowledgeStore::open(&path).await;
        let live = AntiPattern::new(FailureCategory::AuthRequired, "a.example");
        let expired = AntiPattern::new(FailureCategory::WrongEndpoint, "b.example")
            .with_expiry(Utc::now() - chrono::Duration::hours(1));
        store.upsert_anti_pattern(live.clone());
        store.upsert_anti_pattern(expired);
        store.flush().await;

        let reloaded = KnowledgeStore::open(&path).await;
        let anti_patterns = reloaded.anti_patterns();
        assert_eq!(anti_patterns.len(), 1);
        assert_eq!(anti_patterns[0].id, live.id);
    }

    #[test]
    fn test_event_cap_newest_last() {
        let store = KnowledgeStore::in_memory();
        for i in 0..150 {
            store.push_event(LearningEvent::new("k", "d", format!("event {i}")));
        }
        let events = store.events();
        assert_eq!(events.len(), MAX_LEARNING_EVENTS);
        assert_eq!(events.last().unwrap().detail, "event 149");
        assert_eq!(events.first().unwrap().detail, "event 50");
    }
}
