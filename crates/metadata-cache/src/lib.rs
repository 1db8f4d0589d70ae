//! `MetadataCache` (C6) — per-specKey tools/resources/prompts with ETag
//! and TTL. Grounded in the teacher's `DedupeStore` TTL-map idiom
//! (lazy expiration on read, eager purge above a size threshold),
//! generalized from a single boolean "seen" map to three typed views.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_protocol::{McpPromptDef, McpResourceDef, McpToolDef};
use parking_lot::Mutex;

const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// One cached view: a value plus an ETag that is rewritten on every `Set`,
/// even when the content is unchanged, so callers can diff by inequality
/// alone.
#[derive(Clone)]
struct ViewEntry<T> {
    value: T,
    etag: String,
    cached_at: DateTime<Utc>,
}

struct SpecMetadata {
    tools: Option<ViewEntry<Vec<McpToolDef>>>,
    resources: Option<ViewEntry<Vec<McpResourceDef>>>,
    prompts: Option<ViewEntry<Vec<McpPromptDef>>>,
    next_etag: u64,
}

impl Default for SpecMetadata {
    fn default() -> Self {
        Self {
            tools: None,
            resources: None,
            prompts: None,
            next_etag: 0,
        }
    }
}

impl SpecMetadata {
    fn next_etag(&mut self) -> String {
        self.next_etag += 1;
        self.next_etag.to_string()
    }
}

pub struct MetadataCache {
    entries: Mutex<HashMap<SpecKey, SpecMetadata>>,
    ttl: Duration,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(cached_at: DateTime<Utc>, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(cached_at);
        age.to_std().map(|d| d > ttl).unwrap_or(false)
    }

    pub fn set_tools(&self, spec_key: &SpecKey, tools: Vec<McpToolDef>) -> String {
        let mut entries = self.entries.lock();
        let entry = entries.entry(spec_key.clone()).or_default();
        let etag = entry.next_etag();
        entry.tools = Some(ViewEntry {
            value: tools,
            etag: etag.clone(),
            cached_at: Utc::now(),
        });
        etag
    }

    pub fn set_resources(&self, spec_key: &SpecKey, resources: Vec<McpResourceDef>) -> String {
        let mut entries = self.entries.lock();
        let entry = entries.entry(spec_key.clone()).or_default();
        let etag = entry.next_etag();
        entry.resources = Some(ViewEntry {
            value: resources,
            etag: etag.clone(),
            cached_at: Utc::now(),
        });
        etag
    }

    pub fn set_prompts(&self, spec_key: &SpecKey, prompts: Vec<McpPromptDef>) -> String {
        let mut entries = self.entries.lock();
        let entry = entries.entry(spec_key.clone()).or_default();
        let etag = entry.next_etag();
        entry.prompts = Some(ViewEntry {
            value: prompts,
            etag: etag.clone(),
            cached_at: Utc::now(),
        });
        etag
    }

    pub fn get_tools(&self, spec_key: &SpecKey) -> Option<(Vec<McpToolDef>, String)> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(spec_key)?;
        let view = entry.tools.as_ref()?;
        if Self::is_expired(view.cached_at, self.ttl) {
            entry.tools = None;
            return None;
        }
        Some((view.value.clone(), view.etag.clone()))
    }

    pub fn get_resources(&self, spec_key: &SpecKey) -> Option<(Vec<McpResourceDef>, String)> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(spec_key)?;
        let view = entry.resources.as_ref()?;
        if Self::is_expired(view.cached_at, self.ttl) {
            entry.resources = None;
            return None;
        }
        Some((view.value.clone(), view.etag.clone()))
    }

    pub fn get_prompts(&self, spec_key: &SpecKey) -> Option<(Vec<McpPromptDef>, String)> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(spec_key)?;
        let view = entry.prompts.as_ref()?;
        if Self::is_expired(view.cached_at, self.ttl) {
            entry.prompts = None;
            return None;
        }
        Some((view.value.clone(), view.etag.clone()))
    }

    /// All cached tools across every non-expired spec, purging expired
    /// entries eagerly first (as the aggregate reader path always does).
    pub fn all_tools(&self) -> Vec<(SpecKey, Vec<McpToolDef>)> {
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        let mut out = Vec::new();
        for (key, meta) in entries.iter_mut() {
            if let Some(view) = &meta.tools {
                if Self::is_expired(view.cached_at, ttl) {
                    meta.tools = None;
                } else {
                    out.push((key.clone(), view.value.clone()));
                }
            }
        }
        out
    }

    /// All cached resources across every non-expired spec, purging expired
    /// entries eagerly first.
    pub fn all_resources(&self) -> Vec<(SpecKey, Vec<McpResourceDef>)> {
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        let mut out = Vec::new();
        for (key, meta) in entries.iter_mut() {
            if let Some(view) = &meta.resources {
                if Self::is_expired(view.cached_at, ttl) {
                    meta.resources = None;
                } else {
                    out.push((key.clone(), view.value.clone()));
                }
            }
        }
        out
    }

    /// All cached prompts across every non-expired spec, purging expired
    /// entries eagerly first.
    pub fn all_prompts(&self) -> Vec<(SpecKey, Vec<McpPromptDef>)> {
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        let mut out = Vec::new();
        for (key, meta) in entries.iter_mut() {
            if let Some(view) = &meta.prompts {
                if Self::is_expired(view.cached_at, ttl) {
                    meta.prompts = None;
                } else {
                    out.push((key.clone(), view.value.clone()));
                }
            }
        }
        out
    }

    /// Wipe all three views for a specKey (e.g. on pool stop/replace).
    pub fn clear_spec(&self, spec_key: &SpecKey) {
        self.entries.lock().remove(spec_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SpecKey {
        mcpctl_domain::fingerprint::SpecKey::from_hex(s.to_string())
    }

    #[test]
    fn etag_is_monotonic_even_without_content_change() {
        let cache = MetadataCache::default();
        let k = key("abc");
        let e1 = cache.set_tools(&k, vec![]);
        let e2 = cache.set_tools(&k, vec![]);
        assert_ne!(e1, e2);
    }

    #[test]
    fn ttl_expires_lazily_on_read() {
        let cache = MetadataCache::new(Duration::from_millis(0));
        let k = key("abc");
        cache.set_tools(&k, vec![]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_tools(&k).is_none());
    }

    #[test]
    fn clear_spec_wipes_all_views() {
        let cache = MetadataCache::default();
        let k = key("abc");
        cache.set_tools(&k, vec![]);
        cache.set_resources(&k, vec![]);
        cache.clear_spec(&k);
        assert!(cache.get_tools(&k).is_none());
        assert!(cache.get_resources(&k).is_none());
    }
}
