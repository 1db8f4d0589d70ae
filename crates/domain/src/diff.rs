//! `CatalogDiff` — structured difference between two catalog summaries.

use crate::fingerprint::SpecKey;
use std::collections::{HashMap, HashSet};

/// Runtime-config field classification used by the catalog engine and the
/// scheduler's `applyCatalogDiff`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeFieldClass {
    /// Fields that can be applied in place (interval timers reprogrammed).
    pub dynamic_fields: Vec<String>,
    /// Fields that require the embedding process to restart.
    pub restart_required_fields: Vec<String>,
}

impl RuntimeFieldClass {
    pub fn is_empty(&self) -> bool {
        self.dynamic_fields.is_empty() && self.restart_required_fields.is_empty()
    }
}

/// Structured difference between two [`crate::CatalogSummary`]s.
#[derive(Debug, Clone, Default)]
pub struct CatalogDiff {
    pub added_spec_keys: HashSet<SpecKey>,
    pub removed_spec_keys: HashSet<SpecKey>,
    /// A name whose spec's identity fields changed: old key retired, new key
    /// introduced for the same logical name.
    pub replaced_spec_keys: HashSet<SpecKey>,
    /// Same identity, changed hint fields only — stays live.
    pub updated_spec_keys: HashSet<SpecKey>,
    /// Per-entry classification of `updated_spec_keys`, populated
    /// alongside it — see [`SpecDiffKind`].
    pub updated_spec_kinds: HashMap<SpecKey, SpecDiffKind>,
    pub tags_changed: HashSet<SpecKey>,
    pub runtime_changed: bool,
    pub runtime_fields: RuntimeFieldClass,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.added_spec_keys.is_empty()
            && self.removed_spec_keys.is_empty()
            && self.replaced_spec_keys.is_empty()
            && self.updated_spec_keys.is_empty()
            && self.tags_changed.is_empty()
            && !self.runtime_changed
    }
}

/// Classification of one entry in `CatalogDiff::updated_spec_kinds` — a
/// same-specKey change (identity fields are untouched; an identity change
/// would have produced a `replaced`+`added` pair instead). `ToolsOnly` means
/// only `name`/`tags`/`exposeTools` differ, so a pool's running instances
/// need no reconciling beyond the in-place hint swap. `RestartRequired`
/// means a capacity- or policy-affecting hint changed (`maxConcurrent`,
/// `minReady`, `idleSeconds`, `drainTimeoutSeconds`, `activationMode`) and
/// the pool's instance count may now need reconciling toward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecDiffKind {
    ToolsOnly,
    RestartRequired,
}
