//! `mcpctl-domain` — shared data model for the MCP control plane.
//!
//! This crate has no async runtime dependency and no I/O. It defines the
//! declarative state (`ServerSpec`, `Catalog`, `RuntimeConfig`), the
//! content-addressed spec fingerprint, the catalog summary/diff types the
//! scheduler and catalog engine exchange, and the shared error taxonomy.

pub mod client;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod runtime_config;
pub mod snapshot;
pub mod spec;

pub use client::ClientRegistration;
pub use diff::{CatalogDiff, RuntimeFieldClass};
pub use error::{ControlError, ErrorCode, Result, RouteStage};
pub use fingerprint::{fingerprint, SpecKey};
pub use runtime_config::RuntimeConfig;
pub use spec::{ActivationMode, ServerSpec, TransportConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative state: what servers should exist, with what runtime tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub specs: HashMap<String, ServerSpec>,
    pub runtime: RuntimeConfig,
}

/// Derived, read-only view of a [`Catalog`] used by the scheduler and router.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSummary {
    /// Disabled specs are excluded.
    pub spec_registry: HashMap<SpecKey, ServerSpec>,
    pub server_spec_keys: HashMap<String, SpecKey>,
    pub total_servers: usize,
    pub runtime: RuntimeConfig,
}

impl CatalogSummary {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut spec_registry = HashMap::new();
        let mut server_spec_keys = HashMap::new();

        for (name, spec) in &catalog.specs {
            if spec.disabled {
                continue;
            }
            let key = fingerprint(spec);
            spec_registry.insert(key.clone(), spec.clone());
            server_spec_keys.insert(name.clone(), key);
        }

        Self {
            total_servers: server_spec_keys.len(),
            spec_registry,
            server_spec_keys,
            runtime: catalog.runtime.clone(),
        }
    }
}

/// `{catalog, summary, revision, loadedAt}` — the catalog engine's published
/// state. `revision` is monotonic and assigned by the engine, never by a
/// caller.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogState {
    pub catalog: Catalog,
    pub summary: CatalogSummary,
    pub revision: u64,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

impl CatalogState {
    pub fn new(catalog: Catalog, revision: u64) -> Self {
        let summary = CatalogSummary::from_catalog(&catalog);
        Self {
            catalog,
            summary,
            revision,
            loaded_at: chrono::Utc::now(),
        }
    }
}
