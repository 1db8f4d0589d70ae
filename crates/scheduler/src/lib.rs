//! `Scheduler` (C5) — registry of pools; acquire/release/stop;
//! catalog-diff application.
//!
//! No 1:1 teacher analog. Grounded in the config-reload `apply_patch`
//! pattern (add/remove/modify buckets applied against a registry) from
//! the wider example pack, reimplemented over `Pool`s instead of
//! backends. The registry itself uses `arc-swap` for lock-free reads —
//! an enrichment beyond the teacher's own `parking_lot::RwLock`-guarded
//! `NodeRegistry`, since the scheduler's read path (every acquire) is far
//! hotter than its write path (one `applyCatalogDiff` per reload).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use mcpctl_domain::diff::{CatalogDiff, SpecDiffKind};
use mcpctl_domain::error::ControlError;
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::spec::{ActivationMode, ServerSpec};
use mcpctl_instance::Instance;
use mcpctl_metadata_cache::MetadataCache;
use mcpctl_pool::{Pool, PoolStatus};
use tokio::sync::Mutex as AsyncMutex;

pub struct Scheduler {
    registry: ArcSwap<HashMap<SpecKey, Arc<Pool>>>,
    /// Serializes catalog mutation so two concurrent `applyCatalogDiff`
    /// calls cannot interleave add/remove of the same specKey.
    mutation_gate: AsyncMutex<()>,
    metadata: Arc<MetadataCache>,
}

impl Scheduler {
    pub fn new(metadata: Arc<MetadataCache>) -> Self {
        Self {
            registry: ArcSwap::from_pointee(HashMap::new()),
            mutation_gate: AsyncMutex::new(()),
            metadata,
        }
    }

    fn pool(&self, spec_key: &SpecKey) -> Option<Arc<Pool>> {
        self.registry.load().get(spec_key).cloned()
    }

    /// Copy-on-write insert. Callers hold `mutation_gate` while mutating so
    /// two concurrent diffs never race a stale-snapshot overwrite.
    fn insert_pool(&self, spec_key: SpecKey, pool: Arc<Pool>) {
        let mut next = (**self.registry.load()).clone();
        next.insert(spec_key, pool);
        self.registry.store(Arc::new(next));
    }

    fn remove_spec_key(&self, spec_key: &SpecKey) {
        let mut next = (**self.registry.load()).clone();
        next.remove(spec_key);
        self.registry.store(Arc::new(next));
    }

    pub fn pool_status(&self, spec_key: &SpecKey) -> Option<PoolStatus> {
        self.pool(spec_key).map(|p| p.status())
    }

    pub fn all_spec_keys(&self) -> Vec<SpecKey> {
        self.registry.load().keys().cloned().collect()
    }

    /// May start a new instance if none is ready.
    pub async fn acquire(
        &self,
        spec_key: &SpecKey,
        routing_key: Option<&str>,
    ) -> Result<Arc<Instance>, ControlError> {
        let pool = self
            .pool(spec_key)
            .ok_or_else(|| ControlError::FailedPrecondition(format!("unknown specKey {spec_key}")))?;
        pool.acquire(routing_key, true).await
    }

    /// Never starts a new instance; used when `RouteOptions.allowStart=false`.
    pub async fn acquire_ready(
        &self,
        spec_key: &SpecKey,
        routing_key: Option<&str>,
    ) -> Result<Arc<Instance>, ControlError> {
        let pool = self
            .pool(spec_key)
            .ok_or_else(|| ControlError::FailedPrecondition(format!("unknown specKey {spec_key}")))?;
        pool.acquire(routing_key, false).await
    }

    pub fn release(&self, spec_key: &SpecKey, instance: &Arc<Instance>) {
        if let Some(pool) = self.pool(spec_key) {
            pool.release(instance);
        }
    }

    pub fn set_desired_min_ready(&self, spec_key: &SpecKey, n: u32) {
        if let Some(pool) = self.pool(spec_key) {
            pool.set_desired_min_ready(n);
        }
    }

    /// Cooperative shutdown with drain; removes the pool from the registry
    /// once every instance has stopped.
    pub async fn stop_spec(&self, spec_key: &SpecKey, drain_timeout: Duration) {
        let Some(pool) = self.pool(spec_key) else {
            return;
        };
        pool.stop(drain_timeout).await;

        let _gate = self.mutation_gate.lock().await;
        self.remove_spec_key(spec_key);
    }

    /// Apply a structured catalog diff against the registry.
    ///
    /// 1. Stop removed and replaced specKeys.
    /// 2. Create pools for added specKeys, seeding the reconcile floor for
    ///    `always-on`/`minReady>0` specs.
    /// 3. Mutate hint-only updated specKeys in place.
    ///
    /// `reconcile_timeout` bounds each added spec's seed reconcile (see
    /// [`Pool::reconcile_min_ready`]) so one unresponsive always-on backing
    /// process cannot hang the diff — and, transitively, `ControlPlane::
    /// start` — indefinitely; callers should pass `bootstrapTimeoutSeconds`.
    ///
    /// Never aborts on a single spec's failure — callers record
    /// `ServerInitStatus.lastError` and continue (§7 propagation policy).
    pub async fn apply_catalog_diff(
        &self,
        diff: &CatalogDiff,
        spec_registry: &HashMap<SpecKey, ServerSpec>,
        reconcile_timeout: Duration,
    ) {
        let _gate = self.mutation_gate.lock().await;

        for spec_key in diff.removed_spec_keys.iter().chain(diff.replaced_spec_keys.iter()) {
            if let Some(pool) = self.pool(spec_key) {
                let timeout = Duration::from_secs(pool.spec().drain_timeout_seconds);
                pool.stop(timeout).await;
            }
            self.remove_spec_key(spec_key);
        }

        for spec_key in &diff.added_spec_keys {
            let Some(spec) = spec_registry.get(spec_key) else {
                tracing::warn!(%spec_key, "addedSpecKey has no entry in spec registry, skipping");
                continue;
            };
            let pool = Pool::new(spec_key.clone(), spec.clone(), self.metadata.clone());

            self.insert_pool(spec_key.clone(), pool.clone());

            if spec.activation_mode == ActivationMode::AlwaysOn || spec.min_ready > 0 {
                pool.reconcile_min_ready(reconcile_timeout).await;
            }
        }

        for spec_key in &diff.updated_spec_keys {
            if let (Some(pool), Some(spec)) = (self.pool(spec_key), spec_registry.get(spec_key)) {
                pool.update_hints(spec.clone());

                // A tools-only change (name/tags/exposeTools) only affects
                // discovery metadata, which the caller refreshes separately;
                // anything else may have changed capacity hints the pool
                // needs to reconcile toward.
                let kind = diff.updated_spec_kinds.get(spec_key).copied();
                if kind == Some(SpecDiffKind::RestartRequired)
                    && (spec.activation_mode == ActivationMode::AlwaysOn || spec.min_ready > 0)
                {
                    pool.reconcile_min_ready(reconcile_timeout).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_unknown_spec_key_is_failed_precondition() {
        let sched = Scheduler::new(Arc::new(MetadataCache::default()));
        let key = SpecKey::from_hex("missing".into());
        let err = sched.acquire(&key, None).await.unwrap_err();
        assert!(matches!(err, ControlError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn empty_diff_leaves_registry_untouched() {
        let sched = Scheduler::new(Arc::new(MetadataCache::default()));
        let diff = CatalogDiff::default();
        sched.apply_catalog_diff(&diff, &HashMap::new(), Duration::from_secs(5)).await;
        assert!(sched.all_spec_keys().is_empty());
    }
}
