//! Observability surface: pool status, per-spec init tracking, retry, and a
//! broadcast log stream.
//!
//! `InitTracker`'s lazy backoff calculation is grounded in
//! `RuntimeConfig.init_retry_*`; no teacher analog carries per-entity retry
//! state like this, so the shape here is new, built directly off
//! `ServerInitStatusSnapshot` (already defined per SPEC_FULL.md's
//! supplemented snapshot types).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use mcpctl_catalog::CatalogEngine;
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::runtime_config::RuntimeConfig;
use mcpctl_domain::snapshot::{InitState, PoolStatusSnapshot, ServerInitStatusSnapshot};
use mcpctl_scheduler::Scheduler;
use parking_lot::RwLock;

use crate::watchable::Watchable;

pub struct InitTracker {
    statuses: RwLock<HashMap<SpecKey, ServerInitStatusSnapshot>>,
}

impl InitTracker {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    fn entry(
        statuses: &mut HashMap<SpecKey, ServerInitStatusSnapshot>,
        spec_key: &SpecKey,
    ) -> &mut ServerInitStatusSnapshot {
        statuses.entry(spec_key.clone()).or_insert_with(|| ServerInitStatusSnapshot {
            spec_key: spec_key.clone(),
            state: InitState::Pending,
            last_error: None,
            attempt: 0,
            next_retry_at: None,
        })
    }

    pub fn mark_running(&self, spec_key: &SpecKey) {
        let mut g = self.statuses.write();
        Self::entry(&mut g, spec_key).state = InitState::Running;
    }

    pub fn mark_completed(&self, spec_key: &SpecKey) {
        let mut g = self.statuses.write();
        let entry = Self::entry(&mut g, spec_key);
        entry.state = InitState::Completed;
        entry.last_error = None;
        entry.next_retry_at = None;
    }

    pub fn mark_failed(&self, spec_key: &SpecKey, error: String, runtime: &RuntimeConfig) {
        let mut g = self.statuses.write();
        let entry = Self::entry(&mut g, spec_key);
        entry.state = InitState::Failed;
        entry.last_error = Some(error);
        entry.attempt += 1;
        let delay_ms = backoff_ms(entry.attempt, runtime.init_retry_base_ms, runtime.init_retry_max_ms);
        entry.next_retry_at = Some(Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
    }

    pub fn reset_for_retry(&self, spec_key: &SpecKey) {
        let mut g = self.statuses.write();
        let entry = Self::entry(&mut g, spec_key);
        entry.state = InitState::Pending;
        entry.next_retry_at = None;
    }

    pub fn get(&self, spec_key: &SpecKey) -> Option<ServerInitStatusSnapshot> {
        self.statuses.read().get(spec_key).cloned()
    }
}

impl Default for InitTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff clamped to `init_retry_max_ms`, doubling per attempt.
fn backoff_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let shift = attempt.min(20);
    base_ms.saturating_mul(1u64 << shift).min(max_ms)
}

pub struct Observability {
    scheduler: Arc<Scheduler>,
    catalog: Arc<CatalogEngine>,
    init_tracker: Arc<InitTracker>,
    pool_status: Watchable<Arc<Vec<PoolStatusSnapshot>>>,
}

impl Observability {
    pub fn new(scheduler: Arc<Scheduler>, catalog: Arc<CatalogEngine>, init_tracker: Arc<InitTracker>) -> Self {
        Self {
            scheduler,
            catalog,
            init_tracker,
            pool_status: Watchable::new(Arc::new(Vec::new())),
        }
    }

    pub fn init_tracker(&self) -> Arc<InitTracker> {
        Arc::clone(&self.init_tracker)
    }

    /// Recompute the aggregated pool-status view from the scheduler's
    /// current registry. Called on a timer and after every catalog change.
    pub fn refresh_pool_status(&self) {
        let snapshot = self.catalog.snapshot();
        let mut statuses = Vec::new();
        for spec_key in self.scheduler.all_spec_keys() {
            let Some(status) = self.scheduler.pool_status(&spec_key) else {
                continue;
            };
            let server_name = snapshot
                .summary
                .spec_registry
                .get(&spec_key)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            statuses.push(PoolStatusSnapshot {
                spec_key,
                server_name,
                instance_count: status.instance_count,
                ready_count: status.ready_count,
                busy_count: status.busy_count,
                draining_count: status.draining_count,
                desired_min_ready: status.desired_min_ready,
            });
        }
        self.pool_status.set(Arc::new(statuses));
    }

    pub fn get_pool_status(&self, spec_key: &SpecKey) -> Option<PoolStatusSnapshot> {
        self.pool_status.get().iter().find(|s| &s.spec_key == spec_key).cloned()
    }

    pub fn watch_runtime_status(&self) -> impl futures_core::Stream<Item = Arc<Vec<PoolStatusSnapshot>>> {
        self.pool_status.watch()
    }

    pub fn get_server_init_status(&self, spec_key: &SpecKey) -> Option<ServerInitStatusSnapshot> {
        self.init_tracker.get(spec_key)
    }

    pub async fn retry_server_init(&self, spec_key: &SpecKey) -> Result<(), mcpctl_domain::error::ControlError> {
        self.init_tracker.reset_for_retry(spec_key);
        self.init_tracker.mark_running(spec_key);

        match self.scheduler.acquire(spec_key, None).await {
            Ok(instance) => {
                self.scheduler.release(spec_key, &instance);
                self.init_tracker.mark_completed(spec_key);
                Ok(())
            }
            Err(e) => {
                let runtime = self.catalog.snapshot().summary.runtime.clone();
                self.init_tracker.mark_failed(spec_key, e.to_string(), &runtime);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_clamps() {
        assert_eq!(backoff_ms(0, 500, 30_000), 500);
        assert_eq!(backoff_ms(1, 500, 30_000), 1_000);
        assert_eq!(backoff_ms(2, 500, 30_000), 2_000);
        assert_eq!(backoff_ms(10, 500, 30_000), 30_000);
    }

    #[test]
    fn failed_then_retry_resets_state() {
        let tracker = InitTracker::new();
        let key = SpecKey::from_hex("k".into());
        tracker.mark_failed(&key, "boom".into(), &RuntimeConfig::default());
        let status = tracker.get(&key).unwrap();
        assert_eq!(status.state, InitState::Failed);
        assert_eq!(status.attempt, 1);
        assert!(status.next_retry_at.is_some());

        tracker.reset_for_retry(&key);
        let status = tracker.get(&key).unwrap();
        assert_eq!(status.state, InitState::Pending);
        assert!(status.next_retry_at.is_none());
    }
}
