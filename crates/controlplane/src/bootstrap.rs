//! Startup sequencing: start+handshake+metadata-fetch every enabled spec,
//! streaming `BootstrapProgressSnapshot` as it goes.
//!
//! Grounded in the teacher's `build_app_state()` — sequential per-subsystem
//! construction with a log line after each step — generalized from a fixed
//! list of named subsystems to a data-driven list of specs, and from plain
//! logging to a streamed progress snapshot since callers here are remote
//! RPC clients, not a human reading stdout.
//!
//! Resolved open question: bootstrap pre-warms every non-disabled spec
//! regardless of `activationMode`, since `spec.md` phrases the sweep as
//! "for each spec in the registry" without qualifying by activation mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::runtime_config::{BootstrapMode, RuntimeConfig};
use mcpctl_domain::snapshot::{BootstrapProgressSnapshot, InitState};
use mcpctl_domain::spec::ServerSpec;
use mcpctl_scheduler::Scheduler;

use crate::observability::InitTracker;
use crate::watchable::Watchable;

pub struct BootstrapTracker {
    progress: Watchable<BootstrapProgressSnapshot>,
}

impl BootstrapTracker {
    pub fn new() -> Self {
        Self {
            progress: Watchable::new(BootstrapProgressSnapshot::empty()),
        }
    }

    pub fn snapshot(&self) -> BootstrapProgressSnapshot {
        self.progress.get()
    }

    pub fn watch(&self) -> impl futures_core::Stream<Item = BootstrapProgressSnapshot> {
        self.progress.watch()
    }

    /// Drive every spec through start+handshake+metadata-fetch (reusing
    /// `Scheduler::acquire`, which already performs all three), bounded by
    /// `bootstrapConcurrency` in parallel mode or one-at-a-time in
    /// sequential mode, each attempt bounded by `bootstrapTimeoutSeconds`.
    /// Never aborts the whole sweep on one spec's failure.
    pub async fn run(
        &self,
        scheduler: Arc<Scheduler>,
        init_tracker: Arc<InitTracker>,
        specs: Vec<(SpecKey, ServerSpec)>,
        runtime: RuntimeConfig,
    ) {
        let total = specs.len();
        self.progress.set(BootstrapProgressSnapshot {
            total,
            completed: 0,
            failed: 0,
            current: None,
            errors: HashMap::new(),
            percentage: if total == 0 { 100.0 } else { 0.0 },
            state: if total == 0 { InitState::Completed } else { InitState::Running },
        });
        if total == 0 {
            return;
        }

        let timeout = Duration::from_secs(runtime.bootstrap_timeout_seconds);
        let batch_size = match runtime.bootstrap_mode {
            BootstrapMode::Sequential => 1,
            BootstrapMode::Parallel => runtime.bootstrap_concurrency.max(1) as usize,
        };

        let mut remaining = specs;
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut errors: HashMap<SpecKey, String> = HashMap::new();

        while !remaining.is_empty() {
            let take = remaining.len().min(batch_size);
            let batch: Vec<_> = remaining.drain(..take).collect();

            let attempts = batch.into_iter().map(|(spec_key, spec)| {
                let scheduler = Arc::clone(&scheduler);
                let init_tracker = Arc::clone(&init_tracker);
                let runtime = runtime.clone();
                async move {
                    init_tracker.mark_running(&spec_key);
                    let outcome = tokio::time::timeout(timeout, scheduler.acquire(&spec_key, None)).await;
                    let error = match outcome {
                        Ok(Ok(instance)) => {
                            scheduler.release(&spec_key, &instance);
                            init_tracker.mark_completed(&spec_key);
                            None
                        }
                        Ok(Err(e)) => {
                            init_tracker.mark_failed(&spec_key, e.to_string(), &runtime);
                            Some(e.to_string())
                        }
                        Err(_) => {
                            let msg = "bootstrap attempt timed out".to_string();
                            init_tracker.mark_failed(&spec_key, msg.clone(), &runtime);
                            Some(msg)
                        }
                    };
                    (spec_key, spec.name, error)
                }
            });

            let results = futures_util::future::join_all(attempts).await;

            for (spec_key, spec_name, error) in results {
                match error {
                    None => completed += 1,
                    Some(message) => {
                        failed += 1;
                        errors.insert(spec_key, message);
                    }
                }
                let done = completed + failed;
                self.progress.set(BootstrapProgressSnapshot {
                    total,
                    completed,
                    failed,
                    current: Some(spec_name),
                    errors: errors.clone(),
                    percentage: (done as f32 / total as f32) * 100.0,
                    state: InitState::Running,
                });
            }
        }

        self.progress.update(|p| {
            p.current = None;
            p.state = InitState::Completed;
            p.percentage = 100.0;
        });
    }
}

impl Default for BootstrapTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_registry_completes_immediately() {
        let tracker = BootstrapTracker::new();
        let scheduler = Arc::new(Scheduler::new(Arc::new(mcpctl_metadata_cache::MetadataCache::default())));
        let init_tracker = Arc::new(InitTracker::new());
        tracker.run(scheduler, init_tracker, Vec::new(), RuntimeConfig::default()).await;
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.state, InitState::Completed);
    }

    #[tokio::test]
    async fn unregistered_spec_is_recorded_as_failed() {
        let tracker = BootstrapTracker::new();
        let scheduler = Arc::new(Scheduler::new(Arc::new(mcpctl_metadata_cache::MetadataCache::default())));
        let init_tracker = Arc::new(InitTracker::new());
        let key = SpecKey::from_hex("missing".into());
        let spec = test_spec();

        tracker
            .run(scheduler, Arc::clone(&init_tracker), vec![(key.clone(), spec)], RuntimeConfig::default())
            .await;

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.state, InitState::Completed);
        assert!(init_tracker.get(&key).unwrap().last_error.is_some());
    }

    fn test_spec() -> ServerSpec {
        use mcpctl_domain::spec::{ActivationMode, TransportConfig};
        ServerSpec {
            name: "calc".into(),
            transport: TransportConfig::Stdio {
                cmd: vec!["calc-srv".into()],
                env: std::collections::HashMap::new(),
                cwd: None,
            },
            protocol_version: "2025-06-18".into(),
            idle_seconds: 600,
            max_concurrent: 1,
            min_ready: 0,
            drain_timeout_seconds: 30,
            activation_mode: ActivationMode::OnDemand,
            expose_tools: false,
            tags: vec![],
            disabled: false,
        }
    }
}
