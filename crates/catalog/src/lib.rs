//! `CatalogEngine` (C8) — the declarative catalog's single writer.
//!
//! Grounded on the `LiveConfig`/`compute_diff`/`ConfigWatcher`/`apply_patch`
//! reload pipeline: loads are serialized through a gate, each accepted load
//! gets a strictly increasing revision, and an empty diff produces no event.
//! Unlike that source (which mutates a live backend registry directly),
//! this engine only computes and broadcasts the diff — applying it against
//! the scheduler is the caller's job, same division of labor as
//! `mcpctl_scheduler::Scheduler::apply_catalog_diff`.

pub mod diff;
pub mod source;
pub mod watcher;

pub use diff::compute_diff;
pub use source::{CatalogSource, TomlFileCatalogSource};
pub use watcher::CatalogWatcher;

use mcpctl_domain::diff::CatalogDiff;
use mcpctl_domain::error::ControlError;
use mcpctl_domain::CatalogState;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadSource {
    Bootstrap,
    Watch,
    Manual,
}

#[derive(Clone)]
pub struct CatalogUpdate {
    pub snapshot: Arc<CatalogState>,
    pub diff: CatalogDiff,
    pub source: ReloadSource,
}

pub struct CatalogEngine {
    source: Arc<dyn CatalogSource>,
    state: RwLock<Arc<CatalogState>>,
    /// Serializes loads so two concurrent reloads never race a
    /// stale-snapshot overwrite.
    load_gate: AsyncMutex<()>,
    next_revision: AtomicU64,
    updates: broadcast::Sender<CatalogUpdate>,
}

impl CatalogEngine {
    /// Load the initial catalog at revision 0 and seed the broadcast
    /// channel. Errors here are fatal to startup; callers should surface
    /// them rather than retry silently.
    pub async fn bootstrap(source: Arc<dyn CatalogSource>) -> Result<Arc<Self>, ControlError> {
        let catalog = source.load().await?;
        let state = Arc::new(CatalogState::new(catalog, 0));
        let (updates, _rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            source,
            state: RwLock::new(state),
            load_gate: AsyncMutex::new(()),
            next_revision: AtomicU64::new(1),
            updates,
        }))
    }

    pub fn snapshot(&self) -> Arc<CatalogState> {
        Arc::clone(&self.state.read())
    }

    /// Lazy sequence of catalog updates: the first element mirrors the
    /// current snapshot with an empty diff; subsequent elements are emitted
    /// on every non-empty `reload`. Never terminates on its own; the
    /// consumer drops the stream to stop watching.
    pub fn watch(&self) -> impl futures_core::Stream<Item = CatalogUpdate> {
        let initial = CatalogUpdate {
            snapshot: self.snapshot(),
            diff: CatalogDiff::default(),
            source: ReloadSource::Manual,
        };
        let mut rx = self.updates.subscribe();

        async_stream::stream! {
            yield initial;
            loop {
                match rx.recv().await {
                    Ok(update) => yield update,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Reload from the source, diff against the current snapshot, and
    /// broadcast the update only if the diff is non-empty.
    pub async fn reload(&self, source: ReloadSource) -> Result<(), ControlError> {
        let _gate = self.load_gate.lock().await;

        let old_state = self.snapshot();
        let catalog = self.source.load().await?;
        let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        let new_state = Arc::new(CatalogState::new(catalog, revision));

        let diff = compute_diff(&old_state.summary, &new_state.summary);
        if diff.is_empty() {
            tracing::debug!("catalog reload: no changes detected");
            return Ok(());
        }

        *self.state.write() = Arc::clone(&new_state);

        let update = CatalogUpdate {
            snapshot: new_state,
            diff,
            source,
        };
        // Zero receivers is a normal startup state, not an error.
        let _ = self.updates.send(update);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use mcpctl_domain::Catalog;
    use parking_lot::Mutex as SyncMutex;

    struct FixtureSource {
        catalogs: SyncMutex<Vec<Catalog>>,
    }

    #[async_trait]
    impl CatalogSource for FixtureSource {
        async fn load(&self) -> Result<Catalog, ControlError> {
            let mut catalogs = self.catalogs.lock();
            if catalogs.len() > 1 {
                Ok(catalogs.remove(0))
            } else {
                Ok(catalogs[0].clone())
            }
        }
    }

    #[tokio::test]
    async fn bootstrap_seeds_revision_zero() {
        let source = Arc::new(FixtureSource {
            catalogs: SyncMutex::new(vec![Catalog::default()]),
        });
        let engine = CatalogEngine::bootstrap(source).await.unwrap();
        assert_eq!(engine.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn reload_with_no_changes_keeps_revision() {
        let source = Arc::new(FixtureSource {
            catalogs: SyncMutex::new(vec![Catalog::default()]),
        });
        let engine = CatalogEngine::bootstrap(source).await.unwrap();
        engine.reload(ReloadSource::Manual).await.unwrap();
        assert_eq!(engine.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn reload_with_changes_bumps_revision_and_broadcasts() {
        use mcpctl_domain::spec::TransportConfig;
        use mcpctl_domain::ServerSpec;
        use std::collections::HashMap;

        let mut changed = Catalog::default();
        changed.specs.insert(
            "calc".to_string(),
            ServerSpec {
                name: "calc".to_string(),
                transport: TransportConfig::Stdio {
                    cmd: vec!["calc-srv".to_string()],
                    env: HashMap::new(),
                    cwd: None,
                },
                protocol_version: "2025-06-18".into(),
                idle_seconds: 600,
                max_concurrent: 1,
                min_ready: 0,
                drain_timeout_seconds: 30,
                activation_mode: Default::default(),
                expose_tools: false,
                tags: vec![],
                disabled: false,
            },
        );

        let source = Arc::new(FixtureSource {
            catalogs: SyncMutex::new(vec![Catalog::default(), changed]),
        });
        let engine = CatalogEngine::bootstrap(source).await.unwrap();

        let mut stream = Box::pin(engine.watch());
        let first = stream.next().await.unwrap();
        assert!(first.diff.is_empty());

        engine.reload(ReloadSource::Watch).await.unwrap();
        assert_eq!(engine.snapshot().revision, 1);

        let update = stream.next().await.unwrap();
        assert_eq!(update.diff.added_spec_keys.len(), 1);
        assert_eq!(update.source, ReloadSource::Watch);
    }
}
