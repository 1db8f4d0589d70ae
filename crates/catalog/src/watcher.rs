//! File watcher that triggers a catalog reload on change.
//!
//! Mirrors the `ConfigWatcher` structure: a debounced background task that
//! calls [`CatalogEngine::reload`] on each detected write to the watched
//! catalog file.

use crate::{CatalogEngine, ReloadSource};
use mcpctl_domain::error::ControlError;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct CatalogWatcher {
    /// Kept alive to prevent the OS watcher from being dropped.
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl CatalogWatcher {
    pub fn start(
        catalog_path: PathBuf,
        engine: Arc<CatalogEngine>,
        shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<Self, ControlError> {
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(32);
        let watcher = Self::create_notify_watcher(event_tx, &catalog_path)?;
        Self::spawn_reload_task(engine, event_rx, shutdown_rx);
        Ok(Self {
            _watcher: Mutex::new(Some(watcher)),
        })
    }

    fn create_notify_watcher(
        event_tx: tokio::sync::mpsc::Sender<()>,
        catalog_path: &PathBuf,
    ) -> Result<RecommendedWatcher, ControlError> {
        let watch_dir = catalog_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .to_path_buf();
        let path_for_closure = catalog_path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| {
                let is_relevant = result.as_ref().is_ok_and(|e| is_catalog_event(e, &path_for_closure));
                if is_relevant {
                    let _ = event_tx.try_send(());
                }
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| ControlError::Internal(format!("failed to create catalog watcher: {e}")))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| ControlError::Internal(format!("failed to watch catalog path: {e}")))?;
        Ok(watcher)
    }

    fn spawn_reload_task(
        engine: Arc<CatalogEngine>,
        mut event_rx: tokio::sync::mpsc::Receiver<()>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        tokio::spawn(async move {
            const DEBOUNCE: Duration = Duration::from_millis(500);
            let mut last_event: Option<Instant> = None;
            let mut pending = false;
            let mut ticker = tokio::time::interval(Duration::from_millis(100));

            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        last_event = Some(Instant::now());
                        pending = true;
                    }
                    _ = ticker.tick() => {
                        if pending && last_event.is_some_and(|t| t.elapsed() >= DEBOUNCE) {
                            pending = false;
                            last_event = None;
                            if let Err(e) = engine.reload(ReloadSource::Watch).await {
                                warn!(error = %e, "catalog watch: reload failed, keeping current catalog");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("catalog watcher shutting down");
                        break;
                    }
                }
            }
        });
    }
}

fn is_catalog_event(event: &Event, catalog_path: &std::path::Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == catalog_path)
}
