//! `mcpctl-controlplane` (C10) — the control plane facade.
//!
//! Wires every other crate together behind the operation set named in
//! `spec.md` §4.10: `Info`, client registry, discovery, observability, and
//! bootstrap progress. Grounded in the teacher's `build_app_state()` for the
//! sequential, logged subsystem-construction idiom in [`ControlPlane::start`],
//! and in `sa-gateway`'s per-concern background-loop pattern (one
//! `tokio::spawn` + `tokio::time::interval` per sweeper) for the loops this
//! facade owns on top of what `Pool`/`Scheduler` already run internally.

pub mod bootstrap;
pub mod clients;
pub mod discovery;
pub mod logs;
pub mod observability;
pub mod watchable;

pub use bootstrap::BootstrapTracker;
pub use clients::ClientRegistry;
pub use discovery::{Discovery, NamespacedPrompt, NamespacedResource, NamespacedTool};
pub use logs::{LogBroadcaster, LogLevel, LogRecord};
pub use observability::{InitTracker, Observability};

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use mcpctl_catalog::{compute_diff, CatalogEngine, CatalogSource};
use mcpctl_domain::error::ControlError;
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::snapshot::{BootstrapProgressSnapshot, PoolStatusSnapshot, ServerInitStatusSnapshot};
use mcpctl_domain::{CatalogSummary, ClientRegistration};
use mcpctl_metadata_cache::MetadataCache;
use mcpctl_router::Router;
use mcpctl_scheduler::Scheduler;
use mcpctl_session_cache::SessionCache;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Info {
    pub name: String,
    pub version: String,
}

fn not_registered(client: &str) -> ControlError {
    ControlError::FailedPrecondition(format!("client {client} is not registered"))
}

/// The assembled control plane. Holds every other component behind an
/// `Arc` so the background loops spawned in [`Self::start`] can clone
/// cheaply.
pub struct ControlPlane {
    pub info: Info,
    scheduler: Arc<Scheduler>,
    catalog: Arc<CatalogEngine>,
    router: Arc<Router>,
    sessions: Arc<SessionCache>,
    clients: Arc<ClientRegistry>,
    discovery: Arc<Discovery>,
    observability: Arc<Observability>,
    bootstrap: Arc<BootstrapTracker>,
    logs: Arc<LogBroadcaster>,
}

impl ControlPlane {
    /// Build every subsystem in dependency order, log each step (mirrors
    /// `build_app_state`'s per-subsystem logging), then start the
    /// background loops and the bootstrap sweep. Returns once the facade is
    /// ready to accept calls; bootstrap itself continues in the background
    /// and is observed via `watch_bootstrap_progress`.
    pub async fn start(source: Arc<dyn CatalogSource>) -> Result<Arc<Self>, ControlError> {
        let catalog = CatalogEngine::bootstrap(source).await?;
        tracing::info!("catalog engine bootstrapped at revision {}", catalog.snapshot().revision);

        let metadata = Arc::new(MetadataCache::default());
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&metadata)));
        tracing::info!("scheduler constructed");

        let initial_snapshot = catalog.snapshot();
        let initial_diff = compute_diff(&CatalogSummary::default(), &initial_snapshot.summary);
        let reconcile_timeout = Duration::from_secs(initial_snapshot.summary.runtime.bootstrap_timeout_seconds);
        scheduler
            .apply_catalog_diff(&initial_diff, &initial_snapshot.summary.spec_registry, reconcile_timeout)
            .await;
        tracing::info!(
            pools = initial_snapshot.summary.total_servers,
            "initial catalog applied to scheduler"
        );

        let route_timeout = Duration::from_secs(initial_snapshot.summary.runtime.route_timeout_seconds);
        let router = Arc::new(Router::new(Arc::clone(&scheduler), route_timeout));

        let sessions = Arc::new(SessionCache::default());
        let clients = Arc::new(ClientRegistry::new());

        let discovery = Arc::new(Discovery::new(Arc::clone(&metadata), Arc::clone(&catalog), Arc::clone(&router)));
        discovery.refresh();

        let init_tracker = Arc::new(InitTracker::new());
        let observability = Arc::new(Observability::new(
            Arc::clone(&scheduler),
            Arc::clone(&catalog),
            Arc::clone(&init_tracker),
        ));
        observability.refresh_pool_status();

        let bootstrap = Arc::new(BootstrapTracker::new());
        let logs = Arc::new(LogBroadcaster::new());
        tracing::info!("control plane facade assembled, starting background loops");

        let facade = Arc::new(Self {
            info: Info {
                name: "mcpctl".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            scheduler,
            catalog,
            router,
            sessions,
            clients,
            discovery,
            observability,
            bootstrap,
            logs,
        });

        facade.spawn_background_loops(initial_snapshot.summary.spec_registry.iter().collect());
        Ok(facade)
    }

    fn spawn_background_loops(self: &Arc<Self>, initial_specs: Vec<(&SpecKey, &mcpctl_domain::ServerSpec)>) {
        let initial_specs: Vec<_> = initial_specs.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        {
            let facade = Arc::clone(self);
            tokio::spawn(async move {
                let runtime = facade.catalog.snapshot().summary.runtime.clone();
                facade
                    .bootstrap
                    .run(
                        Arc::clone(&facade.scheduler),
                        facade.observability.init_tracker(),
                        initial_specs,
                        runtime,
                    )
                    .await;
                facade.logs.emit(LogLevel::Info, "bootstrap", "bootstrap sweep complete");
            });
        }

        {
            let facade = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let period = facade.catalog.snapshot().summary.runtime.tool_refresh_interval_seconds.max(1);
                    tokio::time::sleep(Duration::from_secs(period)).await;
                    facade.discovery.refresh();
                    facade.observability.refresh_pool_status();
                }
            });
        }

        {
            let facade = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let runtime = facade.catalog.snapshot().summary.runtime.clone();
                    tokio::time::sleep(Duration::from_secs(runtime.client_check_seconds.max(1))).await;
                    let removed = facade.clients.sweep_inactive(runtime.client_inactive_seconds as i64);
                    for name in removed {
                        facade
                            .logs
                            .emit(LogLevel::Info, "clients", format!("client {name} swept for inactivity"));
                    }
                }
            });
        }

        {
            let facade = Arc::clone(self);
            tokio::spawn(async move {
                let mut updates = Box::pin(facade.catalog.watch());
                while let Some(update) = updates.next().await {
                    if update.diff.is_empty() {
                        continue;
                    }
                    let reconcile_timeout =
                        Duration::from_secs(update.snapshot.summary.runtime.bootstrap_timeout_seconds);
                    facade
                        .scheduler
                        .apply_catalog_diff(&update.diff, &update.snapshot.summary.spec_registry, reconcile_timeout)
                        .await;
                    facade
                        .router
                        .set_route_timeout(Duration::from_secs(update.snapshot.summary.runtime.route_timeout_seconds));
                    facade.discovery.refresh();
                    facade.observability.refresh_pool_status();

                    if !update.diff.runtime_fields.restart_required_fields.is_empty() {
                        facade.logs.emit(
                            LogLevel::Warn,
                            "catalog",
                            format!(
                                "restart-required runtime fields changed: {}",
                                update.diff.runtime_fields.restart_required_fields.join(", ")
                            ),
                        );
                    }
                }
            });
        }
    }

    // ── Client registry ────────────────────────────────────────────────

    pub fn register_client(&self, client: impl Into<String>, pid: Option<u32>, tags: Vec<String>) {
        self.clients.register(client, pid, tags);
    }

    pub fn unregister_client(&self, client: &str) {
        self.clients.unregister(client);
        self.sessions.invalidate(client);
    }

    pub fn list_active_clients(&self) -> Vec<ClientRegistration> {
        self.clients.list()
    }

    pub fn watch_active_clients(&self) -> impl futures_core::Stream<Item = Vec<ClientRegistration>> {
        self.clients.watch()
    }

    fn require_registered(&self, client: &str) -> Result<(), ControlError> {
        if self.clients.is_registered(client) {
            self.clients.touch(client);
            Ok(())
        } else {
            Err(not_registered(client))
        }
    }

    // ── Discovery ───────────────────────────────────────────────────────

    pub fn list_tools(&self, client: &str) -> Result<Arc<Vec<NamespacedTool>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.discovery.list_tools())
    }

    pub fn list_resources(&self, client: &str) -> Result<Arc<Vec<NamespacedResource>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.discovery.list_resources())
    }

    pub fn list_prompts(&self, client: &str) -> Result<Arc<Vec<NamespacedPrompt>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.discovery.list_prompts())
    }

    pub fn watch_tools(&self, client: &str) -> Result<impl futures_core::Stream<Item = Arc<Vec<NamespacedTool>>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.discovery.watch_tools())
    }

    pub fn watch_resources(
        &self,
        client: &str,
    ) -> Result<impl futures_core::Stream<Item = Arc<Vec<NamespacedResource>>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.discovery.watch_resources())
    }

    pub fn watch_prompts(
        &self,
        client: &str,
    ) -> Result<impl futures_core::Stream<Item = Arc<Vec<NamespacedPrompt>>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.discovery.watch_prompts())
    }

    pub async fn call_tool(&self, client: &str, tool_name: &str, arguments: Value) -> Result<Value, ControlError> {
        self.require_registered(client)?;
        self.discovery.call_tool(tool_name, arguments, Some(client.to_string())).await
    }

    pub async fn read_resource(&self, client: &str, uri: &str) -> Result<Value, ControlError> {
        self.require_registered(client)?;
        self.discovery.read_resource(uri).await
    }

    pub async fn get_prompt(&self, client: &str, name: &str, arguments: Option<Value>) -> Result<Value, ControlError> {
        self.require_registered(client)?;
        self.discovery.get_prompt(name, arguments).await
    }

    /// True if `tool`'s schema hash has already been sent to `client` in
    /// this session — callers use this to send a delta-only `tools/list`
    /// response instead of the full schema.
    pub fn tool_schema_needs_full_send(&self, client: &str, tool: &str, schema_hash: &str) -> bool {
        self.sessions.needs_full(client, tool, schema_hash)
    }

    pub fn record_sent_schema(&self, client: &str, tool: &str, schema_hash: &str) {
        self.sessions
            .update(client, std::collections::HashMap::from([(tool.to_string(), schema_hash.to_string())]));
    }

    // ── Observability ───────────────────────────────────────────────────

    pub fn get_pool_status(&self, client: &str, spec_key: &SpecKey) -> Result<Option<PoolStatusSnapshot>, ControlError> {
        self.require_registered(client)?;
        Ok(self.observability.get_pool_status(spec_key))
    }

    pub fn get_server_init_status(
        &self,
        client: &str,
        spec_key: &SpecKey,
    ) -> Result<Option<ServerInitStatusSnapshot>, ControlError> {
        self.require_registered(client)?;
        Ok(self.observability.get_server_init_status(spec_key))
    }

    pub async fn retry_server_init(&self, client: &str, spec_key: &SpecKey) -> Result<(), ControlError> {
        self.require_registered(client)?;
        self.observability.retry_server_init(spec_key).await
    }

    pub fn watch_runtime_status(
        &self,
        client: &str,
    ) -> Result<impl futures_core::Stream<Item = Arc<Vec<PoolStatusSnapshot>>>, ControlError> {
        self.require_registered(client)?;
        Ok(self.observability.watch_runtime_status())
    }

    pub fn stream_logs(&self, client: &str) -> Result<impl futures_core::Stream<Item = LogRecord>, ControlError> {
        self.require_registered(client)?;
        Ok(self.logs.stream())
    }

    // ── Bootstrap ────────────────────────────────────────────────────────

    pub fn get_bootstrap_progress(&self, client: &str) -> Result<BootstrapProgressSnapshot, ControlError> {
        self.require_registered(client)?;
        Ok(self.bootstrap.snapshot())
    }

    pub fn watch_bootstrap_progress(
        &self,
        client: &str,
    ) -> Result<impl futures_core::Stream<Item = BootstrapProgressSnapshot>, ControlError> {
        self.require_registered(client)?;
        Ok(self.bootstrap.watch())
    }

    // ── Store ────────────────────────────────────────────────────────────

    pub fn get_catalog(&self, client: &str) -> Result<Arc<mcpctl_domain::CatalogState>, ControlError> {
        self.require_registered(client)?;
        Ok(self.catalog.snapshot())
    }

    /// The underlying catalog engine, for embedders that want to wire up
    /// their own file watcher (e.g. `mcpctl-gateway`'s `CatalogWatcher`).
    pub fn catalog_engine(&self) -> Arc<CatalogEngine> {
        Arc::clone(&self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcpctl_domain::Catalog;

    struct EmptyCatalogSource;

    #[async_trait]
    impl CatalogSource for EmptyCatalogSource {
        async fn load(&self) -> Result<Catalog, ControlError> {
            Ok(Catalog::default())
        }
    }

    #[tokio::test]
    async fn non_info_calls_require_registration() {
        let plane = ControlPlane::start(Arc::new(EmptyCatalogSource)).await.unwrap();
        let err = plane.list_tools("unregistered-client").unwrap_err();
        assert_eq!(err.code(), mcpctl_domain::error::ErrorCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn registering_unblocks_discovery_calls() {
        let plane = ControlPlane::start(Arc::new(EmptyCatalogSource)).await.unwrap();
        plane.register_client("ide-1", Some(1), vec![]);
        let tools = plane.list_tools("ide-1").unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn unregistering_invalidates_session_cache() {
        let plane = ControlPlane::start(Arc::new(EmptyCatalogSource)).await.unwrap();
        plane.register_client("ide-1", None, vec![]);
        plane.record_sent_schema("ide-1", "tool_a", "h1");
        assert!(!plane.tool_schema_needs_full_send("ide-1", "tool_a", "h1"));

        plane.unregister_client("ide-1");
        plane.register_client("ide-1", None, vec![]);
        assert!(plane.tool_schema_needs_full_send("ide-1", "tool_a", "h1"));
    }

    #[tokio::test]
    async fn bootstrap_progress_reaches_completed_on_empty_catalog() {
        let plane = ControlPlane::start(Arc::new(EmptyCatalogSource)).await.unwrap();
        plane.register_client("ide-1", None, vec![]);
        // Empty catalog means the spawned bootstrap sweep has nothing to do
        // and the progress snapshot is already Completed immediately.
        let progress = plane.get_bootstrap_progress("ide-1").unwrap();
        assert_eq!(progress.total, 0);
    }
}
