//! `Pool` (C4) — all instances sharing one specKey.
//!
//! No 1:1 teacher analog; grounded in `NodeRegistry`'s register/prune-stale
//! shape (an `RwLock`-guarded collection with a background staleness sweep)
//! and `ConcurrencyGuard`'s acquire/release slot accounting, recombined
//! here around a spec's `maxConcurrent`/`minReady` instead of a schedule's
//! run concurrency.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mcpctl_domain::error::ControlError;
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::spec::{ActivationMode, ServerSpec};
use mcpctl_instance::{Instance, InstanceSnapshot, InstanceState, StartCause};
use mcpctl_metadata_cache::MetadataCache;
use parking_lot::RwLock;
use tokio::sync::Notify;

/// Implicit cap on concurrently-running instances per pool, independent of
/// `minReady`, so an unbounded burst of sticky keys cannot fork unbounded
/// processes.
const DEFAULT_MAX_INSTANCES: usize = 16;

pub struct PoolStatus {
    pub instance_count: usize,
    pub ready_count: usize,
    pub busy_count: usize,
    pub draining_count: usize,
    pub desired_min_ready: u32,
}

struct PoolInner {
    spec: ServerSpec,
    instances: Vec<Arc<Instance>>,
    desired_min_ready: u32,
    stopping: bool,
}

/// Set of running instances for one specKey.
pub struct Pool {
    pub spec_key: SpecKey,
    inner: RwLock<PoolInner>,
    metadata: Arc<MetadataCache>,
    /// Woken on every release / instance-reaching-ready, so waiting
    /// acquirers and the reconcile loop can recheck without polling.
    notify: Notify,
}

impl Pool {
    pub fn new(spec_key: SpecKey, spec: ServerSpec, metadata: Arc<MetadataCache>) -> Arc<Self> {
        let desired_min_ready = spec.min_ready;
        Arc::new(Self {
            spec_key,
            inner: RwLock::new(PoolInner {
                spec,
                instances: Vec::new(),
                desired_min_ready,
                stopping: false,
            }),
            metadata,
            notify: Notify::new(),
        })
    }

    pub fn spec(&self) -> ServerSpec {
        self.inner.read().spec.clone()
    }

    /// Apply an updated-hint spec in place without restarting instances
    /// (identity fields are guaranteed unchanged by the caller — the
    /// scheduler only calls this for `updatedSpecKey`s).
    pub fn update_hints(&self, spec: ServerSpec) {
        let mut g = self.inner.write();
        g.desired_min_ready = spec.min_ready;
        g.spec = spec;
    }

    pub fn set_desired_min_ready(&self, n: u32) {
        self.inner.write().desired_min_ready = n;
        self.notify.notify_waiters();
    }

    pub fn status(&self) -> PoolStatus {
        let g = self.inner.read();
        let mut ready = 0;
        let mut busy = 0;
        let mut draining = 0;
        for inst in &g.instances {
            match inst.state() {
                InstanceState::Ready => ready += 1,
                InstanceState::Busy => busy += 1,
                InstanceState::Draining => draining += 1,
                _ => {}
            }
        }
        PoolStatus {
            instance_count: g.instances.len(),
            ready_count: ready,
            busy_count: busy,
            draining_count: draining,
            desired_min_ready: g.desired_min_ready,
        }
    }

    pub fn snapshots(&self) -> Vec<InstanceSnapshot> {
        self.inner.read().instances.iter().map(|i| i.snapshot()).collect()
    }

    /// Acquire an instance, starting a new one if necessary and permitted.
    /// Mirrors §4.4 acquire: sticky match, then warmest ready instance,
    /// then start-new, then wait for release.
    pub async fn acquire(
        &self,
        routing_key: Option<&str>,
        allow_start: bool,
    ) -> Result<Arc<Instance>, ControlError> {
        loop {
            if let Some(instance) = self.try_acquire_existing(routing_key) {
                return Ok(instance);
            }

            if allow_start {
                if self.has_start_capacity() {
                    let cause = StartCause::ToolCall {
                        tool: routing_key.unwrap_or("").to_string(),
                    };
                    let instance = self.spawn_and_insert(cause).await?;
                    instance.handshake().await?;
                    self.publish_metadata(&instance).await;
                    instance.inc_busy();
                    if let Some(key) = routing_key {
                        instance.set_sticky_key(key.to_string());
                    }
                    return Ok(instance);
                }
            } else if self.inner.read().instances.is_empty() {
                return Err(ControlError::Unavailable("no ready instance".into()));
            }

            // Wait for a release, a new instance reaching ready, or a pool
            // stop — whichever comes first — then retry the acquire loop.
            if self.inner.read().stopping {
                return Err(ControlError::Unavailable("pool is stopping".into()));
            }
            self.notify.notified().await;
        }
    }

    fn try_acquire_existing(&self, routing_key: Option<&str>) -> Option<Arc<Instance>> {
        let g = self.inner.read();

        if let Some(key) = routing_key {
            if let Some(instance) = g.instances.iter().find(|i| {
                i.sticky_key().as_deref() == Some(key) && i.state() == InstanceState::Ready
                    || (i.sticky_key().as_deref() == Some(key)
                        && i.state() == InstanceState::Busy
                        && i.busy_count() < i.spec.max_concurrent)
            }) {
                instance.inc_busy();
                return Some(instance.clone());
            }
        }

        // Prefer the most-recently-active warm instance for cache locality.
        let candidate = g
            .instances
            .iter()
            .filter(|i| {
                matches!(i.state(), InstanceState::Ready | InstanceState::Busy)
                    && i.busy_count() < i.spec.max_concurrent
            })
            .max_by_key(|i| i.snapshot().last_active);

        if let Some(instance) = candidate {
            instance.inc_busy();
            if let Some(key) = routing_key {
                instance.set_sticky_key(key.to_string());
            }
            return Some(instance.clone());
        }

        None
    }

    fn has_start_capacity(&self) -> bool {
        let g = self.inner.read();
        !g.stopping && g.instances.len() < DEFAULT_MAX_INSTANCES
    }

    /// Spawn a new instance for the pending-start placeholder, insert it,
    /// and return it. Split from `try_start_new` so the write lock is not
    /// held across the `.await` in `Instance::start`.
    async fn spawn_and_insert(&self, cause: StartCause) -> Result<Arc<Instance>, ControlError> {
        let spec = self.inner.read().spec.clone();
        let instance = Arc::new(Instance::start(spec, self.spec_key.clone(), cause).await?);
        self.inner.write().instances.push(instance.clone());
        Ok(instance)
    }

    async fn publish_metadata(&self, instance: &Arc<Instance>) {
        if let Ok(value) = instance.call_raw("tools/list", None).await {
            if let Ok(result) = serde_json::from_value::<mcpctl_protocol::ToolsListResult>(value) {
                instance.cache_tools(result.tools.clone());
                self.metadata.set_tools(&self.spec_key, result.tools);
            }
        }
        if let Ok(value) = instance.call_raw("resources/list", None).await {
            if let Ok(result) = serde_json::from_value::<mcpctl_protocol::ResourcesListResult>(value) {
                instance.cache_resources(result.resources.clone());
                self.metadata.set_resources(&self.spec_key, result.resources);
            }
        }
        if let Ok(value) = instance.call_raw("prompts/list", None).await {
            if let Ok(result) = serde_json::from_value::<mcpctl_protocol::PromptsListResult>(value) {
                self.metadata.set_prompts(&self.spec_key, result.prompts);
            }
        }
    }

    /// Release a previously-acquired instance.
    pub fn release(&self, instance: &Arc<Instance>) {
        let should_stop = instance.dec_busy();
        self.notify.notify_waiters();
        if should_stop {
            let instance = instance.clone();
            tokio::spawn(async move {
                instance.stop().await;
            });
        }
    }

    /// Transition every instance to draining; hard-stop whatever remains
    /// after `drainTimeout`.
    pub async fn stop(&self, drain_timeout: Duration) {
        self.inner.write().stopping = true;
        let instances: Vec<_> = self.inner.read().instances.clone();
        for instance in &instances {
            instance.begin_drain();
        }
        self.notify.notify_waiters();

        let deadline = tokio::time::Instant::now() + drain_timeout;
        loop {
            let all_stopped = instances.iter().all(|i| {
                matches!(i.state(), InstanceState::Stopped | InstanceState::Failed)
            });
            if all_stopped || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        for instance in &instances {
            if !matches!(instance.state(), InstanceState::Stopped) {
                instance.stop().await;
            }
        }
        self.metadata.clear_spec(&self.spec_key);
    }

    /// Idle sweeper: retire ready, zero-busy instances past `idleSeconds`,
    /// never dropping below `minReady`.
    pub async fn sweep_idle(&self) {
        let (to_retire, min_ready, idle_seconds) = {
            let g = self.inner.read();
            let ready_count = g
                .instances
                .iter()
                .filter(|i| matches!(i.state(), InstanceState::Ready | InstanceState::Busy))
                .count();
            let mut slack = ready_count.saturating_sub(g.desired_min_ready as usize);
            let mut victims = Vec::new();
            for instance in &g.instances {
                if slack == 0 {
                    break;
                }
                let snap = instance.snapshot();
                if snap.state != InstanceState::Ready {
                    continue;
                }
                let idle_for = Utc::now().signed_duration_since(snap.last_active).num_seconds();
                if idle_for as u64 > g.spec.idle_seconds {
                    victims.push(instance.clone());
                    slack -= 1;
                }
            }
            (victims, g.desired_min_ready, g.spec.idle_seconds)
        };
        let _ = (min_ready, idle_seconds);

        for instance in to_retire {
            instance.begin_drain();
            instance.stop().await;
            self.inner.write().instances.retain(|i| !Arc::ptr_eq(i, &instance));
        }
    }

    /// Ping sweeper: health-check every ready instance; failures are
    /// removed and replaced per `minReady` by the reconcile loop.
    pub async fn sweep_ping(&self) {
        let candidates: Vec<_> = self
            .inner
            .read()
            .instances
            .iter()
            .filter(|i| i.state() == InstanceState::Ready)
            .cloned()
            .collect();

        for instance in candidates {
            if instance.ping().await.is_err() {
                tracing::warn!(spec_key = %self.spec_key, instance_id = %instance.id, "ping failed, marking instance failed");
                self.inner.write().instances.retain(|i| !Arc::ptr_eq(i, &instance));
            }
        }
    }

    /// Reconcile loop body: spawn instances up to `desired_min_ready`
    /// (or always-on activation), handshaking each to readiness. Each
    /// spawn+handshake attempt is bounded by `timeout` — the same
    /// `bootstrapTimeoutSeconds` budget the startup sweep uses — so one
    /// unresponsive backing process cannot hang the caller (catalog apply,
    /// control plane startup) indefinitely.
    pub async fn reconcile_min_ready(&self, timeout: Duration) {
        loop {
            let (deficit, cause) = {
                let g = self.inner.read();
                if g.stopping {
                    return;
                }
                let live = g
                    .instances
                    .iter()
                    .filter(|i| matches!(i.state(), InstanceState::Ready | InstanceState::Busy | InstanceState::Starting | InstanceState::Initializing | InstanceState::Handshaking))
                    .count();
                let floor = if g.spec.activation_mode == ActivationMode::AlwaysOn {
                    g.desired_min_ready.max(1)
                } else {
                    g.desired_min_ready
                };
                let cause = if g.spec.activation_mode == ActivationMode::AlwaysOn {
                    StartCause::PolicyAlwaysOn
                } else {
                    StartCause::PolicyMinReady
                };
                (floor as usize > live, cause)
            };
            if !deficit {
                return;
            }

            let instance = match tokio::time::timeout(timeout, self.spawn_and_insert(cause)).await {
                Ok(Ok(instance)) => instance,
                Ok(Err(e)) => {
                    tracing::warn!(spec_key = %self.spec_key, error = %e, "failed to start instance while reconciling minReady");
                    return;
                }
                Err(_) => {
                    tracing::warn!(spec_key = %self.spec_key, ?timeout, "instance spawn timed out while reconciling minReady");
                    return;
                }
            };

            match tokio::time::timeout(timeout, instance.handshake()).await {
                Ok(Ok(())) => self.publish_metadata(&instance).await,
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!(spec_key = %self.spec_key, ?timeout, "instance handshake timed out while reconciling minReady");
                }
            }
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcpctl_domain::spec::TransportConfig;
    use mcpctl_instance::Instance;
    use mcpctl_protocol::JsonRpcResponse;
    use mcpctl_transport::{McpTransport, TransportError};
    use std::collections::HashMap;

    fn test_spec(max_concurrent: u32) -> ServerSpec {
        ServerSpec {
            name: "calc".into(),
            transport: TransportConfig::Stdio {
                cmd: vec!["calc-srv".into()],
                env: HashMap::new(),
                cwd: None,
            },
            protocol_version: "2025-06-18".into(),
            idle_seconds: 600,
            max_concurrent,
            min_ready: 0,
            drain_timeout_seconds: 30,
            activation_mode: ActivationMode::OnDemand,
            expose_tools: false,
            tags: vec![],
            disabled: false,
        }
    }

    /// A transport double that answers nothing — instances built on it
    /// never actually handshake, so pool tests seed them directly in
    /// whatever state the test needs instead of driving a real spawn.
    struct NullTransport;

    #[async_trait]
    impl McpTransport for NullTransport {
        async fn send_request(&self, _method: &str, _params: Option<serde_json::Value>) -> Result<JsonRpcResponse, TransportError> {
            Err(TransportError::ProcessExited)
        }

        async fn send_notification(&self, _method: &str, _params: Option<serde_json::Value>) -> Result<(), TransportError> {
            Ok(())
        }

        fn is_alive(&self) -> bool {
            true
        }

        async fn shutdown(&self) {}
    }

    /// Seed `pool` with a ready, zero-busy instance and return it.
    fn seed_ready_instance(pool: &Pool, max_concurrent: u32) -> Arc<Instance> {
        let instance = Arc::new(Instance::for_test(
            test_spec(max_concurrent),
            pool.spec_key.clone(),
            Box::new(NullTransport),
            InstanceState::Ready,
        ));
        pool.inner.write().instances.push(instance.clone());
        instance
    }

    #[test]
    fn status_reports_zero_on_empty_pool() {
        let key = SpecKey::from_hex("k".into());
        let pool = Pool::new(key, test_spec(1), Arc::new(MetadataCache::default()));
        let status = pool.status();
        assert_eq!(status.instance_count, 0);
        assert_eq!(status.ready_count, 0);
    }

    #[test]
    fn update_hints_changes_min_ready_without_touching_instances() {
        let key = SpecKey::from_hex("k".into());
        let pool = Pool::new(key, test_spec(1), Arc::new(MetadataCache::default()));
        let mut updated = test_spec(1);
        updated.min_ready = 3;
        pool.update_hints(updated);
        assert_eq!(pool.status().desired_min_ready, 3);
    }

    #[tokio::test]
    async fn acquire_reuses_an_existing_ready_instance_without_starting_new() {
        let key = SpecKey::from_hex("k".into());
        let pool = Pool::new(key, test_spec(2), Arc::new(MetadataCache::default()));
        let seeded = seed_ready_instance(&pool, 2);

        let acquired = pool.acquire(None, false).await.unwrap();
        assert!(Arc::ptr_eq(&acquired, &seeded));

        let status = pool.status();
        assert_eq!(status.instance_count, 1);
        assert_eq!(status.busy_count, 1);
    }

    #[tokio::test]
    async fn acquire_without_allow_start_fails_on_an_empty_pool() {
        let key = SpecKey::from_hex("k".into());
        let pool = Pool::new(key, test_spec(1), Arc::new(MetadataCache::default()));
        let err = pool.acquire(None, false).await.unwrap_err();
        assert!(matches!(err, ControlError::Unavailable(_)));
    }

    #[tokio::test]
    async fn sticky_key_routes_a_released_instance_back_to_the_same_caller() {
        let key = SpecKey::from_hex("k".into());
        let pool = Pool::new(key, test_spec(2), Arc::new(MetadataCache::default()));
        let seeded = seed_ready_instance(&pool, 2);

        // First acquire with a routing key assigns it (no sticky owner yet).
        let first = pool.acquire(Some("u1"), false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &seeded));
        assert_eq!(first.sticky_key().as_deref(), Some("u1"));
        pool.release(&first);
        assert_eq!(pool.status().busy_count, 0);

        // A later acquire for the same key must land back on the same
        // instance, not a fresh one.
        let second = pool.acquire(Some("u1"), false).await.unwrap();
        assert!(Arc::ptr_eq(&second, &seeded));
        assert_eq!(pool.status().instance_count, 1);
    }

    #[tokio::test]
    async fn release_clamps_busy_count_at_zero() {
        let key = SpecKey::from_hex("k".into());
        let pool = Pool::new(key, test_spec(1), Arc::new(MetadataCache::default()));
        let seeded = seed_ready_instance(&pool, 1);

        let acquired = pool.acquire(None, false).await.unwrap();
        assert_eq!(pool.status().busy_count, 1);

        pool.release(&acquired);
        assert_eq!(pool.status().busy_count, 0);
        assert_eq!(seeded.busy_count(), 0);

        // A second, spurious release must not underflow the count.
        pool.release(&acquired);
        assert_eq!(seeded.busy_count(), 0);
    }
}
