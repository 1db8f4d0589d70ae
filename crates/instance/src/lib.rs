//! `Instance` — one running backing MCP server process or HTTP session.
//!
//! Generalizes `sa-mcp-client::manager::McpServer` from a single
//! ready/not-ready bool into the full state machine named in the data
//! model: starting → initializing → handshaking → ready ↔ busy →
//! draining → stopped, any → failed.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use mcpctl_domain::error::ControlError;
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::spec::ServerSpec;
use mcpctl_protocol::{initialize_params, McpResourceDef, McpToolDef, ServerCapabilities, ToolCallResult};
use mcpctl_transport::{McpTransport, TransportError};
use parking_lot::Mutex;
use serde_json::Value;

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Initializing,
    Handshaking,
    Ready,
    Busy,
    Draining,
    Stopped,
    Failed,
}

/// Why the pool started this particular instance, for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCause {
    Bootstrap,
    ToolCall { tool: String },
    ClientActivate { client: String },
    PolicyAlwaysOn,
    PolicyMinReady,
}

/// Immutable point-in-time view of an instance. Never aliases internal
/// state — every field is copied or cloned out.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub id: String,
    pub spec_key: SpecKey,
    pub state: InstanceState,
    pub busy_count: u32,
    pub max_concurrent: u32,
    pub last_active: DateTime<Utc>,
    pub spawned_at: DateTime<Utc>,
    pub handshaked_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub sticky_key: Option<String>,
    pub last_start_cause: Option<StartCause>,
}

struct Guarded {
    state: InstanceState,
    last_active: DateTime<Utc>,
    handshaked_at: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    sticky_key: Option<String>,
    capabilities: Option<ServerCapabilities>,
    last_start_cause: Option<StartCause>,
    tools: Vec<McpToolDef>,
    resources: Vec<McpResourceDef>,
}

/// One running backing server. Transitions are guarded by a single mutex;
/// public accessors only ever hand out snapshots or clamp-adjusted counts.
pub struct Instance {
    pub id: String,
    pub spec: ServerSpec,
    pub spec_key: SpecKey,
    pub spawned_at: DateTime<Utc>,
    conn: Box<dyn McpTransport>,
    busy_count: AtomicU32,
    guarded: Mutex<Guarded>,
}

impl Instance {
    /// Spawn the transport and drive it through starting → initializing,
    /// stopping short of the MCP handshake (callers run `handshake` next so
    /// the pool can observe the `initializing` state in between).
    pub async fn start(
        spec: ServerSpec,
        spec_key: SpecKey,
        cause: StartCause,
    ) -> Result<Self, ControlError> {
        let conn = mcpctl_transport::connect(&spec.transport, &spec.protocol_version)
            .await
            .map_err(transport_err)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            spec,
            spec_key,
            spawned_at: Utc::now(),
            conn,
            busy_count: AtomicU32::new(0),
            guarded: Mutex::new(Guarded {
                state: InstanceState::Initializing,
                last_active: Utc::now(),
                handshaked_at: None,
                last_heartbeat_at: None,
                sticky_key: None,
                capabilities: None,
                last_start_cause: Some(cause),
                tools: Vec::new(),
                resources: Vec::new(),
            }),
        })
    }

    /// Perform the MCP `initialize` round-trip, cache capabilities, then
    /// fetch tools/resources. Transitions initializing → handshaking →
    /// ready on success, → failed otherwise.
    pub async fn handshake(&self) -> Result<(), ControlError> {
        {
            let mut g = self.guarded.lock();
            g.state = InstanceState::Handshaking;
        }

        let init_params = initialize_params(&self.spec.protocol_version);
        let params_value =
            serde_json::to_value(&init_params).map_err(|e| ControlError::Internal(e.to_string()))?;

        let resp = self
            .conn
            .send_request("initialize", Some(params_value))
            .await
            .map_err(|e| self.fail(transport_err(e)));

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return Err(e),
        };

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(self.fail(ControlError::FailedPrecondition(format!(
                "initialize failed: {err}"
            ))));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        let init: mcpctl_protocol::InitializeResult = serde_json::from_value(result_value)
            .map_err(|e| self.fail(ControlError::Internal(format!("bad initialize result: {e}"))))?;

        self.conn
            .send_notification("notifications/initialized", None)
            .await
            .map_err(|e| self.fail(transport_err(e)))?;

        {
            let mut g = self.guarded.lock();
            g.capabilities = Some(init.capabilities);
            g.handshaked_at = Some(Utc::now());
            g.state = InstanceState::Ready;
            g.last_active = Utc::now();
        }

        Ok(())
    }

    fn fail(&self, err: ControlError) -> ControlError {
        let mut g = self.guarded.lock();
        g.state = InstanceState::Failed;
        err
    }

    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.guarded.lock().capabilities.clone()
    }

    pub fn cache_tools(&self, tools: Vec<McpToolDef>) {
        self.guarded.lock().tools = tools;
    }

    pub fn cache_resources(&self, resources: Vec<McpResourceDef>) {
        self.guarded.lock().resources = resources;
    }

    pub fn cached_tools(&self) -> Vec<McpToolDef> {
        self.guarded.lock().tools.clone()
    }

    pub fn cached_resources(&self) -> Vec<McpResourceDef> {
        self.guarded.lock().resources.clone()
    }

    pub fn state(&self) -> InstanceState {
        self.guarded.lock().state
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state(), InstanceState::Failed)
    }

    pub fn busy_count(&self) -> u32 {
        self.busy_count.load(Ordering::SeqCst)
    }

    pub fn sticky_key(&self) -> Option<String> {
        self.guarded.lock().sticky_key.clone()
    }

    pub fn set_sticky_key(&self, key: String) {
        self.guarded.lock().sticky_key = Some(key);
    }

    /// Increment busy count and flip ready→busy once saturated. Once
    /// `state=failed`, no further acquires may succeed against this
    /// instance — callers must check `is_failed()` before calling.
    pub fn inc_busy(&self) {
        let mut g = self.guarded.lock();
        let next = self
            .busy_count
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        g.last_active = Utc::now();
        if next >= self.spec.max_concurrent {
            g.state = InstanceState::Busy;
        }
    }

    /// Decrement busy count, clamped at 0. Flips busy→ready when the count
    /// reaches 0; if the instance was draining, triggers a transition to
    /// stopped instead (the pool performs the actual transport shutdown).
    pub fn dec_busy(&self) -> bool {
        let mut g = self.guarded.lock();
        let prev = self.busy_count.load(Ordering::SeqCst);
        if prev > 0 {
            self.busy_count.fetch_sub(1, Ordering::SeqCst);
        }
        let now_zero = self.busy_count.load(Ordering::SeqCst) == 0;
        g.last_active = Utc::now();
        if now_zero {
            match g.state {
                InstanceState::Busy => g.state = InstanceState::Ready,
                InstanceState::Draining => return true,
                _ => {}
            }
        }
        false
    }

    pub fn begin_drain(&self) {
        let mut g = self.guarded.lock();
        if !matches!(g.state, InstanceState::Stopped | InstanceState::Failed) {
            g.state = InstanceState::Draining;
        }
    }

    pub async fn stop(&self) {
        self.conn.shutdown().await;
        self.guarded.lock().state = InstanceState::Stopped;
    }

    pub async fn ping(&self) -> Result<(), ControlError> {
        let resp = self
            .conn
            .send_request("ping", None)
            .await
            .map_err(transport_err)?;
        if resp.is_error() {
            return Err(ControlError::Unavailable("ping failed".into()));
        }
        self.guarded.lock().last_heartbeat_at = Some(Utc::now());
        Ok(())
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, ControlError> {
        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        let resp = self
            .conn
            .send_request("tools/call", Some(params))
            .await
            .map_err(|e| self.fail(transport_err(e)))?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(ControlError::Unavailable(format!("tools/call failed: {err}")));
        }
        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value(result_value).map_err(|e| ControlError::Internal(e.to_string()))
    }

    /// Send any MCP request, used by the router for resources/prompts/
    /// logging/completion methods that don't need instance-specific typed
    /// handling.
    pub async fn call_raw(&self, method: &str, params: Option<Value>) -> Result<Value, ControlError> {
        let resp = self
            .conn
            .send_request(method, params)
            .await
            .map_err(|e| self.fail(transport_err(e)))?;
        resp.into_result()
            .map_err(|e| ControlError::Unavailable(e.to_string()))
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        let g = self.guarded.lock();
        InstanceSnapshot {
            id: self.id.clone(),
            spec_key: self.spec_key.clone(),
            state: g.state,
            busy_count: self.busy_count(),
            max_concurrent: self.spec.max_concurrent,
            last_active: g.last_active,
            spawned_at: self.spawned_at,
            handshaked_at: g.handshaked_at,
            last_heartbeat_at: g.last_heartbeat_at,
            sticky_key: g.sticky_key.clone(),
            last_start_cause: g.last_start_cause.clone(),
        }
    }

    /// Build an `Instance` around a caller-supplied transport double,
    /// skipping the real spawn and handshake. For other crates' pool/
    /// scheduler tests that need a real `Instance` to drive acquire/
    /// release/sticky-routing logic without a child process.
    #[cfg(feature = "test-support")]
    pub fn for_test(spec: ServerSpec, spec_key: SpecKey, transport: Box<dyn McpTransport>, state: InstanceState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            spec,
            spec_key,
            spawned_at: Utc::now(),
            conn: transport,
            busy_count: AtomicU32::new(0),
            guarded: Mutex::new(Guarded {
                state,
                last_active: Utc::now(),
                handshaked_at: None,
                last_heartbeat_at: None,
                sticky_key: None,
                capabilities: None,
                last_start_cause: Some(StartCause::Bootstrap),
                tools: Vec::new(),
                resources: Vec::new(),
            }),
        }
    }
}

fn transport_err(e: TransportError) -> ControlError {
    match e {
        TransportError::Timeout => ControlError::DeadlineExceeded,
        TransportError::ProcessExited => ControlError::Unavailable("backing process exited".into()),
        TransportError::Unsupported(s) => ControlError::FailedPrecondition(s),
        TransportError::UnsupportedProtocol(v) => {
            ControlError::FailedPrecondition(format!("unsupported protocol version: {v}"))
        }
        other => ControlError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcpctl_domain::spec::{ActivationMode, TransportConfig};
    use mcpctl_protocol::JsonRpcResponse;

    /// A transport that answers nothing and is never dialed — enough to
    /// construct an `Instance` for exercising the accounting methods
    /// without spawning a real child process.
    struct NullTransport;

    #[async_trait]
    impl McpTransport for NullTransport {
        async fn send_request(&self, _method: &str, _params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
            Err(TransportError::ProcessExited)
        }

        async fn send_notification(&self, _method: &str, _params: Option<Value>) -> Result<(), TransportError> {
            Ok(())
        }

        fn is_alive(&self) -> bool {
            true
        }

        async fn shutdown(&self) {}
    }

    fn test_spec(max_concurrent: u32) -> ServerSpec {
        ServerSpec {
            name: "calc".into(),
            transport: TransportConfig::Stdio {
                cmd: vec!["calc-srv".into()],
                env: Default::default(),
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

    fn test_instance(max_concurrent: u32) -> Instance {
        Instance {
            id: "test-instance".into(),
            spec: test_spec(max_concurrent),
            spec_key: SpecKey::from_hex("k".into()),
            spawned_at: Utc::now(),
            conn: Box::new(NullTransport),
            busy_count: AtomicU32::new(0),
            guarded: Mutex::new(Guarded {
                state: InstanceState::Ready,
                last_active: Utc::now(),
                handshaked_at: None,
                last_heartbeat_at: None,
                sticky_key: None,
                capabilities: None,
                last_start_cause: Some(StartCause::Bootstrap),
                tools: Vec::new(),
                resources: Vec::new(),
            }),
        }
    }

    #[test]
    fn dec_busy_clamps_at_zero_instead_of_underflowing() {
        let instance = test_instance(1);
        assert_eq!(instance.busy_count(), 0);

        // Releasing an instance that was never acquired must not panic or
        // wrap the counter around to u32::MAX.
        assert!(!instance.dec_busy());
        assert_eq!(instance.busy_count(), 0);

        instance.inc_busy();
        assert_eq!(instance.busy_count(), 1);
        assert_eq!(instance.state(), InstanceState::Busy);

        assert!(!instance.dec_busy());
        assert_eq!(instance.busy_count(), 0);
        assert_eq!(instance.state(), InstanceState::Ready);

        // A second release past zero stays clamped.
        assert!(!instance.dec_busy());
        assert_eq!(instance.busy_count(), 0);
    }

    #[test]
    fn dec_busy_on_a_draining_instance_signals_stop() {
        let instance = test_instance(1);
        instance.inc_busy();
        instance.begin_drain();

        assert!(instance.dec_busy());
        assert_eq!(instance.busy_count(), 0);
    }
}
