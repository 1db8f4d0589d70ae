//! `Router` (C9) — decode → validate → acquire → call pipeline.
//!
//! Grounded in the teacher's `ToolRouter`: resolve a destination, dispatch,
//! bound the round-trip with a timeout, always clean up on every exit path.
//! The teacher correlates responses with an in-memory pending map keyed by a
//! generated request id; here that correlation already happens inside
//! `mcpctl_transport` (the stdio request lock, the HTTP per-request POST),
//! so the router's own job narrows to staged validation, capability
//! gating, and the idempotent-method retry policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcpctl_domain::error::{ControlError, ErrorCode, RouteStage};
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_instance::Instance;
use mcpctl_protocol::ServerCapabilities;
use mcpctl_scheduler::Scheduler;
use serde_json::Value;

/// One routed call. `routing_key` carries sticky-session affinity;
/// `allow_start` mirrors `RouteOptions.allowStart` — `false` for paths like
/// a metadata refresh that must not spin up a fresh instance.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub spec_key: SpecKey,
    pub method: String,
    pub params: Option<Value>,
    pub routing_key: Option<String>,
    pub allow_start: bool,
}

pub struct Router {
    scheduler: Arc<Scheduler>,
    route_timeout_ms: AtomicU64,
}

impl Router {
    pub fn new(scheduler: Arc<Scheduler>, route_timeout: Duration) -> Self {
        Self {
            scheduler,
            route_timeout_ms: AtomicU64::new(route_timeout.as_millis() as u64),
        }
    }

    /// Reprogram the call timeout in place. `routeTimeout` is a dynamic
    /// field (see the catalog diff classification), so a reload takes
    /// effect on the next call without restarting anything.
    pub fn set_route_timeout(&self, route_timeout: Duration) {
        self.route_timeout_ms.store(route_timeout.as_millis() as u64, Ordering::Relaxed);
    }

    fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms.load(Ordering::Relaxed))
    }

    /// Run the full pipeline. Releases the acquired instance on every exit
    /// path, including the retry branch.
    pub async fn route(&self, req: RouteRequest) -> Result<Value, ControlError> {
        decode(&req)?;
        self.validate_known_spec(&req.spec_key)?;

        let instance = self.acquire(&req).await?;
        let result = self.call(&req, &instance).await;
        self.scheduler.release(&req.spec_key, &instance);

        result
    }

    fn validate_known_spec(&self, spec_key: &SpecKey) -> Result<(), ControlError> {
        self.scheduler
            .pool_status(spec_key)
            .map(|_| ())
            .ok_or_else(|| {
                ControlError::NotFound(format!("unknown specKey {spec_key}")).at_stage(RouteStage::Validate)
            })
    }

    async fn acquire(&self, req: &RouteRequest) -> Result<Arc<Instance>, ControlError> {
        let acquired = if req.allow_start {
            self.scheduler.acquire(&req.spec_key, req.routing_key.as_deref()).await
        } else {
            self.scheduler.acquire_ready(&req.spec_key, req.routing_key.as_deref()).await
        };
        acquired.map_err(|e| e.at_stage(RouteStage::Acquire))
    }

    /// Capability gating is a validation concern conceptually, but a
    /// server's capabilities are only known once an instance has
    /// handshaked — so the check runs here, against the instance that was
    /// just acquired, and a failure is still tagged `Validate` so callers
    /// see the same stage they would if capabilities were known up front.
    async fn call(&self, req: &RouteRequest, instance: &Arc<Instance>) -> Result<Value, ControlError> {
        if req.method != "ping" {
            check_capability(instance, &req.method)?;
        }

        match self.call_once(req, instance).await {
            Ok(v) => Ok(v),
            Err(e) if is_idempotent(&req.method) && is_transport_class(&e) => {
                tracing::warn!(method = %req.method, spec_key = %req.spec_key, "route call failed on transport error, retrying once on a different instance");
                let retry_instance = match self.scheduler.acquire(&req.spec_key, None).await {
                    Ok(i) => i,
                    Err(acq_err) => return Err(acq_err.at_stage(RouteStage::Acquire)),
                };
                let retry_result = self.call_once(req, &retry_instance).await;
                self.scheduler.release(&req.spec_key, &retry_instance);
                retry_result
            }
            Err(e) => Err(e),
        }
    }

    async fn call_once(&self, req: &RouteRequest, instance: &Arc<Instance>) -> Result<Value, ControlError> {
        match tokio::time::timeout(self.route_timeout(), instance.call_raw(&req.method, req.params.clone())).await {
            Ok(inner) => inner.map_err(|e| e.at_stage(RouteStage::Call)),
            Err(_) => Err(ControlError::DeadlineExceeded.at_stage(RouteStage::Call)),
        }
    }
}

fn decode(req: &RouteRequest) -> Result<(), ControlError> {
    if req.method.is_empty() {
        return Err(ControlError::InvalidArgument("empty method".into()).at_stage(RouteStage::Decode));
    }
    Ok(())
}

fn check_capability(instance: &Arc<Instance>, method: &str) -> Result<(), ControlError> {
    let caps = instance.capabilities().unwrap_or_default();
    if method_allowed(&caps, method) {
        Ok(())
    } else {
        Err(ControlError::PermissionDenied(format!("method {method} not supported by backing server"))
            .at_stage(RouteStage::Validate))
    }
}

/// Structural presence gate: ping is universal; every other namespace
/// requires the matching capability field to be present (any JSON value,
/// including an empty object).
fn method_allowed(caps: &ServerCapabilities, method: &str) -> bool {
    if method == "ping" {
        return true;
    }
    if let Some(prefix) = method.split('/').next() {
        return match prefix {
            "tools" => caps.tools.is_some(),
            "resources" => caps.resources.is_some(),
            "prompts" => caps.prompts.is_some(),
            "logging" => caps.logging.is_some(),
            "completion" => caps.completions.is_some(),
            _ => true,
        };
    }
    true
}

fn is_idempotent(method: &str) -> bool {
    method == "ping" || method.ends_with("/list")
}

fn is_transport_class(e: &ControlError) -> bool {
    matches!(e.code(), ErrorCode::Unavailable | ErrorCode::DeadlineExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with_tools() -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(serde_json::json!({})),
            ..Default::default()
        }
    }

    #[test]
    fn ping_is_always_allowed() {
        assert!(method_allowed(&ServerCapabilities::default(), "ping"));
    }

    #[test]
    fn tools_call_requires_tools_capability() {
        assert!(!method_allowed(&ServerCapabilities::default(), "tools/call"));
        assert!(method_allowed(&caps_with_tools(), "tools/call"));
    }

    #[test]
    fn list_methods_are_idempotent() {
        assert!(is_idempotent("tools/list"));
        assert!(is_idempotent("resources/list"));
        assert!(is_idempotent("ping"));
        assert!(!is_idempotent("tools/call"));
    }

    #[test]
    fn empty_method_is_decode_stage_error() {
        let req = RouteRequest {
            spec_key: SpecKey::from_hex("x".into()),
            method: String::new(),
            params: None,
            routing_key: None,
            allow_start: true,
        };
        let err = decode(&req).unwrap_err();
        assert_eq!(err.stage(), Some(RouteStage::Decode));
    }
}
