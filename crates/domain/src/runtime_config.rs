//! `RuntimeConfig` — global tunables shared by every pool and by the router.

use crate::spec::ActivationMode;
use serde::{Deserialize, Serialize};

/// Opaque sub-object the core treats as an unstructured bag of fields. It is
/// carried through diffs/reloads untouched; nothing downstream matches on
/// its shape. See `ReloadMode` in DESIGN.md for why this stays opaque.
pub type OpaqueConfig = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_route_timeout_seconds")]
    pub route_timeout_seconds: u64,
    #[serde(default = "default_ping_interval_seconds")]
    pub ping_interval_seconds: u64,
    #[serde(default = "default_idle_check_interval_seconds")]
    pub idle_check_interval_seconds: u64,
    #[serde(default = "default_tool_refresh_interval_seconds")]
    pub tool_refresh_interval_seconds: u64,
    #[serde(default = "default_tool_refresh_concurrency")]
    pub tool_refresh_concurrency: u32,

    /// Canonical name per the resolved Open Question in DESIGN.md; the
    /// `caller_check_seconds` alias is accepted on read.
    #[serde(
        default = "default_client_check_seconds",
        alias = "caller_check_seconds"
    )]
    pub client_check_seconds: u64,
    #[serde(
        default = "default_client_inactive_seconds",
        alias = "caller_inactive_seconds"
    )]
    pub client_inactive_seconds: u64,

    #[serde(default = "default_init_retry_base_ms")]
    pub init_retry_base_ms: u64,
    #[serde(default = "default_init_retry_max_ms")]
    pub init_retry_max_ms: u64,
    #[serde(default = "default_init_retry_count")]
    pub init_retry_count: u32,

    #[serde(default)]
    pub bootstrap_mode: BootstrapMode,
    #[serde(default = "default_bootstrap_concurrency")]
    pub bootstrap_concurrency: u32,
    #[serde(default = "default_bootstrap_timeout_seconds")]
    pub bootstrap_timeout_seconds: u64,

    #[serde(default)]
    pub default_activation_mode: ActivationMode,
    #[serde(default)]
    pub expose_tools_default: bool,
    #[serde(default)]
    pub tool_namespace_strategy: ToolNamespaceStrategy,

    /// Opaque, untouched passthrough fields.
    #[serde(default)]
    pub reload_mode: OpaqueConfig,
    #[serde(default)]
    pub observability: OpaqueConfig,
    #[serde(default)]
    pub rpc: OpaqueConfig,
    #[serde(default)]
    pub sub_agent: OpaqueConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            route_timeout_seconds: default_route_timeout_seconds(),
            ping_interval_seconds: default_ping_interval_seconds(),
            idle_check_interval_seconds: default_idle_check_interval_seconds(),
            tool_refresh_interval_seconds: default_tool_refresh_interval_seconds(),
            tool_refresh_concurrency: default_tool_refresh_concurrency(),
            client_check_seconds: default_client_check_seconds(),
            client_inactive_seconds: default_client_inactive_seconds(),
            init_retry_base_ms: default_init_retry_base_ms(),
            init_retry_max_ms: default_init_retry_max_ms(),
            init_retry_count: default_init_retry_count(),
            bootstrap_mode: BootstrapMode::default(),
            bootstrap_concurrency: default_bootstrap_concurrency(),
            bootstrap_timeout_seconds: default_bootstrap_timeout_seconds(),
            default_activation_mode: ActivationMode::default(),
            expose_tools_default: false,
            tool_namespace_strategy: ToolNamespaceStrategy::default(),
            reload_mode: OpaqueConfig::Null,
            observability: OpaqueConfig::Null,
            rpc: OpaqueConfig::Null,
            sub_agent: OpaqueConfig::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolNamespaceStrategy {
    #[default]
    Prefix,
    Flat,
}

fn default_route_timeout_seconds() -> u64 {
    30
}
fn default_ping_interval_seconds() -> u64 {
    60
}
fn default_idle_check_interval_seconds() -> u64 {
    15
}
fn default_tool_refresh_interval_seconds() -> u64 {
    300
}
fn default_tool_refresh_concurrency() -> u32 {
    4
}
fn default_client_check_seconds() -> u64 {
    30
}
fn default_client_inactive_seconds() -> u64 {
    120
}
fn default_init_retry_base_ms() -> u64 {
    500
}
fn default_init_retry_max_ms() -> u64 {
    30_000
}
fn default_init_retry_count() -> u32 {
    5
}
fn default_bootstrap_concurrency() -> u32 {
    4
}
fn default_bootstrap_timeout_seconds() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_alias_maps_onto_client_fields() {
        let raw = r#"
            caller_check_seconds = 7
            caller_inactive_seconds = 42
        "#;
        let cfg: RuntimeConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.client_check_seconds, 7);
        assert_eq!(cfg.client_inactive_seconds, 42);
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.route_timeout_seconds, 30);
        assert_eq!(cfg.bootstrap_mode, BootstrapMode::Parallel);
    }
}
