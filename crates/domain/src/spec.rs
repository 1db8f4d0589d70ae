//! `ServerSpec` — declarative configuration of one backing MCP server.
//!
//! Specs are immutable values; any change produces a new value. See
//! `fingerprint.rs` for the content-addressed identity derived from a
//! spec's transport fields.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Policy for when a pool's instances are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationMode {
    /// Start at bootstrap.
    AlwaysOn,
    /// Start on first call.
    #[default]
    OnDemand,
}

/// Transport-specific configuration. The identity fields used for
/// fingerprinting live on these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum TransportConfig {
    Stdio {
        cmd: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
    },
    StreamableHttp {
        endpoint: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
}

fn default_max_retries() -> u32 {
    3
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Stdio { .. } => "stdio",
            TransportConfig::StreamableHttp { .. } => "streamable-http",
        }
    }
}

/// Declarative configuration of one backing MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Logical name. Excluded from the spec fingerprint.
    pub name: String,

    pub transport: TransportConfig,

    /// Protocol version this server speaks. Identity field.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    // ── Scheduler hints (excluded from the fingerprint) ────────────
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    #[serde(default)]
    pub min_ready: u32,
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u64,
    #[serde(default)]
    pub activation_mode: ActivationMode,

    // ── Governance hints (excluded from the fingerprint) ───────────
    #[serde(default)]
    pub expose_tools: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// The protocol version a stdio spec must request; anything else fails
/// transport startup with `UnsupportedProtocol`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions a streamable-http spec may request.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_idle_seconds() -> u64 {
    600
}

fn default_max_concurrent() -> u32 {
    1
}

fn default_drain_timeout_seconds() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_stdio_spec() {
        let raw = r#"
            name = "calc"
            transport = "stdio"
            cmd = ["calc-srv"]
        "#;
        let spec: ServerSpec = toml::from_str(raw).unwrap();
        assert_eq!(spec.name, "calc");
        assert_eq!(spec.max_concurrent, 1);
        assert!(matches!(spec.transport, TransportConfig::Stdio { .. }));
    }

    #[test]
    fn deserialize_streamable_http_spec() {
        let raw = r#"
            name = "remote"
            transport = "streamable-http"
            endpoint = "https://example.com/mcp"
        "#;
        let spec: ServerSpec = toml::from_str(raw).unwrap();
        match spec.transport {
            TransportConfig::StreamableHttp { max_retries, .. } => assert_eq!(max_retries, 3),
            _ => panic!("expected streamable-http"),
        }
    }
}
