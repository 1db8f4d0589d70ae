//! Content-addressed identity for a [`ServerSpec`].
//!
//! `fingerprint` hashes only the fields that determine what process would be
//! launched (transport kind, cmd, cwd, env, protocol version, and the
//! transport-specific fields). Scheduler hints and governance fields never
//! affect the result.

use crate::spec::{ServerSpec, TransportConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable, content-addressed hex digest over a spec's identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct SpecKey(String);

impl SpecKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-computed digest string. Used by tests and by
    /// catalog-source adapters that persist specKeys as plain strings.
    pub fn from_hex(hex: String) -> Self {
        SpecKey(hex)
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A length-prefixed field writer so that, e.g., `("ab", "c")` and
/// `("a", "bc")` never collide when concatenated.
fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn write_sorted_map(hasher: &mut Sha256, map: &std::collections::HashMap<String, String>) {
    let mut entries: Vec<(&String, &String)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    write_field(hasher, &(entries.len() as u64).to_le_bytes());
    for (k, v) in entries {
        write_field(hasher, k.as_bytes());
        write_field(hasher, v.as_bytes());
    }
}

/// Compute the specKey for a spec. Deterministic: two specs whose identity
/// fields are equal always produce the same key, regardless of hint fields.
pub fn fingerprint(spec: &ServerSpec) -> SpecKey {
    let mut hasher = Sha256::new();

    write_field(&mut hasher, spec.transport.kind().as_bytes());
    write_field(&mut hasher, spec.protocol_version.as_bytes());

    match &spec.transport {
        TransportConfig::Stdio { cmd, env, cwd } => {
            write_field(&mut hasher, &(cmd.len() as u64).to_le_bytes());
            for arg in cmd {
                write_field(&mut hasher, arg.as_bytes());
            }
            write_sorted_map(&mut hasher, env);
            write_field(&mut hasher, cwd.as_deref().unwrap_or("").as_bytes());
        }
        TransportConfig::StreamableHttp {
            endpoint,
            headers,
            max_retries,
        } => {
            write_field(&mut hasher, endpoint.as_bytes());
            write_sorted_map(&mut hasher, headers);
            write_field(&mut hasher, &max_retries.to_le_bytes());
        }
    }

    SpecKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ActivationMode;
    use std::collections::HashMap;

    fn base_spec() -> ServerSpec {
        ServerSpec {
            name: "calc".into(),
            transport: TransportConfig::Stdio {
                cmd: vec!["calc-srv".into()],
                env: HashMap::new(),
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

    #[test]
    fn hint_fields_do_not_affect_fingerprint() {
        let a = base_spec();
        let mut b = a.clone();
        b.idle_seconds = 1;
        b.max_concurrent = 9;
        b.min_ready = 3;
        b.drain_timeout_seconds = 1;
        b.activation_mode = ActivationMode::AlwaysOn;
        b.expose_tools = true;
        b.tags = vec!["x".into()];
        b.name = "different-name".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_cmd_yields_different_key() {
        let a = base_spec();
        let mut b = a.clone();
        if let TransportConfig::Stdio { cmd, .. } = &mut b.transport {
            cmd.push("--flag".into());
        }
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn env_map_order_does_not_matter() {
        let mut env_a = HashMap::new();
        env_a.insert("A".to_string(), "1".to_string());
        env_a.insert("B".to_string(), "2".to_string());
        let mut env_b = HashMap::new();
        env_b.insert("B".to_string(), "2".to_string());
        env_b.insert("A".to_string(), "1".to_string());

        let mut a = base_spec();
        a.transport = TransportConfig::Stdio {
            cmd: vec!["calc-srv".into()],
            env: env_a,
            cwd: None,
        };
        let mut b = base_spec();
        b.transport = TransportConfig::Stdio {
            cmd: vec!["calc-srv".into()],
            env: env_b,
            cwd: None,
        };
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn empty_env_matches_default_env() {
        let a = base_spec();
        let mut b = base_spec();
        b.transport = TransportConfig::Stdio {
            cmd: vec!["calc-srv".into()],
            env: HashMap::new(),
            cwd: None,
        };
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_endpoint_yields_different_key() {
        let a = ServerSpec {
            transport: TransportConfig::StreamableHttp {
                endpoint: "https://a.example.com/mcp".into(),
                headers: HashMap::new(),
                max_retries: 3,
            },
            ..base_spec()
        };
        let b = ServerSpec {
            transport: TransportConfig::StreamableHttp {
                endpoint: "https://b.example.com/mcp".into(),
                headers: HashMap::new(),
                max_retries: 3,
            },
            ..base_spec()
        };
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn stdio_and_streamable_http_never_collide() {
        let stdio = base_spec();
        let http = ServerSpec {
            transport: TransportConfig::StreamableHttp {
                endpoint: "https://a.example.com/mcp".into(),
                headers: HashMap::new(),
                max_retries: 3,
            },
            ..base_spec()
        };
        assert_ne!(fingerprint(&stdio), fingerprint(&http));
    }
}
