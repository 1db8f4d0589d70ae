//! `ClientRegistry` — RPC clients registered against the control plane.
//!
//! Grounded in the teacher's `NodeRegistry`: a name-keyed collection behind
//! a lock, with register/list and a staleness sweep. Generalized so the
//! collection itself is the `Watchable` state, which gives `WatchActiveClients`
//! for free instead of needing a second notification path.

use std::collections::HashMap;
use std::sync::Arc;

use mcpctl_domain::ClientRegistration;

use crate::watchable::Watchable;

pub struct ClientRegistry {
    state: Watchable<Arc<HashMap<String, ClientRegistration>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            state: Watchable::new(Arc::new(HashMap::new())),
        }
    }

    pub fn register(&self, client: impl Into<String>, pid: Option<u32>, tags: Vec<String>) {
        let client = client.into();
        self.state.update(|m| {
            let inner = Arc::make_mut(m);
            inner.insert(client.clone(), ClientRegistration::new(client, pid, tags));
        });
    }

    pub fn unregister(&self, client: &str) {
        self.state.update(|m| {
            Arc::make_mut(m).remove(client);
        });
    }

    pub fn is_registered(&self, client: &str) -> bool {
        self.state.get().contains_key(client)
    }

    /// Refresh a client's heartbeat. No-op (not an error) if the client
    /// isn't registered — callers that care use `is_registered` first.
    pub fn touch(&self, client: &str) {
        self.state.update(|m| {
            if let Some(reg) = Arc::make_mut(m).get_mut(client) {
                reg.touch();
            }
        });
    }

    pub fn list(&self) -> Vec<ClientRegistration> {
        self.state.get().values().cloned().collect()
    }

    pub fn watch(&self) -> impl futures_core::Stream<Item = Vec<ClientRegistration>> {
        use futures_util::StreamExt;
        self.state.watch().map(|m| m.values().cloned().collect())
    }

    /// Remove every client whose last heartbeat is older than
    /// `inactive_threshold_secs`. Returns the removed client names for
    /// logging.
    pub fn sweep_inactive(&self, inactive_threshold_secs: i64) -> Vec<String> {
        let now = chrono::Utc::now();
        let mut removed = Vec::new();
        self.state.update(|m| {
            let inner = Arc::make_mut(m);
            inner.retain(|name, reg| {
                let stale = reg.is_inactive(now, inactive_threshold_secs);
                if stale {
                    removed.push(name.clone());
                }
                !stale
            });
        });
        removed
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_list() {
        let registry = ClientRegistry::new();
        registry.register("ide-1", Some(123), vec!["vscode".into()]);
        let clients = registry.list();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].client, "ide-1");
        assert!(registry.is_registered("ide-1"));
    }

    #[test]
    fn unregister_removes() {
        let registry = ClientRegistry::new();
        registry.register("ide-1", None, vec![]);
        registry.unregister("ide-1");
        assert!(!registry.is_registered("ide-1"));
    }

    #[test]
    fn sweep_inactive_removes_stale_clients_only() {
        let registry = ClientRegistry::new();
        registry.register("fresh", None, vec![]);
        registry.register("stale", None, vec![]);
        registry.state.update(|m| {
            let inner = Arc::make_mut(m);
            inner.get_mut("stale").unwrap().last_heartbeat_at =
                chrono::Utc::now() - chrono::Duration::seconds(1000);
        });

        let removed = registry.sweep_inactive(120);
        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(registry.is_registered("fresh"));
        assert!(!registry.is_registered("stale"));
    }
}
