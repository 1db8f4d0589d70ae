//! `ClientRegistration` — a registered RPC client of the control plane.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle: created by `Register`; mutated by heartbeat/retag; destroyed by
/// `Unregister` or by the inactivity sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistration {
    pub client: String,
    pub pid: Option<u32>,
    pub tags: Vec<String>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub visible_server_count: usize,
}

impl ClientRegistration {
    pub fn new(client: impl Into<String>, pid: Option<u32>, tags: Vec<String>) -> Self {
        Self {
            client: client.into(),
            pid,
            tags,
            last_heartbeat_at: Utc::now(),
            visible_server_count: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_heartbeat_at = Utc::now();
    }

    pub fn is_inactive(&self, now: DateTime<Utc>, inactive_threshold_secs: i64) -> bool {
        (now - self.last_heartbeat_at).num_seconds() > inactive_threshold_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn inactivity_threshold() {
        let mut reg = ClientRegistration::new("ide-1", Some(123), vec![]);
        reg.last_heartbeat_at = Utc::now() - Duration::seconds(200);
        assert!(reg.is_inactive(Utc::now(), 120));
        reg.touch();
        assert!(!reg.is_inactive(Utc::now(), 120));
    }
}
