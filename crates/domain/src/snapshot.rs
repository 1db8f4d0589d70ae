//! Read-only snapshot value types returned by the control plane facade's
//! observability surface (`GetPoolStatus`, `GetServerInitStatus`,
//! `GetBootstrapProgress`). `spec.md` names these operations but not their
//! shapes — added per SPEC_FULL.md §3 [SUPPLEMENT].

use crate::fingerprint::SpecKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatusSnapshot {
    pub spec_key: SpecKey,
    pub server_name: String,
    pub instance_count: usize,
    pub ready_count: usize,
    pub busy_count: usize,
    pub draining_count: usize,
    pub desired_min_ready: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInitStatusSnapshot {
    pub spec_key: SpecKey,
    pub state: InitState,
    pub last_error: Option<String>,
    pub attempt: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub current: Option<String>,
    pub errors: HashMap<SpecKey, String>,
    pub percentage: f32,
    pub state: InitState,
}

impl BootstrapProgressSnapshot {
    pub fn empty() -> Self {
        Self {
            total: 0,
            completed: 0,
            failed: 0,
            current: None,
            errors: HashMap::new(),
            percentage: 100.0,
            state: InitState::Completed,
        }
    }
}
