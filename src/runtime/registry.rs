//! # Agent registry — process-wide agent directory.
//!
//! Maps agent ids to descriptors (capabilities, status, last heartbeat).
//! Agents push updates through the registry's methods; the internal map is
//! never exposed, lookups return cloned descriptors.
//!
//! ## Rules
//! - Single instance per process, shared via `Arc`.
//! - All mutation goes through the write lock (single-writer discipline);
//!   steady-state reads only take the read lock.
//! - Lookups for unknown ids return a typed
//!   [`RegistryError::NotFound`](crate::error::RegistryError), never panic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::RegistryError;
use crate::runtime::health::AgentStatus;

/// Registered view of one agent.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    /// Stable agent id.
    pub agent_id: String,
    /// Named operations the agent exposes.
    pub capabilities: Vec<String>,
    /// Last pushed status.
    pub status: AgentStatus,
    /// Last pushed heartbeat.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Aggregated status counts across all registered agents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryHealth {
    pub starting: usize,
    pub running: usize,
    pub degraded: usize,
    pub stopped: usize,
}

impl RegistryHealth {
    /// True when every registered agent is running undegraded.
    pub fn all_running(&self) -> bool {
        self.starting == 0 && self.degraded == 0 && self.stopped == 0 && self.running > 0
    }
}

/// Process-wide directory of live agents.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<HashMap<String, AgentDescriptor>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) an agent in [`AgentStatus::Starting`].
    pub fn register(&self, agent_id: &str, capabilities: &[&str]) {
        let mut map = self.inner.write();
        map.insert(
            agent_id.to_string(),
            AgentDescriptor {
                agent_id: agent_id.to_string(),
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                status: AgentStatus::Starting,
                last_heartbeat: None,
            },
        );
    }

    /// Removes an agent's descriptor.
    pub fn deregister(&self, agent_id: &str) {
        self.inner.write().remove(agent_id);
    }

    /// Pushes a status change.
    pub fn update_status(&self, agent_id: &str, status: AgentStatus) {
        if let Some(d) = self.inner.write().get_mut(agent_id) {
            d.status = status;
        }
    }

    /// Pushes a heartbeat, optionally with a status refresh.
    pub fn heartbeat(&self, agent_id: &str, status: AgentStatus) {
        if let Some(d) = self.inner.write().get_mut(agent_id) {
            d.status = status;
            d.last_heartbeat = Some(Utc::now());
        }
    }

    /// Looks up one agent.
    pub fn lookup(&self, agent_id: &str) -> Result<AgentDescriptor, RegistryError> {
        self.inner
            .read()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                agent_id: agent_id.to_string(),
            })
    }

    /// All agents exposing the given capability, sorted by id.
    pub fn list_by_capability(&self, capability: &str) -> Vec<AgentDescriptor> {
        let mut out: Vec<AgentDescriptor> = self
            .inner
            .read()
            .values()
            .filter(|d| d.capabilities.iter().any(|c| c == capability))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    /// All registered agents, sorted by id.
    pub fn list(&self) -> Vec<AgentDescriptor> {
        let mut out: Vec<AgentDescriptor> = self.inner.read().values().cloned().collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    /// Status counts across all registered agents.
    pub fn aggregate_health(&self) -> RegistryHealth {
        let mut health = RegistryHealth::default();
        for d in self.inner.read().values() {
            match d.status {
                AgentStatus::Starting => health.starting += 1,
                AgentStatus::Running => health.running += 1,
                AgentStatus::Degraded => health.degraded += 1,
                AgentStatus::Stopped => health.stopped += 1,
            }
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_lookup_is_typed_not_found() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.lookup("ghost"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn capability_listing_filters_and_sorts() {
        let registry = AgentRegistry::new();
        registry.register("b-agent", &["detect", "score"]);
        registry.register("a-agent", &["detect"]);
        registry.register("c-agent", &["notify"]);

        let detectors = registry.list_by_capability("detect");
        let ids: Vec<&str> = detectors.iter().map(|d| d.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["a-agent", "b-agent"]);
    }

    #[test]
    fn aggregate_counts_follow_pushed_updates() {
        let registry = AgentRegistry::new();
        registry.register("a", &[]);
        registry.register("b", &[]);
        registry.update_status("a", AgentStatus::Running);
        registry.heartbeat("b", AgentStatus::Degraded);

        let health = registry.aggregate_health();
        assert_eq!(health.running, 1);
        assert_eq!(health.degraded, 1);
        assert!(!health.all_running());

        registry.deregister("b");
        registry.update_status("a", AgentStatus::Running);
        assert!(registry.aggregate_health().all_running());
    }
}
