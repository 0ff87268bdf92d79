//! # Non-blocking agent health reporting.
//!
//! Each agent handle owns a [`HealthCell`]: a small lock-guarded snapshot
//! of status, last error and last heartbeat. Reads never block on event
//! processing; writes are a few words under a short exclusive section.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// `start()` is in progress.
    Starting,
    /// Subscribed and processing normally.
    Running,
    /// Operating on a fallback path (e.g. statistical detector).
    Degraded,
    /// Not subscribed; terminal until the next `start()`.
    Stopped,
}

/// Point-in-time health view.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Current status.
    pub status: AgentStatus,
    /// Label + message of the most recent processing error, if any.
    pub last_error: Option<String>,
    /// When the agent last finished processing an event.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Shared health state for one agent.
///
/// Callable concurrently with `process`; all methods are non-blocking.
pub struct HealthCell {
    inner: RwLock<HealthSnapshot>,
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCell {
    /// Creates a cell in [`AgentStatus::Stopped`].
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HealthSnapshot {
                status: AgentStatus::Stopped,
                last_error: None,
                last_heartbeat: None,
            }),
        }
    }

    /// Sets the status unconditionally (lifecycle transitions).
    pub fn set_status(&self, status: AgentStatus) {
        self.inner.write().status = status;
    }

    /// Flags degraded operation; no-op unless currently running.
    pub fn mark_degraded(&self) {
        let mut g = self.inner.write();
        if g.status == AgentStatus::Running {
            g.status = AgentStatus::Degraded;
        }
    }

    /// Clears a degraded flag; no-op unless currently degraded.
    pub fn mark_recovered(&self) {
        let mut g = self.inner.write();
        if g.status == AgentStatus::Degraded {
            g.status = AgentStatus::Running;
        }
    }

    /// Records a successful processing pass.
    pub fn heartbeat(&self) {
        self.inner.write().last_heartbeat = Some(Utc::now());
    }

    /// Records a processing failure (also counts as a heartbeat — the agent
    /// is alive, just failing).
    pub fn record_error(&self, summary: impl Into<String>) {
        let mut g = self.inner.write();
        g.last_error = Some(summary.into());
        g.last_heartbeat = Some(Utc::now());
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().clone()
    }

    /// Current status only.
    pub fn status(&self) -> AgentStatus {
        self.inner.read().status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_only_from_running() {
        let cell = HealthCell::new();
        cell.mark_degraded();
        assert_eq!(cell.status(), AgentStatus::Stopped);

        cell.set_status(AgentStatus::Running);
        cell.mark_degraded();
        assert_eq!(cell.status(), AgentStatus::Degraded);

        cell.mark_recovered();
        assert_eq!(cell.status(), AgentStatus::Running);
    }

    #[test]
    fn errors_keep_heartbeat_fresh() {
        let cell = HealthCell::new();
        assert!(cell.snapshot().last_heartbeat.is_none());
        cell.record_error("agent_transient: db timeout");
        let snap = cell.snapshot();
        assert!(snap.last_heartbeat.is_some());
        assert!(snap.last_error.as_deref().unwrap_or("").contains("timeout"));
    }
}
