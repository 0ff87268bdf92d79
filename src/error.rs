//! Error types used by the coordination runtime and agents.
//!
//! This module defines the main error enums:
//!
//! - [`BusError`] — subscription/wiring errors raised by the event bus.
//! - [`AgentError`] — failures raised by agent event processing, classified
//!   as transient (retried by the bus) or fatal (dead-lettered immediately).
//! - [`RegistryError`] — typed lookup failures from the agent registry.
//! - [`RuntimeError`] — errors raised by the pipeline runtime itself.
//! - [`ConfigError`] — rejected configuration at construction time.
//!
//! The enums provide helper methods (`as_label`, `is_retryable`) for
//! logging/metrics and retry routing.

use std::time::Duration;
use thiserror::Error;

use crate::events::EventType;

/// # Errors produced by event-bus wiring operations.
///
/// These cover subscription-time validation; delivery failures are not
/// errors at this level — they flow through retry and the dead-letter queue.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// A (subscriber, event_type) pair was already subscribed.
    #[error("subscriber {subscriber} already consumes {event_type:?}")]
    DuplicateSubscription {
        /// Offending subscriber id.
        subscriber: String,
        /// Event type already routed to this subscriber.
        event_type: EventType,
    },

    /// The subscription would close a cycle in the event-type graph.
    #[error("subscriber {subscriber} would create an event cycle: {detail}")]
    CyclicSubscription {
        /// Offending subscriber id.
        subscriber: String,
        /// Human-readable description of the offending edge.
        detail: String,
    },

    /// Unsubscribe was requested for an id the bus does not know.
    #[error("unknown subscriber {subscriber}")]
    UnknownSubscriber {
        /// The id that was not found.
        subscriber: String,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::DuplicateSubscription { .. } => "bus_duplicate_subscription",
            BusError::CyclicSubscription { .. } => "bus_cyclic_subscription",
            BusError::UnknownSubscriber { .. } => "bus_unknown_subscriber",
        }
    }
}

/// # Failures raised by agent event processing.
///
/// Agents classify their own failures before returning to the bus so retry
/// vs. dead-letter routing is correct; the bus never inspects payload
/// semantics.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// Recoverable failure (network/store timeout); the bus retries it.
    #[error("transient failure: {reason}")]
    Transient {
        /// The underlying failure message.
        reason: String,
    },

    /// Non-recoverable failure (malformed event, wiring bug); dead-lettered
    /// without further attempts.
    #[error("fatal failure (no retry): {reason}")]
    Fatal {
        /// The underlying failure message.
        reason: String,
    },
}

impl AgentError {
    /// Convenience constructor for a transient failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        AgentError::Transient {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for a fatal failure.
    pub fn fatal(reason: impl Into<String>) -> Self {
        AgentError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AgentError::Transient { .. } => "agent_transient",
            AgentError::Fatal { .. } => "agent_fatal",
        }
    }

    /// Indicates whether the failure is safe to retry.
    ///
    /// # Example
    /// ```
    /// use upkeep::AgentError;
    ///
    /// assert!(AgentError::transient("db timeout").is_retryable());
    /// assert!(!AgentError::fatal("malformed payload").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transient { .. })
    }
}

/// # Typed lookup failures from the agent registry.
///
/// Normal absence is a result, never a panic.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No descriptor registered under this agent id.
    #[error("agent {agent_id} is not registered")]
    NotFound {
        /// The id that was looked up.
        agent_id: String,
    },
}

/// # Errors produced by the pipeline runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some agents had in-flight
    /// deliveries that did not drain and were abandoned.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Agent ids that did not drain in time.
        stuck: Vec<String>,
    },

    /// An agent did not finish starting within the startup timeout.
    #[error("agent {agent_id} did not start within {timeout:?}")]
    StartupTimeout {
        /// The agent that stalled.
        agent_id: String,
        /// The configured startup timeout.
        timeout: Duration,
    },

    /// An agent's startup hook failed.
    #[error("agent {agent_id} failed to start: {reason}")]
    AgentInit {
        /// The agent whose `init` failed.
        agent_id: String,
        /// The underlying failure message.
        reason: String,
    },

    /// Subscription wiring failed while starting an agent.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::StartupTimeout { .. } => "runtime_startup_timeout",
            RuntimeError::AgentInit { .. } => "runtime_agent_init",
            RuntimeError::Bus(e) => e.as_label(),
        }
    }
}

/// # Rejected configuration.
///
/// Raised by [`CoreConfig::validated`](crate::config::CoreConfig::validated)
/// before any runtime component is constructed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A numeric knob was outside its valid range.
    #[error("invalid config value for {field}: {detail}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable_fatal_is_not() {
        assert!(AgentError::transient("x").is_retryable());
        assert!(!AgentError::fatal("x").is_retryable());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(AgentError::transient("x").as_label(), "agent_transient");
        assert_eq!(
            RegistryError::NotFound {
                agent_id: "a".into()
            }
            .to_string(),
            "agent a is not registered"
        );
    }
}
