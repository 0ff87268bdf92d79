//! # Agent abstraction.
//!
//! An [`Agent`] is an autonomous pipeline unit: it declares what it
//! consumes and emits, exposes named capabilities to the registry, and
//! turns one inbound event into zero or more follow-up events.
//!
//! Agents never touch the bus directly — the runtime's
//! [`AgentHandle`](crate::runtime::AgentHandle) subscribes on their behalf
//! and publishes the returned events only after `process` succeeds, so an
//! event chain is advertised only once the work behind it is committed.
//!
//! ## Example
//! ```
//! use async_trait::async_trait;
//! use upkeep::events::{Event, EventType};
//! use upkeep::{Agent, AgentError};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Agent for Echo {
//!     fn id(&self) -> &str { "echo" }
//!     fn capabilities(&self) -> &[&'static str] { &["echo"] }
//!     fn consumes(&self) -> &[EventType] { &[EventType::SensorDataReceived] }
//!     fn emits(&self) -> &[EventType] { &[] }
//!
//!     async fn process(&self, _event: &Event) -> Result<Vec<Event>, AgentError> {
//!         Ok(Vec::new())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::AgentError;
use crate::events::{Event, EventType};

/// # Autonomous pipeline unit.
///
/// Implementations must:
/// - classify failures ([`AgentError::Transient`] vs [`AgentError::Fatal`])
///   so the bus retries only what is retryable;
/// - tolerate redelivery of the same `event_id` (at-least-once bus); use
///   [`IdempotencyGuard`](crate::runtime::IdempotencyGuard) where a side
///   effect must happen exactly once;
/// - commit external state (store writes, outbound calls) *before*
///   returning the events that advertise it;
/// - derive every returned event from the inbound one via
///   [`Event::follow`], keeping the correlation/causation chain intact —
///   the runtime rejects violations as fatal wiring errors;
/// - bound every I/O wait with a timeout; unbounded blocking inside
///   `process` stalls that subscriber's queue.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Stable agent id (also the bus subscriber id).
    fn id(&self) -> &str;

    /// Named operations this agent exposes, registered with the
    /// [`AgentRegistry`](crate::runtime::AgentRegistry).
    fn capabilities(&self) -> &[&'static str];

    /// Event types this agent consumes.
    fn consumes(&self) -> &[EventType];

    /// Event types this agent may emit from `process`.
    fn emits(&self) -> &[EventType];

    /// Per-event-type delivery queue capacity.
    fn queue_capacity(&self) -> usize {
        256
    }

    /// One-time startup work (warming caches, probing collaborators).
    ///
    /// Runs inside the runtime's startup timeout; the default does nothing.
    async fn init(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Handles one event and returns the events to publish next.
    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError>;
}
