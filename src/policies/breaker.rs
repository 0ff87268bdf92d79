//! # Circuit breaker for unreliable dependencies.
//!
//! [`CircuitBreaker`] stops calling a failing dependency for a cool-down
//! period after repeated failures, so a dead database or notification
//! channel does not stack up timeouts on the event-delivery path.
//!
//! ## State machine
//! ```text
//!            failure_threshold reached
//!   Closed ────────────────────────────► Open
//!     ▲                                   │
//!     │ probe succeeds                    │ cooldown elapsed
//!     │                                   ▼
//!     └──────────────────────────────── HalfOpen
//!                   probe fails ──► Open (cooldown restarts)
//! ```
//!
//! ## Usage
//! Callers guard each dependency call with [`CircuitBreaker::allow`] and
//! report the outcome with [`CircuitBreaker::record_success`] /
//! [`CircuitBreaker::record_failure`]. While open, `allow()` returns `false`
//! and the caller takes its degraded path instead of blocking.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Observable breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally; consecutive failures are counted.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// One probe call is allowed through to test recovery.
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Cool-down guard around one unreliable dependency.
///
/// Cheap to share: clone the owning `Arc`. All methods are non-blocking;
/// the critical sections only flip counters.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// - `failure_threshold`: consecutive failures that open the circuit
    ///   (clamped to at least 1).
    /// - `cooldown`: how long the circuit stays open before a probe.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Returns whether a call may proceed right now.
    ///
    /// While open, flips to half-open once the cooldown has elapsed and lets
    /// exactly one probe through; concurrent callers see `false` until the
    /// probe reports back.
    pub fn allow(&self) -> bool {
        let mut g = self.inner.lock();
        match g.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = g
                    .opened_at
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    g.state = BreakerState::HalfOpen;
                    g.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if g.probe_in_flight {
                    false
                } else {
                    g.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Reports a successful call; closes the circuit.
    pub fn record_success(&self) {
        let mut g = self.inner.lock();
        g.state = BreakerState::Closed;
        g.consecutive_failures = 0;
        g.opened_at = None;
        g.probe_in_flight = false;
    }

    /// Reports a failed call; opens the circuit once the threshold is hit,
    /// and reopens immediately on a failed half-open probe.
    pub fn record_failure(&self) {
        let mut g = self.inner.lock();
        match g.state {
            BreakerState::HalfOpen => {
                g.state = BreakerState::Open;
                g.opened_at = Some(Instant::now());
                g.probe_in_flight = false;
            }
            BreakerState::Closed => {
                g.consecutive_failures += 1;
                if g.consecutive_failures >= self.failure_threshold {
                    g.state = BreakerState::Open;
                    g.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Current state snapshot (for health reporting).
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}
