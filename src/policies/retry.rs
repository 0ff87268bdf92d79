//! # Retry policy for event deliveries.
//!
//! [`RetryPolicy`] bounds how many times the bus invokes a handler for one
//! event before the delivery is moved to the dead-letter queue. Only
//! transient failures consume retries; a fatal failure dead-letters on the
//! attempt it occurred.

/// Bounded attempt budget for one (event, subscriber) delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (`>= 1`).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    /// Returns a policy with 4 total attempts (1 initial + 3 retries).
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget, clamped to at least 1.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// True if another attempt is allowed after `attempt` attempts were made.
    #[inline]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
