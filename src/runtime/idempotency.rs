//! # Check-and-set guard for exactly-once side effects.
//!
//! The bus delivers at-least-once and never deduplicates. Agents whose side
//! effects must not repeat (booking a task, writing the closing log) call
//! [`IdempotencyGuard::first_time`] with the inbound `event_id` before
//! acting; redeliveries and duplicate publishes become no-ops.

use std::collections::HashSet;

use parking_lot::Mutex;
use uuid::Uuid;

/// Set of already-processed event ids.
#[derive(Default)]
pub struct IdempotencyGuard {
    seen: Mutex<HashSet<Uuid>>,
}

impl IdempotencyGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically records `event_id`; returns `true` only on first sight.
    ///
    /// Use when the side effect is safe to run immediately after the check.
    pub fn first_time(&self, event_id: Uuid) -> bool {
        self.seen.lock().insert(event_id)
    }

    /// True if `event_id` was already marked processed.
    ///
    /// Pair with [`mark`](Self::mark) *after* the side effect commits, so a
    /// transient failure mid-processing leaves the event retryable.
    pub fn seen(&self, event_id: Uuid) -> bool {
        self.seen.lock().contains(&event_id)
    }

    /// Records `event_id` as processed.
    pub fn mark(&self, event_id: Uuid) {
        self.seen.lock().insert(event_id);
    }

    /// How many distinct event ids were recorded.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// True if nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sight_is_rejected() {
        let guard = IdempotencyGuard::new();
        let id = Uuid::new_v4();
        assert!(guard.first_time(id));
        assert!(!guard.first_time(id));
        assert!(guard.first_time(Uuid::new_v4()));
        assert_eq!(guard.len(), 2);
    }
}
