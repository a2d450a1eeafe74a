use std::time::Duration;

use tokio::time::Instant;

/// Fixed-interval schedule entry
///
/// Missed ticks are coalesced: after a long stall only one iteration is due,
/// and firing moves the next deadline a full interval past the firing time.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    next_due: Instant,
}

impl Scheduler {
    /// Create a schedule whose first iteration is due one interval after `start`
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_due: start + interval,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Check if an iteration is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Record that an iteration fired at `now`
    pub fn mark_fired(&mut self, now: Instant) {
        self.next_due = now + self.interval;
    }
}
