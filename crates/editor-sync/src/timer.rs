//! Cancellable deadlines.
//!
//! The engine never owns a thread or a runtime timer. A [`Deadline`] is plain data owned by the
//! per-document session: the host reports the current time through
//! [`Editor::tick`](crate::Editor::tick) and due deadlines fire there. Dropping or cancelling
//! the session drops its deadlines, so a timer cannot outlive the document it was armed for.

use std::time::{Duration, Instant};

/// A single-shot, cancel-and-reschedule timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// An unarmed deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline `delay` after `now`, replacing any earlier arming.
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.at = Some(now + delay);
    }

    /// Disarm the deadline.
    pub fn cancel(&mut self) {
        self.at = None;
    }

    /// Returns `true` while armed.
    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// When the deadline fires, if armed.
    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    /// Returns `true` if armed and `now` has reached the deadline.
    pub fn is_due(&self, now: Instant) -> bool {
        self.at.is_some_and(|at| now >= at)
    }

    /// Disarm and return `true` if the deadline was due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.at = None;
            true
        } else {
            false
        }
    }
}
