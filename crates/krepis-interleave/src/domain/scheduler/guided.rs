//! Guided policy
//!
//! Wraps a base policy and a [`Prefix`]. While the prefix has entries left,
//! the thread named by the next entry runs whenever it is ready; otherwise
//! (and forever after the prefix is exhausted) the base policy decides.
//!
//! ```text
//!            prefix.peek() ── map_thread ──► expected
//!                                              │
//!     ready & schedulable? ── yes ──► expected │
//!                          └─ no ───► base.select_next_item()
//! ```

use super::Scheduler;
use crate::domain::prefix::Prefix;
use crate::domain::types::{Location, ThreadId};

/// Replay-driven scheduler over a base policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guided {
    base: Box<Scheduler>,
    prefix: Prefix,
}

impl Guided {
    /// Bind `prefix` on top of `base`
    pub fn new(base: Scheduler, mut prefix: Prefix) -> Self {
        prefix.reset();
        Self {
            base: Box::new(base),
            prefix,
        }
    }

    /// Pick the expected thread if it can run, else defer to the base
    pub fn select_next_item(&self, schedulable: &dyn Fn(ThreadId) -> bool) -> Option<ThreadId> {
        if let Some((expected, _)) = self.prefix.expected() {
            if self.base.contains(expected) && schedulable(expected) {
                return Some(expected);
            }
        }
        self.base.select_next_item(schedulable)
    }

    /// Base policy
    pub fn base(&self) -> &Scheduler {
        &self.base
    }

    /// Mutable base policy
    pub fn base_mut(&mut self) -> &mut Scheduler {
        &mut self.base
    }

    /// Bound prefix
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    /// Whether prefix entries remain
    pub fn is_replaying(&self) -> bool {
        !self.prefix.is_exhausted()
    }

    /// Next expected (thread, location) while replaying
    pub fn expected(&self) -> Option<(ThreadId, Location)> {
        self.prefix.expected()
    }

    /// Consume one entry after the driver executed it
    pub fn on_event(&mut self, spawned: Option<ThreadId>) {
        self.prefix.advance(spawned);
    }
}
