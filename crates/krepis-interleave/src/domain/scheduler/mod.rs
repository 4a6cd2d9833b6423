//! Scheduler Policies
//!
//! # Overview
//!
//! Each execution state owns exactly one [`Scheduler`]: the set of threads
//! that are ready to run, plus the policy that picks among them. The set is
//! always a subset of the state's non-terminated threads; entering a blocked
//! state removes a thread and leaving one re-adds it.
//!
//! | Policy | `select_next_item` | `re_schedule` |
//! |--------|--------------------|---------------|
//! | ArrivalOrder | FIFO head, left in place | rotate head to back |
//! | Preemptive | most recently added | rotate top to bottom |
//! | Guided(base) | prefix's next thread if ready, else base | base |
//!
//! # Design Notes
//!
//! The policy set is closed, so dispatch is a plain `match` on an enum.
//! Guided nests its base in a `Box`; a forked state clones the whole
//! scheduler, prefix cursor included.

pub mod arrival;
pub mod guided;
pub mod preemptive;

pub use arrival::ArrivalOrder;
pub use guided::Guided;
pub use preemptive::Preemptive;

use crate::domain::prefix::Prefix;
use crate::domain::types::{Location, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base policy selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Run the oldest ready thread until it blocks
    #[default]
    ArrivalOrder,
    /// Run the newest ready thread
    Preemptive,
}

/// Ready set plus policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduler {
    /// FIFO
    ArrivalOrder(ArrivalOrder),
    /// LIFO
    Preemptive(Preemptive),
    /// Prefix replay over a base policy
    Guided(Guided),
}

impl Scheduler {
    /// Create an empty scheduler of the given kind
    pub fn new(kind: SchedulerKind) -> Self {
        match kind {
            SchedulerKind::ArrivalOrder => Self::ArrivalOrder(ArrivalOrder::new()),
            SchedulerKind::Preemptive => Self::Preemptive(Preemptive::new()),
        }
    }

    /// Wrap `base` so that it replays `prefix` first
    pub fn guided(base: Scheduler, prefix: Prefix) -> Self {
        Self::Guided(Guided::new(base, prefix))
    }

    /// Policy name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArrivalOrder(_) => "arrival-order",
            Self::Preemptive(_) => "preemptive",
            Self::Guided(_) => "guided",
        }
    }

    /// Next thread to run
    ///
    /// `schedulable` is consulted only by the guided policy to decide
    /// whether the expected thread can make progress; base policies leave
    /// it to the driver to rotate past a thread that cannot run.
    pub fn select_next_item(&self, schedulable: &dyn Fn(ThreadId) -> bool) -> Option<ThreadId> {
        match self {
            Self::ArrivalOrder(s) => s.select_next_item(),
            Self::Preemptive(s) => s.select_next_item(),
            Self::Guided(g) => g.select_next_item(schedulable),
        }
    }

    /// Mark `tid` ready
    pub fn add_item(&mut self, tid: ThreadId) {
        match self {
            Self::ArrivalOrder(s) => s.add_item(tid),
            Self::Preemptive(s) => s.add_item(tid),
            Self::Guided(g) => g.base_mut().add_item(tid),
        }
    }

    /// Remove `tid` from the ready set
    pub fn remove_item(&mut self, tid: ThreadId) {
        match self {
            Self::ArrivalOrder(s) => s.remove_item(tid),
            Self::Preemptive(s) => s.remove_item(tid),
            Self::Guided(g) => g.base_mut().remove_item(tid),
        }
    }

    /// Rotate so a different thread is selected next
    pub fn re_schedule(&mut self) {
        match self {
            Self::ArrivalOrder(s) => s.re_schedule(),
            Self::Preemptive(s) => s.re_schedule(),
            Self::Guided(g) => g.base_mut().re_schedule(),
        }
    }

    /// Whether no thread is ready
    pub fn is_empty(&self) -> bool {
        match self {
            Self::ArrivalOrder(s) => s.is_empty(),
            Self::Preemptive(s) => s.is_empty(),
            Self::Guided(g) => g.base().is_empty(),
        }
    }

    /// Whether `tid` is ready
    pub fn contains(&self, tid: ThreadId) -> bool {
        match self {
            Self::ArrivalOrder(s) => s.contains(tid),
            Self::Preemptive(s) => s.contains(tid),
            Self::Guided(g) => g.base().contains(tid),
        }
    }

    /// Ready threads in policy order
    pub fn items(&self) -> Vec<ThreadId> {
        match self {
            Self::ArrivalOrder(s) => s.items(),
            Self::Preemptive(s) => s.items(),
            Self::Guided(g) => g.base().items(),
        }
    }

    /// Notify the policy that `tid` executed one event
    ///
    /// Only the guided policy reacts: it advances its prefix cursor while
    /// replaying and records the actual child id at create points.
    pub fn on_event(&mut self, spawned: Option<ThreadId>) {
        if let Self::Guided(g) = self {
            if g.is_replaying() {
                g.on_event(spawned);
            }
        }
    }

    /// Whether a prefix is still being replayed
    pub fn is_replaying(&self) -> bool {
        matches!(self, Self::Guided(g) if g.is_replaying())
    }

    /// Next expected (thread, location) while replaying
    pub fn expected(&self) -> Option<(ThreadId, Location)> {
        match self {
            Self::Guided(g) => g.expected(),
            _ => None,
        }
    }

    /// Wake hint for a signal about to execute during replay
    pub fn wake_hint(&self) -> Option<ThreadId> {
        match self {
            Self::Guided(g) if g.is_replaying() => g.prefix().wake_hint(),
            _ => None,
        }
    }

    /// Where the prefix expects `tid` to execute next, if it names it again
    pub fn replay_lookahead(&self, tid: ThreadId) -> Option<Location> {
        self.prefix().and_then(|p| p.next_location_of(tid))
    }

    /// Bound prefix, if guided
    pub fn prefix(&self) -> Option<&Prefix> {
        match self {
            Self::Guided(g) => Some(g.prefix()),
            _ => None,
        }
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guided(g) => write!(f, "guided({}, {})", g.base(), g.prefix()),
            other => write!(f, "{}", other.name()),
        }
    }
}
