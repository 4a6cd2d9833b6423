//! Trace Recording
//!
//! # Overview
//!
//! A [`Trace`] is the complete event log of one execution state, in global
//! execution order, with a per-thread view on top:
//!
//! ```text
//! events:     e0(T0) e1(T0) e2(T1) e3(T0) e4(T1) ...
//! per thread: T0 → [0, 1, 3]   T1 → [2, 4]
//! loads:      g0 → 2           (next read of g0 gets access #2)
//! ```
//!
//! The log is an `imbl::Vector`, so a forked state shares the whole prefix
//! with its parent and only pays for the events it appends.
//!
//! Derived maps (read/write sets, lock intervals, wait/signal pairs, barrier
//! groups, create/join points) are computed on demand by [`TraceIndex`].

pub mod event;
pub mod index;
pub mod signature;

pub use event::{Event, EventKind, EventTag};
pub use index::{LockInterval, SignalRecord, TraceIndex, WaitRecord};
pub use signature::TraceSignature;

use crate::domain::program::Program;
use crate::domain::types::{EventId, GlobalId, Location, ThreadId};
use crate::domain::vector_clock::VectorClock;
use imbl::{OrdMap, Vector};
use std::fmt::Write as _;

/// Ordered event log of one run
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vector<Event>,
    per_thread: OrdMap<ThreadId, Vector<usize>>,
    loads: OrdMap<GlobalId, u32>,
    stores: OrdMap<GlobalId, u32>,
    next_id: u64,
}

impl Trace {
    /// Create an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event for `thread`, returning its id
    pub fn record(&mut self, thread: ThreadId, location: Location, kind: EventKind, clock: VectorClock) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let index = self.events.len();
        let slots = self.per_thread.entry(thread).or_insert_with(Vector::new);
        let seq = u32::try_from(slots.len()).unwrap_or(u32::MAX);
        slots.push_back(index);
        self.events.push_back(Event {
            id,
            thread,
            seq,
            location,
            kind,
            clock,
        });
        id
    }

    /// Reserve the next load sequence number of `global`
    pub fn next_load(&mut self, global: GlobalId) -> u32 {
        let slot = self.loads.entry(global).or_insert(0);
        let access = *slot;
        *slot += 1;
        access
    }

    /// Reserve the next store sequence number of `global`
    pub fn next_store(&mut self, global: GlobalId) -> u32 {
        let slot = self.stores.entry(global).or_insert(0);
        let access = *slot;
        *slot += 1;
        access
    }

    /// Sequence number the next event of `thread` will get
    pub fn next_seq(&self, thread: ThreadId) -> u32 {
        self.per_thread
            .get(&thread)
            .map_or(0, |v| u32::try_from(v.len()).unwrap_or(u32::MAX))
    }

    /// All events in execution order
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter()
    }

    /// Event at a global position
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Threads that recorded at least one event
    pub fn threads(&self) -> Vec<ThreadId> {
        self.per_thread.keys().copied().collect()
    }

    /// Global positions of `thread`'s events, in program order
    pub fn thread_positions(&self, thread: ThreadId) -> Vec<usize> {
        self.per_thread
            .get(&thread)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Events of `thread`, in program order
    pub fn thread_events(&self, thread: ThreadId) -> impl Iterator<Item = &Event> + '_ {
        self.per_thread
            .get(&thread)
            .into_iter()
            .flat_map(|v| v.iter())
            .filter_map(|i| self.events.get(*i))
    }

    /// Event `seq` of `thread`
    pub fn event_of(&self, thread: ThreadId, seq: u32) -> Option<&Event> {
        let index = *self.per_thread.get(&thread)?.get(seq as usize)?;
        self.events.get(index)
    }

    /// Rough footprint used by the memory cap
    pub fn approx_bytes(&self) -> usize {
        self.events
            .iter()
            .map(|e| 96 + e.clock.heap_size())
            .sum::<usize>()
            + self.per_thread.len() * 64
    }

    /// Human-readable dump with function names resolved
    pub fn dump(&self, program: &Program) -> String {
        let mut out = String::new();
        for event in &self.events {
            let function = program.function_name(event.location.function);
            let _ = writeln!(out, "{event}    ; {function}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{FunctionId, SyncKey};

    fn loc(pc: usize) -> Location {
        Location::new(FunctionId(0), pc)
    }

    #[test]
    fn test_record_assigns_ids_and_sequences() {
        let mut trace = Trace::new();
        let a = trace.record(ThreadId(0), loc(0), EventKind::Local, VectorClock::new());
        let b = trace.record(ThreadId(1), loc(0), EventKind::Local, VectorClock::new());
        let c = trace.record(ThreadId(0), loc(1), EventKind::Unlock { mutex: SyncKey(1) }, VectorClock::new());
        assert!(a < b && b < c);
        assert_eq!(trace.event_of(ThreadId(0), 1).map(|e| e.id), Some(c));
        assert_eq!(trace.thread_positions(ThreadId(0)), vec![0, 2]);
        assert_eq!(trace.next_seq(ThreadId(1)), 1);
        assert_eq!(trace.threads(), vec![ThreadId(0), ThreadId(1)]);
    }

    #[test]
    fn test_access_sequences_are_per_variable() {
        let mut trace = Trace::new();
        assert_eq!(trace.next_load(GlobalId(0)), 0);
        assert_eq!(trace.next_load(GlobalId(0)), 1);
        assert_eq!(trace.next_load(GlobalId(1)), 0);
        assert_eq!(trace.next_store(GlobalId(0)), 0);
    }

    #[test]
    fn test_fork_shares_prefix() {
        let mut parent = Trace::new();
        parent.record(ThreadId(0), loc(0), EventKind::Local, VectorClock::new());
        let mut child = parent.clone();
        child.record(ThreadId(0), loc(1), EventKind::Local, VectorClock::new());
        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
        assert_eq!(child.get(0), parent.get(0));
    }
}
