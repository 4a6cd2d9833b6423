//! Replay Prefixes
//!
//! A [`Prefix`] is an ordered slice of events extracted from a solver model.
//! Bound to a fresh execution through the guided scheduler, it forces the
//! driver to reproduce that interleaving up to the flipped branch, after
//! which exploration continues under the base policy.
//!
//! # Thread ids
//!
//! Ids are allocated in creation order, so a replay that creates threads in
//! a different order than the recorded run would see different ids. Each
//! create entry therefore remembers the child it spawned, and the replay
//! records `recorded child → actual child` as it passes that point.

use crate::domain::trace::{Event, EventKind, EventTag};
use crate::domain::types::{Location, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One expected step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefixEntry {
    /// Recorded thread id
    pub thread: ThreadId,
    /// Location about to execute
    pub location: Location,
    /// Kind of the recorded event
    pub kind: EventTag,
    /// Child spawned at a create point (recorded id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned: Option<ThreadId>,
    /// Waiter a signal should wake (recorded id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake: Option<ThreadId>,
}

impl PrefixEntry {
    /// Entry mirroring a recorded event
    pub fn from_event(event: &Event) -> Self {
        let spawned = match event.kind {
            EventKind::ThreadCreate { child } => Some(child),
            _ => None,
        };
        let wake = match event.kind {
            EventKind::Signal { woken, .. } => woken,
            _ => None,
        };
        Self {
            thread: event.thread,
            location: event.location,
            kind: event.kind.tag(),
            spawned,
            wake,
        }
    }
}

impl fmt::Display for PrefixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.thread, self.location, self.kind)
    }
}

/// Replayable event slice with a cursor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefix {
    entries: Vec<PrefixEntry>,
    #[serde(skip)]
    cursor: usize,
    #[serde(skip)]
    thread_map: BTreeMap<ThreadId, ThreadId>,
}

impl Prefix {
    /// Build from entries in replay order
    pub fn new(entries: Vec<PrefixEntry>) -> Self {
        Self {
            entries,
            cursor: 0,
            thread_map: BTreeMap::new(),
        }
    }

    /// All entries
    pub fn entries(&self) -> &[PrefixEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the prefix has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries consumed so far
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether every entry has been replayed
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }

    /// Next expected entry
    pub fn peek(&self) -> Option<&PrefixEntry> {
        self.entries.get(self.cursor)
    }

    /// Map a recorded thread id to the id used by this replay
    pub fn map_thread(&self, recorded: ThreadId) -> ThreadId {
        self.thread_map.get(&recorded).copied().unwrap_or(recorded)
    }

    /// Next expected (thread, location), with the thread id remapped
    pub fn expected(&self) -> Option<(ThreadId, Location)> {
        self.peek().map(|e| (self.map_thread(e.thread), e.location))
    }

    /// Location of the next remaining entry of `thread` (a replay id)
    ///
    /// Entries of threads that this replay has not created yet are skipped,
    /// since their recorded ids have no mapping to compare against.
    pub fn next_location_of(&self, thread: ThreadId) -> Option<Location> {
        let rest = self.entries.get(self.cursor..)?;
        let unborn: Vec<ThreadId> = rest.iter().filter_map(|e| e.spawned).collect();
        rest.iter()
            .filter(|e| !unborn.contains(&e.thread))
            .find(|e| self.map_thread(e.thread) == thread)
            .map(|e| e.location)
    }

    /// Wake hint of the next entry, remapped
    pub fn wake_hint(&self) -> Option<ThreadId> {
        self.peek().and_then(|e| e.wake).map(|t| self.map_thread(t))
    }

    /// Consume the next entry, recording the actual child of a create point
    pub fn advance(&mut self, spawned: Option<ThreadId>) {
        if let Some(entry) = self.entries.get(self.cursor) {
            if let (Some(recorded), Some(actual)) = (entry.spawned, spawned) {
                self.thread_map.insert(recorded, actual);
            }
            self.cursor += 1;
        }
    }

    /// Rewind for another replay
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.thread_map.clear();
    }

    /// Whether `other` replays the same steps
    pub fn same_steps(&self, other: &Prefix) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix[{}/{}]", self.cursor, self.entries.len())
    }
}
