//! Run Repository
//!
//! Bookkeeping that outlives a single run:
//!
//! ```text
//!  flip search ──add_prefix──► ┌──────────────────────┐ ──get_next_prefix──► next run
//!                              │ queue   (FIFO)       │
//!                              │ queued  (ever seen)  │
//!  completed trace ──────────► │ tested  (signatures) │
//!   is_current_trace_untested  │ retired (bounded)    │ ◄──retire_trace── driver
//!                              └──────────────────────┘
//! ```
//!
//! Every method takes `&self`: the queue and the retired list sit behind
//! `parking_lot` mutexes and the signature and prefix sets are `dashmap`
//! maps. A prefix is queued at most once per exploration, so a schedule
//! that already ran is never run again.

use crate::domain::error::TerminationReason;
use crate::domain::prefix::{Prefix, PrefixEntry};
use crate::domain::trace::{Trace, TraceSignature};
use crate::domain::types::StateId;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// A trace kept after its state retired
#[derive(Debug, Clone)]
pub struct RetiredTrace {
    /// Run that produced it (1-based)
    pub run: u64,
    /// State that recorded it
    pub state: StateId,
    /// Why the state retired
    pub reason: TerminationReason,
    /// Branch-outcome signature
    pub signature: TraceSignature,
    /// The trace itself
    pub trace: Trace,
}

/// Pending prefixes plus the signatures of traces already tested
#[derive(Debug)]
pub struct RunRepository {
    queue: Mutex<VecDeque<Prefix>>,
    queued: DashSet<Vec<PrefixEntry>>,
    tested: DashMap<TraceSignature, u64>,
    retired: Mutex<VecDeque<RetiredTrace>>,
    max_retained: usize,
}

impl RunRepository {
    /// Create a repository keeping at most `max_retained` retired traces
    pub fn new(max_retained: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            queued: DashSet::new(),
            tested: DashMap::new(),
            retired: Mutex::new(VecDeque::new()),
            max_retained,
        }
    }

    /// Pop the oldest pending prefix
    pub fn get_next_prefix(&self) -> Option<Prefix> {
        self.queue.lock().pop_front()
    }

    /// Queue `prefix` unless the same steps were queued before, whether
    /// still pending or already executed
    ///
    /// Returns whether it was queued.
    pub fn add_prefix(&self, prefix: Prefix) -> bool {
        if !self.queued.insert(prefix.entries().to_vec()) {
            debug!(entries = prefix.len(), "prefix already queued");
            return false;
        }
        self.queue.lock().push_back(prefix);
        true
    }

    /// Distinct prefixes queued so far
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Number of pending prefixes
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no prefix is pending
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Record `trace` as tested, returning `true` the first time its
    /// signature is seen
    pub fn is_current_trace_untested(&self, trace: &Trace) -> bool {
        let signature = TraceSignature::of(trace);
        let mut first = false;
        self.tested
            .entry(signature)
            .and_modify(|hits| *hits += 1)
            .or_insert_with(|| {
                first = true;
                1
            });
        first
    }

    /// Number of distinct traces tested
    pub fn tested(&self) -> usize {
        self.tested.len()
    }

    /// Keep a finished trace, evicting the oldest beyond the bound
    pub fn retire_trace(&self, run: u64, state: StateId, reason: TerminationReason, trace: Trace) {
        if self.max_retained == 0 {
            return;
        }
        let mut retired = self.retired.lock();
        while retired.len() >= self.max_retained {
            retired.pop_front();
        }
        retired.push_back(RetiredTrace {
            run,
            state,
            reason,
            signature: TraceSignature::of(&trace),
            trace,
        });
    }

    /// Retired traces, oldest first
    pub fn retired(&self) -> Vec<RetiredTrace> {
        self.retired.lock().iter().cloned().collect()
    }
}

impl Default for RunRepository {
    fn default() -> Self {
        Self::new(64)
    }
}
