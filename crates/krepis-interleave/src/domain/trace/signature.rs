//! Branch-Outcome Signatures
//!
//! Two traces that took the same branch outcomes at the same locations in
//! every thread are the same test for the repository's purposes, whatever
//! the interleaving of their local events.

use super::Trace;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Hash of the per-thread (location, outcome) branch sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceSignature(pub u64);

impl TraceSignature {
    /// Compute the signature of `trace`
    pub fn of(trace: &Trace) -> Self {
        let mut hasher = DefaultHasher::new();
        for thread in trace.threads() {
            thread.hash(&mut hasher);
            for event in trace.thread_events(thread) {
                if let Some((_, outcome)) = event.branch_outcome() {
                    event.location.hash(&mut hasher);
                    outcome.hash(&mut hasher);
                }
            }
            // separator so outcomes cannot shift between threads
            u8::MAX.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

impl fmt::Display for TraceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
