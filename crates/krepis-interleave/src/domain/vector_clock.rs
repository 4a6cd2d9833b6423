//! Vector Clock Implementation
//!
//! Vector clocks track causality (the happens-before relation) between the
//! synchronization events of simulated threads.
//!
//! # Theory
//!
//! Given events e1 and e2:
//! - e1 happens-before e2 (e1 → e2) if VC(e1) < VC(e2)
//! - e1 and e2 are concurrent if neither happens-before the other
//!
//! # Implementation
//!
//! The clock is growable: missing components read as zero and the backing
//! vector is extended on first write. The thread bound is enforced at
//! allocation time by the execution state (`EngineConfig::max_threads`), not
//! by the width of this type.

use crate::domain::types::ThreadId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Vector clock for tracking causality
///
/// # Representation
///
/// - `clock[i]` = this thread's view of thread i's logical time
///
/// ```text
/// Thread 0: [5, 2, 3]  (T0 has done 5 sync ops, last saw T1 at 2, T2 at 3)
/// Thread 1: [4, 7]     (T1 has done 7 sync ops, never heard of T2)
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VectorClock {
    clocks: Vec<u64>,
}

impl VectorClock {
    /// Create a new vector clock initialized to zero
    #[inline]
    pub fn new() -> Self {
        Self { clocks: Vec::new() }
    }

    /// Create a zeroed clock with room for `threads` components
    pub fn with_capacity(threads: usize) -> Self {
        Self {
            clocks: Vec::with_capacity(threads),
        }
    }

    fn slot(&mut self, idx: usize) -> &mut u64 {
        if idx >= self.clocks.len() {
            self.clocks.resize(idx + 1, 0);
        }
        &mut self.clocks[idx]
    }

    /// Increment the component of `thread`
    ///
    /// ```rust
    /// # use krepis_interleave::domain::vector_clock::VectorClock;
    /// # use krepis_interleave::domain::types::ThreadId;
    /// let mut vc = VectorClock::new();
    /// vc.tick(ThreadId(1));
    /// vc.tick(ThreadId(1));
    /// assert_eq!(vc.get(ThreadId(1)), 2);
    /// assert_eq!(vc.get(ThreadId(0)), 0);
    /// ```
    #[inline]
    pub fn tick(&mut self, thread: ThreadId) {
        let slot = self.slot(thread.as_index());
        *slot = slot.saturating_add(1);
    }

    /// Merge with another vector clock (element-wise max)
    ///
    /// ```text
    /// self:  [3, 1, 2]
    /// other: [2, 5]
    /// result:[3, 5, 2]
    /// ```
    pub fn merge(&mut self, other: &VectorClock) {
        if other.clocks.len() > self.clocks.len() {
            self.clocks.resize(other.clocks.len(), 0);
        }
        for (mine, theirs) in self.clocks.iter_mut().zip(&other.clocks) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// Component-wise `<=`
    pub fn le(&self, other: &VectorClock) -> bool {
        let width = self.clocks.len().max(other.clocks.len());
        (0..width).all(|i| self.at(i) <= other.at(i))
    }

    /// Check if this clock strictly happens-before another
    ///
    /// VC1 < VC2 iff for all i VC1[i] <= VC2[i] and for some j VC1[j] < VC2[j].
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        self.le(other) && self != other
    }

    /// Check if two clocks are concurrent (neither happens-before the other)
    #[inline]
    pub fn concurrent(&self, other: &VectorClock) -> bool {
        !self.happens_before(other) && !other.happens_before(self) && self != other
    }

    /// Partial-order comparison
    pub fn partial_cmp_clock(&self, other: &VectorClock) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.le(other) {
            Some(Ordering::Less)
        } else if other.le(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    #[inline]
    fn at(&self, idx: usize) -> u64 {
        self.clocks.get(idx).copied().unwrap_or(0)
    }

    /// Get the component of `thread`
    #[inline]
    pub fn get(&self, thread: ThreadId) -> u64 {
        self.at(thread.as_index())
    }

    /// Set the component of `thread` (used in testing)
    #[inline]
    pub fn set(&mut self, thread: ThreadId, value: u64) {
        *self.slot(thread.as_index()) = value;
    }

    /// Number of stored components
    pub fn width(&self) -> usize {
        self.clocks.len()
    }

    /// Approximate heap footprint in bytes
    pub fn heap_size(&self) -> usize {
        self.clocks.capacity() * std::mem::size_of::<u64>()
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        let width = self.clocks.len().max(other.clocks.len());
        (0..width).all(|i| self.at(i) == other.at(i))
    }
}

impl Eq for VectorClock {}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VC[")?;
        for (i, &val) in self.clocks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", val)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_clock_init() {
        let vc = VectorClock::new();
        for i in 0..16 {
            assert_eq!(vc.get(ThreadId(i)), 0);
        }
        assert_eq!(vc.width(), 0);
    }

    #[test]
    fn test_tick_grows() {
        let mut vc = VectorClock::new();
        vc.tick(ThreadId(0));
        assert_eq!(vc.get(ThreadId(0)), 1);
        vc.tick(ThreadId(20));
        assert_eq!(vc.get(ThreadId(20)), 1);
        assert_eq!(vc.width(), 21);
    }

    #[test]
    fn test_merge() {
        let mut vc1 = VectorClock::new();
        vc1.set(ThreadId(0), 3);
        vc1.set(ThreadId(1), 1);
        vc1.set(ThreadId(2), 2);

        let mut vc2 = VectorClock::new();
        vc2.set(ThreadId(0), 2);
        vc2.set(ThreadId(1), 5);

        vc1.merge(&vc2);

        assert_eq!(vc1.get(ThreadId(0)), 3);
        assert_eq!(vc1.get(ThreadId(1)), 5);
        assert_eq!(vc1.get(ThreadId(2)), 2);
    }

    #[test]
    fn test_happens_before() {
        let mut vc1 = VectorClock::new();
        vc1.set(ThreadId(0), 1);
        vc1.set(ThreadId(1), 2);

        let mut vc2 = VectorClock::new();
        vc2.set(ThreadId(0), 2);
        vc2.set(ThreadId(1), 3);
        vc2.set(ThreadId(2), 4);

        assert!(vc1.happens_before(&vc2));
        assert!(!vc2.happens_before(&vc1));
        assert!(!vc1.happens_before(&vc1.clone()));
    }

    #[test]
    fn test_concurrent() {
        let mut vc1 = VectorClock::new();
        vc1.set(ThreadId(0), 1);
        vc1.set(ThreadId(1), 3);

        let mut vc2 = VectorClock::new();
        vc2.set(ThreadId(0), 2);
        vc2.set(ThreadId(1), 1);

        assert!(vc1.concurrent(&vc2));
        assert_eq!(vc1.partial_cmp_clock(&vc2), None);
    }

    #[test]
    fn test_trailing_zeros_equal() {
        let mut vc1 = VectorClock::new();
        vc1.set(ThreadId(0), 1);
        let mut vc2 = vc1.clone();
        vc2.set(ThreadId(5), 0);
        assert_eq!(vc1, vc2);
        assert!(!vc1.concurrent(&vc2));
    }
}
