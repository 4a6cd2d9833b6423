//! Arrival-order policy: the head of a FIFO runs until it blocks.

use crate::domain::types::ThreadId;
use std::collections::VecDeque;

/// FIFO ready queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrivalOrder {
    queue: VecDeque<ThreadId>,
}

impl ArrivalOrder {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Head of the queue (left in place)
    #[inline]
    pub fn select_next_item(&self) -> Option<ThreadId> {
        self.queue.front().copied()
    }

    /// Append `tid` unless already queued
    pub fn add_item(&mut self, tid: ThreadId) {
        if !self.queue.contains(&tid) {
            self.queue.push_back(tid);
        }
    }

    /// Remove `tid` wherever it is
    pub fn remove_item(&mut self, tid: ThreadId) {
        self.queue.retain(|t| *t != tid);
    }

    /// Move the head to the back
    pub fn re_schedule(&mut self) {
        self.queue.rotate_left(usize::from(!self.queue.is_empty()));
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether `tid` is queued
    pub fn contains(&self, tid: ThreadId) -> bool {
        self.queue.contains(&tid)
    }

    /// Queued threads, head first
    pub fn items(&self) -> Vec<ThreadId> {
        self.queue.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_stays_until_rotated() {
        let mut s = ArrivalOrder::new();
        s.add_item(ThreadId(0));
        s.add_item(ThreadId(1));
        s.add_item(ThreadId(0));
        assert_eq!(s.select_next_item(), Some(ThreadId(0)));
        assert_eq!(s.select_next_item(), Some(ThreadId(0)));
        s.re_schedule();
        assert_eq!(s.items(), vec![ThreadId(1), ThreadId(0)]);
        s.remove_item(ThreadId(1));
        assert_eq!(s.select_next_item(), Some(ThreadId(0)));
        s.remove_item(ThreadId(0));
        assert!(s.is_empty());
        s.re_schedule();
        assert_eq!(s.select_next_item(), None);
    }
}
