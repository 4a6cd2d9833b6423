//! Preemptive policy: the most recently added thread runs first, so a newly
//! created or newly woken thread immediately preempts its waker.

use crate::domain::types::ThreadId;

/// LIFO ready set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preemptive {
    items: Vec<ThreadId>,
}

impl Preemptive {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently added thread
    #[inline]
    pub fn select_next_item(&self) -> Option<ThreadId> {
        self.items.last().copied()
    }

    /// Push `tid` on top, moving it there if already present
    pub fn add_item(&mut self, tid: ThreadId) {
        self.items.retain(|t| *t != tid);
        self.items.push(tid);
    }

    /// Remove `tid`
    pub fn remove_item(&mut self, tid: ThreadId) {
        self.items.retain(|t| *t != tid);
    }

    /// Move the top to the bottom
    pub fn re_schedule(&mut self) {
        if let Some(top) = self.items.pop() {
            self.items.insert(0, top);
        }
    }

    /// Whether nothing is ready
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `tid` is ready
    pub fn contains(&self, tid: ThreadId) -> bool {
        self.items.contains(&tid)
    }

    /// Ready threads, next to run first
    pub fn items(&self) -> Vec<ThreadId> {
        self.items.iter().rev().copied().collect()
    }
}
