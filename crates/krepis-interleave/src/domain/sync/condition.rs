//! Condition Variable Manager
//!
//! `wait` releases the caller's mutex and enqueues `(mutex, thread)`.
//! `signal` pops one waiter and hands it back to the mutex blocked pool; the
//! lock is *not* re-acquired atomically, so the woken thread must still win
//! the mutex when it is next scheduled. A signal with no waiters is lost.

use crate::domain::error::SyncError;
use crate::domain::sync::mutex::{MutexManager, UnlockOutcome};
use crate::domain::types::{SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Which waiter a `signal` wakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitQueuePolicy {
    /// Oldest waiter first
    #[default]
    Fifo,
    /// Lowest thread id first
    Priority,
    /// Waiter named by the replay hint, falling back to FIFO
    Guided,
}

impl WaitQueuePolicy {
    /// Get policy name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Priority => "priority",
            Self::Guided => "guided",
        }
    }
}

/// One queued waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    /// Waiting thread
    pub thread: ThreadId,
    /// Mutex to re-acquire
    pub mutex: SyncKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ConditionRecord {
    queue: VecDeque<Waiter>,
    signals: u64,
}

/// Wait queues of all condition variables of a state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionManager {
    policy: WaitQueuePolicy,
    conditions: BTreeMap<SyncKey, ConditionRecord>,
}

impl ConditionManager {
    /// Create a manager with the given wake-up policy
    pub fn new(policy: WaitQueuePolicy) -> Self {
        Self {
            policy,
            conditions: BTreeMap::new(),
        }
    }

    /// Active wake-up policy
    pub fn policy(&self) -> WaitQueuePolicy {
        self.policy
    }

    /// Block `tid` on `cond`, releasing `mutex`
    ///
    /// # Errors
    /// - `MutexUndefined`: `mutex` was never locked
    /// - `MutexNotOwned`: `tid` does not hold `mutex`
    pub fn wait(
        &mut self,
        cond: SyncKey,
        mutex: SyncKey,
        tid: ThreadId,
        mutexes: &mut MutexManager,
        clock: &VectorClock,
    ) -> Result<(), SyncError> {
        if !mutexes.is_defined(mutex) {
            return Err(SyncError::MutexUndefined { cond, mutex });
        }
        if mutexes.owner(mutex) != Some(tid) {
            return Err(SyncError::MutexNotOwned {
                cond,
                mutex,
                thread: tid,
            });
        }
        if mutexes.unlock(mutex, tid, clock) != UnlockOutcome::Released {
            return Err(SyncError::MutexNotOwned {
                cond,
                mutex,
                thread: tid,
            });
        }
        self.conditions
            .entry(cond)
            .or_default()
            .queue
            .push_back(Waiter { thread: tid, mutex });
        Ok(())
    }

    /// Wake one waiter of `cond`
    ///
    /// `hint` names the preferred waiter under the `Guided` policy.
    pub fn signal(&mut self, cond: SyncKey, hint: Option<ThreadId>) -> Option<Waiter> {
        let policy = self.policy;
        let record = self.conditions.entry(cond).or_default();
        record.signals += 1;
        let index = match policy {
            WaitQueuePolicy::Fifo => 0,
            WaitQueuePolicy::Priority => record
                .queue
                .iter()
                .enumerate()
                .min_by_key(|(_, w)| w.thread)
                .map_or(0, |(i, _)| i),
            WaitQueuePolicy::Guided => hint
                .and_then(|h| record.queue.iter().position(|w| w.thread == h))
                .unwrap_or(0),
        };
        record.queue.remove(index)
    }

    /// Wake every waiter of `cond`, in queue order
    pub fn broadcast(&mut self, cond: SyncKey) -> Vec<Waiter> {
        let record = self.conditions.entry(cond).or_default();
        record.signals += 1;
        record.queue.drain(..).collect()
    }

    /// Current waiters of `cond`
    pub fn waiters(&self, cond: SyncKey) -> Vec<Waiter> {
        self.conditions
            .get(&cond)
            .map(|r| r.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `tid` is queued on any condition
    pub fn is_waiting(&self, tid: ThreadId) -> bool {
        self.conditions
            .values()
            .any(|r| r.queue.iter().any(|w| w.thread == tid))
    }

    /// Signals and broadcasts issued on `cond`
    pub fn signal_count(&self, cond: SyncKey) -> u64 {
        self.conditions.get(&cond).map_or(0, |r| r.signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sync::mutex::LockOutcome;

    const C: SyncKey = SyncKey(0x10);
    const M: SyncKey = SyncKey(0x20);

    fn locked(tid: ThreadId) -> MutexManager {
        let mut mm = MutexManager::new();
        assert_eq!(mm.lock(M, tid), LockOutcome::Acquired);
        mm
    }

    #[test]
    fn test_wait_releases_mutex() {
        let mut cm = ConditionManager::new(WaitQueuePolicy::Fifo);
        let mut mm = locked(ThreadId(1));
        cm.wait(C, M, ThreadId(1), &mut mm, &VectorClock::new()).unwrap();
        assert!(mm.is_available(M));
        assert!(cm.is_waiting(ThreadId(1)));
    }

    #[test]
    fn test_wait_requires_ownership() {
        let mut cm = ConditionManager::new(WaitQueuePolicy::Fifo);
        let mut mm = MutexManager::new();
        assert_eq!(
            cm.wait(C, M, ThreadId(1), &mut mm, &VectorClock::new()),
            Err(SyncError::MutexUndefined { cond: C, mutex: M })
        );
        let mut mm = locked(ThreadId(0));
        assert!(matches!(
            cm.wait(C, M, ThreadId(1), &mut mm, &VectorClock::new()),
            Err(SyncError::MutexNotOwned { .. })
        ));
        assert!(!cm.is_waiting(ThreadId(1)));
    }

    #[test]
    fn test_signal_without_waiters_is_lost() {
        let mut cm = ConditionManager::new(WaitQueuePolicy::Fifo);
        assert_eq!(cm.signal(C, None), None);
        assert_eq!(cm.signal_count(C), 1);
    }

    #[test]
    fn test_fifo_and_priority_policies() {
        for (policy, expected) in [
            (WaitQueuePolicy::Fifo, ThreadId(3)),
            (WaitQueuePolicy::Priority, ThreadId(1)),
        ] {
            let mut cm = ConditionManager::new(policy);
            for t in [3, 1, 2] {
                let mut mm = locked(ThreadId(t));
                cm.wait(C, M, ThreadId(t), &mut mm, &VectorClock::new()).unwrap();
            }
            assert_eq!(cm.signal(C, None).map(|w| w.thread), Some(expected), "{}", policy.name());
        }
    }

    #[test]
    fn test_guided_policy_follows_hint() {
        let mut cm = ConditionManager::new(WaitQueuePolicy::Guided);
        for t in [1, 2] {
            let mut mm = locked(ThreadId(t));
            cm.wait(C, M, ThreadId(t), &mut mm, &VectorClock::new()).unwrap();
        }
        assert_eq!(cm.signal(C, Some(ThreadId(2))).map(|w| w.thread), Some(ThreadId(2)));
        assert_eq!(cm.signal(C, Some(ThreadId(9))).map(|w| w.thread), Some(ThreadId(1)));
    }

    #[test]
    fn test_broadcast_releases_all() {
        let mut cm = ConditionManager::new(WaitQueuePolicy::Fifo);
        for t in [1, 2, 3] {
            let mut mm = locked(ThreadId(t));
            cm.wait(C, M, ThreadId(t), &mut mm, &VectorClock::new()).unwrap();
        }
        let woken: Vec<_> = cm.broadcast(C).into_iter().map(|w| w.thread).collect();
        assert_eq!(woken, vec![ThreadId(1), ThreadId(2), ThreadId(3)]);
        assert!(cm.waiters(C).is_empty());
    }
}
