//! Mutex Manager
//!
//! Tracks the owner of every mutex plus a *blocked pool* keyed by thread id.
//! A contended `lock` parks the caller in the pool; the thread is not
//! re-queued until the mutex is released, at which point the driver asks
//! [`MutexManager::try_lock_for_blocked_thread`] to finish the acquisition.
//!
//! The manager also keeps the vector clock of each mutex's last release so an
//! acquiring thread can merge it (release → acquire happens-before edge).

use crate::domain::types::{SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Result of a lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Mutex acquired immediately
    Acquired,
    /// Mutex held by someone (possibly the caller); thread parked
    Blocked,
}

/// Result of an unlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Mutex released
    Released,
    /// Caller did not hold the mutex; nothing changed
    NotHeld,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MutexRecord {
    owner: Option<ThreadId>,
    acquisitions: u64,
    release_clock: VectorClock,
}

/// Owner and blocked-pool bookkeeping for all mutexes of a state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutexManager {
    mutexes: BTreeMap<SyncKey, MutexRecord>,
    blocked: BTreeMap<ThreadId, SyncKey>,
}

impl MutexManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `mutex` for `tid`
    ///
    /// Re-locking a mutex the caller already owns blocks, like a default
    /// non-recursive mutex; deadlock detection reports it.
    pub fn lock(&mut self, mutex: SyncKey, tid: ThreadId) -> LockOutcome {
        let record = self.mutexes.entry(mutex).or_default();
        match record.owner {
            None => {
                record.owner = Some(tid);
                record.acquisitions += 1;
                self.blocked.remove(&tid);
                LockOutcome::Acquired
            }
            Some(_) => {
                self.blocked.insert(tid, mutex);
                LockOutcome::Blocked
            }
        }
    }

    /// Release `mutex`; a release by a non-owner only logs a warning
    pub fn unlock(&mut self, mutex: SyncKey, tid: ThreadId, clock: &VectorClock) -> UnlockOutcome {
        match self.mutexes.get_mut(&mutex) {
            Some(record) if record.owner == Some(tid) => {
                record.owner = None;
                record.release_clock.merge(clock);
                UnlockOutcome::Released
            }
            other => {
                let owner = other.and_then(|r| r.owner);
                warn!(%mutex, thread = %tid, ?owner, "unlock of a mutex not held by the caller");
                UnlockOutcome::NotHeld
            }
        }
    }

    /// Park `tid` in the blocked pool waiting for `mutex` (cond wake-up path)
    pub fn park(&mut self, tid: ThreadId, mutex: SyncKey) {
        self.mutexes.entry(mutex).or_default();
        self.blocked.insert(tid, mutex);
    }

    /// Re-attempt acquisition for a parked thread
    ///
    /// Returns `true` and removes the thread from the pool on success.
    pub fn try_lock_for_blocked_thread(&mut self, tid: ThreadId) -> bool {
        let Some(&mutex) = self.blocked.get(&tid) else {
            return false;
        };
        let record = self.mutexes.entry(mutex).or_default();
        if record.owner.is_some() {
            return false;
        }
        record.owner = Some(tid);
        record.acquisitions += 1;
        self.blocked.remove(&tid);
        true
    }

    /// Whether `mutex` is currently free
    pub fn is_available(&self, mutex: SyncKey) -> bool {
        self.mutexes.get(&mutex).map_or(true, |r| r.owner.is_none())
    }

    /// Whether `mutex` has ever been used
    pub fn is_defined(&self, mutex: SyncKey) -> bool {
        self.mutexes.contains_key(&mutex)
    }

    /// Current owner
    pub fn owner(&self, mutex: SyncKey) -> Option<ThreadId> {
        self.mutexes.get(&mutex).and_then(|r| r.owner)
    }

    /// Mutex a parked thread waits for
    pub fn blocked_on(&self, tid: ThreadId) -> Option<SyncKey> {
        self.blocked.get(&tid).copied()
    }

    /// Parked threads waiting for `mutex`, in id order
    pub fn waiters_of(&self, mutex: SyncKey) -> Vec<ThreadId> {
        self.blocked
            .iter()
            .filter(|(_, m)| **m == mutex)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Clock of the last release of `mutex`
    pub fn release_clock(&self, mutex: SyncKey) -> Option<&VectorClock> {
        self.mutexes.get(&mutex).map(|r| &r.release_clock)
    }

    /// Number of successful acquisitions of `mutex`
    pub fn acquisitions(&self, mutex: SyncKey) -> u64 {
        self.mutexes.get(&mutex).map_or(0, |r| r.acquisitions)
    }

    /// Mutexes currently held by `tid`
    pub fn held_by(&self, tid: ThreadId) -> Vec<SyncKey> {
        self.mutexes
            .iter()
            .filter(|(_, r)| r.owner == Some(tid))
            .map(|(k, _)| *k)
            .collect()
    }

    /// Find a wait-for cycle through `start` (parked thread → owner → …)
    ///
    /// Only mutex edges are followed; used to enrich deadlock diagnostics.
    pub fn wait_for_cycle(&self, start: ThreadId) -> Option<Vec<ThreadId>> {
        let mut path = vec![start];
        let mut seen = BTreeSet::from([start]);
        let mut current = start;
        loop {
            let mutex = self.blocked.get(&current)?;
            let owner = self.owner(*mutex)?;
            if owner == start {
                return Some(path);
            }
            if !seen.insert(owner) {
                return None;
            }
            path.push(owner);
            current = owner;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: SyncKey = SyncKey(0x100);
    const N: SyncKey = SyncKey(0x200);

    #[test]
    fn test_lock_unlock() {
        let mut mm = MutexManager::new();
        assert_eq!(mm.lock(M, ThreadId(0)), LockOutcome::Acquired);
        assert_eq!(mm.owner(M), Some(ThreadId(0)));
        assert!(!mm.is_available(M));
        assert_eq!(mm.unlock(M, ThreadId(0), &VectorClock::new()), UnlockOutcome::Released);
        assert!(mm.is_available(M));
        assert_eq!(mm.acquisitions(M), 1);
    }

    #[test]
    fn test_contended_lock_parks_thread() {
        let mut mm = MutexManager::new();
        mm.lock(M, ThreadId(0));
        assert_eq!(mm.lock(M, ThreadId(1)), LockOutcome::Blocked);
        assert_eq!(mm.blocked_on(ThreadId(1)), Some(M));
        assert_eq!(mm.waiters_of(M), vec![ThreadId(1)]);

        assert!(!mm.try_lock_for_blocked_thread(ThreadId(1)));
        mm.unlock(M, ThreadId(0), &VectorClock::new());
        assert!(mm.try_lock_for_blocked_thread(ThreadId(1)));
        assert_eq!(mm.owner(M), Some(ThreadId(1)));
        assert_eq!(mm.blocked_on(ThreadId(1)), None);
    }

    #[test]
    fn test_unlock_not_held_is_silent() {
        let mut mm = MutexManager::new();
        mm.lock(M, ThreadId(0));
        assert_eq!(mm.unlock(M, ThreadId(1), &VectorClock::new()), UnlockOutcome::NotHeld);
        assert_eq!(mm.owner(M), Some(ThreadId(0)));
        assert_eq!(mm.unlock(N, ThreadId(1), &VectorClock::new()), UnlockOutcome::NotHeld);
    }

    #[test]
    fn test_relock_by_owner_blocks() {
        let mut mm = MutexManager::new();
        mm.lock(M, ThreadId(0));
        assert_eq!(mm.lock(M, ThreadId(0)), LockOutcome::Blocked);
        assert_eq!(mm.wait_for_cycle(ThreadId(0)), Some(vec![ThreadId(0)]));
    }

    #[test]
    fn test_abba_cycle() {
        let mut mm = MutexManager::new();
        mm.lock(M, ThreadId(0));
        mm.lock(N, ThreadId(1));
        mm.lock(N, ThreadId(0));
        mm.lock(M, ThreadId(1));
        assert_eq!(mm.wait_for_cycle(ThreadId(0)), Some(vec![ThreadId(0), ThreadId(1)]));
        assert_eq!(mm.held_by(ThreadId(1)), vec![N]);
    }

    #[test]
    fn test_release_clock_accumulates() {
        let mut mm = MutexManager::new();
        let mut vc = VectorClock::new();
        vc.set(ThreadId(0), 3);
        mm.lock(M, ThreadId(0));
        mm.unlock(M, ThreadId(0), &vc);
        assert_eq!(mm.release_clock(M).map(|c| c.get(ThreadId(0))), Some(3));
    }
}
