//! Derived Trace Maps
//!
//! A single pass over a [`Trace`] collects everything the encoder and the
//! taint analysis look up by key. All positions are global indices into the
//! trace.
//!
//! # Lock intervals
//!
//! ```text
//! T1:  lock(m) ─── wait(c, m) ··· lock(m, reacquire) ─── unlock(m)
//!      └─ interval 1 ──┘           └──── interval 2 ───────┘
//! ```
//!
//! A condition wait closes the current interval and its re-acquisition opens
//! a new one. An interval that is never closed extends to the thread's end.

use super::{EventKind, Trace};
use crate::domain::types::{GlobalId, SyncKey, ThreadId};
use std::collections::BTreeMap;

/// One critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockInterval {
    /// Owner
    pub thread: ThreadId,
    /// Position of the acquiring event
    pub lock: usize,
    /// Position of the releasing unlock or wait
    pub unlock: Option<usize>,
}

/// One condition wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRecord {
    /// Waiting thread
    pub thread: ThreadId,
    /// Position of the wait event
    pub wait: usize,
    /// Mutex released by the wait
    pub mutex: SyncKey,
    /// Position of the signal or broadcast that woke it
    pub woken_by: Option<usize>,
    /// Position of the re-acquisition
    pub reacquire: Option<usize>,
}

/// One signal or broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord {
    /// Signalling thread
    pub thread: ThreadId,
    /// Position of the event
    pub position: usize,
    /// Broadcast rather than signal
    pub broadcast: bool,
    /// Waiters woken in this run
    pub woken: Vec<ThreadId>,
}

/// Lookup tables over one trace
#[derive(Debug, Clone, Default)]
pub struct TraceIndex {
    /// Reads per variable, in execution order
    pub reads: BTreeMap<GlobalId, Vec<usize>>,
    /// Writes per variable, in execution order
    pub writes: BTreeMap<GlobalId, Vec<usize>>,
    /// Critical sections per mutex
    pub lock_intervals: BTreeMap<SyncKey, Vec<LockInterval>>,
    /// Waits per condition
    pub waits: BTreeMap<SyncKey, Vec<WaitRecord>>,
    /// Signals and broadcasts per condition
    pub signals: BTreeMap<SyncKey, Vec<SignalRecord>>,
    /// Arrivals per (barrier, generation)
    pub barrier_groups: BTreeMap<(SyncKey, u32), Vec<usize>>,
    /// Thread creations: (position, child)
    pub creates: Vec<(usize, ThreadId)>,
    /// Successful joins: (position, target)
    pub joins: Vec<(usize, ThreadId)>,
    /// Branch and assertion positions, in execution order
    pub branches: Vec<usize>,
    /// Relevant (non-local) positions per thread, in program order
    pub relevant: BTreeMap<ThreadId, Vec<usize>>,
}

impl TraceIndex {
    /// Build the index in one pass
    pub fn build(trace: &Trace) -> Self {
        let mut index = Self::default();
        let mut open_locks: BTreeMap<(SyncKey, ThreadId), usize> = BTreeMap::new();
        // thread → (cond, slot in waits[cond]) of its pending wait
        let mut open_waits: BTreeMap<ThreadId, (SyncKey, usize)> = BTreeMap::new();
        // thread → (cond, slot) of a woken wait awaiting re-acquisition
        let mut pending_reacquire: BTreeMap<ThreadId, (SyncKey, usize)> = BTreeMap::new();

        for (pos, event) in trace.events().enumerate() {
            let thread = event.thread;
            if event.is_relevant() {
                index.relevant.entry(thread).or_default().push(pos);
            }
            match &event.kind {
                EventKind::Local | EventKind::ThreadExit | EventKind::BarrierInit { .. } => {}
                EventKind::Read { global, .. } => index.reads.entry(*global).or_default().push(pos),
                EventKind::Write { global, .. } => index.writes.entry(*global).or_default().push(pos),
                EventKind::Lock { mutex, reacquire } => {
                    if *reacquire {
                        if let Some((cond, slot)) = pending_reacquire.remove(&thread) {
                            if let Some(w) = index.waits.get_mut(&cond).and_then(|v| v.get_mut(slot)) {
                                w.reacquire = Some(pos);
                            }
                        }
                    }
                    open_locks.insert((*mutex, thread), pos);
                }
                EventKind::Unlock { mutex } => {
                    if let Some(lock) = open_locks.remove(&(*mutex, thread)) {
                        index.lock_intervals.entry(*mutex).or_default().push(LockInterval {
                            thread,
                            lock,
                            unlock: Some(pos),
                        });
                    }
                }
                EventKind::Wait { cond, mutex } => {
                    if let Some(lock) = open_locks.remove(&(*mutex, thread)) {
                        index.lock_intervals.entry(*mutex).or_default().push(LockInterval {
                            thread,
                            lock,
                            unlock: Some(pos),
                        });
                    }
                    let waits = index.waits.entry(*cond).or_default();
                    open_waits.insert(thread, (*cond, waits.len()));
                    waits.push(WaitRecord {
                        thread,
                        wait: pos,
                        mutex: *mutex,
                        woken_by: None,
                        reacquire: None,
                    });
                }
                EventKind::Signal { cond, woken } => {
                    let woken: Vec<ThreadId> = woken.iter().copied().collect();
                    index.mark_woken(&woken, pos, &mut open_waits, &mut pending_reacquire);
                    index.signals.entry(*cond).or_default().push(SignalRecord {
                        thread,
                        position: pos,
                        broadcast: false,
                        woken,
                    });
                }
                EventKind::Broadcast { cond, woken } => {
                    index.mark_woken(woken, pos, &mut open_waits, &mut pending_reacquire);
                    index.signals.entry(*cond).or_default().push(SignalRecord {
                        thread,
                        position: pos,
                        broadcast: true,
                        woken: woken.clone(),
                    });
                }
                EventKind::BarrierWait { barrier, generation } => {
                    index.barrier_groups.entry((*barrier, *generation)).or_default().push(pos);
                }
                EventKind::ThreadCreate { child } => index.creates.push((pos, *child)),
                EventKind::ThreadJoin { target } => index.joins.push((pos, *target)),
                EventKind::Branch { .. } | EventKind::Assert { .. } => index.branches.push(pos),
            }
        }

        for ((mutex, thread), lock) in open_locks {
            index.lock_intervals.entry(mutex).or_default().push(LockInterval {
                thread,
                lock,
                unlock: None,
            });
        }
        for intervals in index.lock_intervals.values_mut() {
            intervals.sort_by_key(|i| i.lock);
        }
        index
    }

    fn mark_woken(
        &mut self,
        woken: &[ThreadId],
        pos: usize,
        open_waits: &mut BTreeMap<ThreadId, (SyncKey, usize)>,
        pending_reacquire: &mut BTreeMap<ThreadId, (SyncKey, usize)>,
    ) {
        for t in woken {
            if let Some((cond, slot)) = open_waits.remove(t) {
                if let Some(w) = self.waits.get_mut(&cond).and_then(|v| v.get_mut(slot)) {
                    w.woken_by = Some(pos);
                }
                pending_reacquire.insert(*t, (cond, slot));
            }
        }
    }

    /// Relevant positions of `thread`
    pub fn relevant_of(&self, thread: ThreadId) -> &[usize] {
        self.relevant.get(&thread).map_or(&[], Vec::as_slice)
    }

    /// Variables touched by at least one read or write
    pub fn variables(&self) -> Vec<GlobalId> {
        let mut vars: Vec<GlobalId> = self.reads.keys().chain(self.writes.keys()).copied().collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expr::Expr;
    use crate::domain::types::{FunctionId, Location};
    use crate::domain::vector_clock::VectorClock;

    const M: SyncKey = SyncKey(1);
    const C: SyncKey = SyncKey(2);

    fn rec(trace: &mut Trace, t: u32, kind: EventKind) {
        trace.record(ThreadId(t), Location::new(FunctionId(0), 0), kind, VectorClock::new());
    }

    #[test]
    fn test_lock_intervals_split_at_wait() {
        let mut trace = Trace::new();
        rec(&mut trace, 1, EventKind::Lock { mutex: M, reacquire: false });
        rec(&mut trace, 1, EventKind::Wait { cond: C, mutex: M });
        rec(&mut trace, 2, EventKind::Lock { mutex: M, reacquire: false });
        rec(&mut trace, 2, EventKind::Signal { cond: C, woken: Some(ThreadId(1)) });
        rec(&mut trace, 2, EventKind::Unlock { mutex: M });
        rec(&mut trace, 1, EventKind::Lock { mutex: M, reacquire: true });
        rec(&mut trace, 1, EventKind::Unlock { mutex: M });

        let index = TraceIndex::build(&trace);
        let intervals = &index.lock_intervals[&M];
        assert_eq!(intervals.len(), 3);
        assert_eq!((intervals[0].lock, intervals[0].unlock), (0, Some(1)));
        assert_eq!((intervals[1].lock, intervals[1].unlock), (2, Some(4)));
        assert_eq!((intervals[2].lock, intervals[2].unlock), (5, Some(6)));

        let wait = index.waits[&C][0];
        assert_eq!(wait.woken_by, Some(3));
        assert_eq!(wait.reacquire, Some(5));
        assert_eq!(index.signals[&C][0].woken, vec![ThreadId(1)]);
    }

    #[test]
    fn test_unclosed_interval_and_unwoken_wait() {
        let mut trace = Trace::new();
        rec(&mut trace, 0, EventKind::Signal { cond: C, woken: None });
        rec(&mut trace, 1, EventKind::Lock { mutex: M, reacquire: false });
        rec(&mut trace, 1, EventKind::Wait { cond: C, mutex: M });
        rec(&mut trace, 0, EventKind::Lock { mutex: M, reacquire: false });
        let index = TraceIndex::build(&trace);
        assert_eq!(index.waits[&C][0].woken_by, None);
        assert!(index.lock_intervals[&M].iter().any(|i| i.unlock.is_none() && i.thread == ThreadId(0)));
    }

    #[test]
    fn test_accesses_and_groups() {
        let mut trace = Trace::new();
        rec(&mut trace, 0, EventKind::ThreadCreate { child: ThreadId(1) });
        rec(&mut trace, 1, EventKind::Read { global: GlobalId(0), access: 0 });
        rec(&mut trace, 1, EventKind::Write { global: GlobalId(0), access: 0, value: Expr::int(1) });
        rec(&mut trace, 1, EventKind::BarrierWait { barrier: SyncKey(9), generation: 0 });
        rec(&mut trace, 0, EventKind::BarrierWait { barrier: SyncKey(9), generation: 0 });
        rec(&mut trace, 0, EventKind::Branch { cond: Expr::tt(), taken: true });
        rec(&mut trace, 0, EventKind::ThreadJoin { target: ThreadId(1) });
        rec(&mut trace, 0, EventKind::Local);

        let index = TraceIndex::build(&trace);
        assert_eq!(index.reads[&GlobalId(0)], vec![1]);
        assert_eq!(index.writes[&GlobalId(0)], vec![2]);
        assert_eq!(index.barrier_groups[&(SyncKey(9), 0)], vec![3, 4]);
        assert_eq!(index.creates, vec![(0, ThreadId(1))]);
        assert_eq!(index.joins, vec![(6, ThreadId(1))]);
        assert_eq!(index.branches, vec![5]);
        assert_eq!(index.relevant_of(ThreadId(0)), &[0, 4, 5, 6]);
        assert_eq!(index.variables(), vec![GlobalId(0)]);
    }
}
