//! Taint-Guided Reduction
//!
//! # Overview
//!
//! Encoding every read of every trace and flipping every branch is wasteful:
//! most accesses cannot influence any branch, and most branches cannot be
//! flipped by reordering. Two passes over a trace cut the problem down.
//!
//! ## Pass 1: related set
//!
//! ```text
//! branch ──cond──▶ reads ──may read──▶ writes ──value──▶ reads ──▶ …
//! ```
//!
//! The closure of a branch is every read its condition mentions, every
//! write those reads may observe, every read feeding those writes, and so
//! on. The union over all branches is the related set; read matching is
//! restricted to it. A branch whose closure touches a single thread cannot
//! change outcome under reordering and is skipped.
//!
//! ## Pass 2: taint
//!
//! Fork-join clocks (program order plus create, join and barrier edges,
//! deliberately ignoring locks) classify the accesses to each variable:
//!
//! | Pairs seen | Class |
//! |------------|-------|
//! | ordered only | `Serial` |
//! | concurrent only | `Parallel` |
//! | both | `Hybrid` |
//!
//! A read is a taint source when a conflicting write is concurrent with it,
//! or when two of its candidate writes are concurrent with each other. Taint
//! flows from a read into the writes of the same thread that use its value
//! and from there to every read that may observe those writes. Branches
//! whose conditions mention a tainted read are the potentially-tainted
//! schedule points (PTS) and are tried first.

use crate::domain::expr::Expr;
use crate::domain::trace::{Event, EventKind, Trace, TraceIndex};
use crate::domain::types::{GlobalId, SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Ordering class of the cross-thread accesses to one variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessClass {
    /// Every conflicting pair is ordered by fork-join edges
    Serial,
    /// Every conflicting pair is concurrent
    Parallel,
    /// Both kinds of pairs occur
    Hybrid,
}

/// Flip candidates in the order they should be tried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlipSchedule {
    /// Branch positions, tainted first
    pub ordered: Vec<usize>,
    /// Branches left out
    pub skipped: usize,
}

/// Result of both passes over one trace
#[derive(Debug, Clone, Default)]
pub struct TaintAnalysis {
    related_reads: BTreeSet<usize>,
    related_writes: BTreeSet<usize>,
    branch_threads: BTreeMap<usize, BTreeSet<ThreadId>>,
    classes: BTreeMap<GlobalId, AccessClass>,
    tainted_reads: BTreeSet<usize>,
    tainted_writes: BTreeSet<usize>,
    tainted_branches: BTreeSet<usize>,
}

/// Lookup from value-variable name to read position
fn read_vars(trace: &Trace, index: &TraceIndex) -> HashMap<Arc<str>, usize> {
    let mut vars = HashMap::new();
    for &pos in index.reads.values().flatten() {
        if let Some(e) = trace.get(pos) {
            vars.insert(Event::value_var_name(e.thread, e.seq), pos);
        }
    }
    vars
}

/// Read positions mentioned by `expr`
fn reads_in(expr: &Expr, vars: &HashMap<Arc<str>, usize>) -> Vec<usize> {
    expr.vars().iter().filter_map(|v| vars.get(v).copied()).collect()
}

impl TaintAnalysis {
    /// Run both passes
    pub fn analyze(trace: &Trace, index: &TraceIndex) -> Self {
        let vars = read_vars(trace, index);
        let mut analysis = Self::default();
        analysis.related(trace, index, &vars);

        let clocks = fork_join_clocks(trace, index);
        analysis.classify(trace, index, &clocks);
        analysis.taint(trace, index, &clocks, &vars);

        debug!(
            related_reads = analysis.related_reads.len(),
            tainted_reads = analysis.tainted_reads.len(),
            pts = analysis.pts(),
            "taint analysis"
        );
        analysis
    }

    // ━━━ Pass 1 ━━━

    fn related(&mut self, trace: &Trace, index: &TraceIndex, vars: &HashMap<Arc<str>, usize>) {
        for &branch in &index.branches {
            let Some((cond, _)) = trace.get(branch).and_then(Event::branch_outcome) else {
                continue;
            };
            let mut reads: BTreeSet<usize> = BTreeSet::new();
            let mut writes: BTreeSet<usize> = BTreeSet::new();
            let mut work: Vec<usize> = reads_in(cond, vars);

            while let Some(r) = work.pop() {
                if !reads.insert(r) {
                    continue;
                }
                for w in candidate_writes(trace, index, r) {
                    if writes.insert(w) {
                        if let Some(EventKind::Write { value, .. }) = trace.get(w).map(|e| &e.kind) {
                            work.extend(reads_in(value, vars));
                        }
                    }
                }
            }

            let threads: BTreeSet<ThreadId> = reads
                .iter()
                .chain(&writes)
                .filter_map(|&p| trace.get(p).map(|e| e.thread))
                .collect();
            self.related_reads.extend(&reads);
            self.related_writes.extend(&writes);
            self.branch_threads.insert(branch, threads);
        }
    }

    // ━━━ Pass 2 ━━━

    fn classify(&mut self, trace: &Trace, index: &TraceIndex, clocks: &[VectorClock]) {
        for global in index.variables() {
            let accesses: Vec<usize> = index
                .reads
                .get(&global)
                .into_iter()
                .chain(index.writes.get(&global))
                .flatten()
                .copied()
                .collect();
            let (mut serial, mut parallel) = (false, false);
            for (i, &a) in accesses.iter().enumerate() {
                for &b in &accesses[i + 1..] {
                    let (Some(ea), Some(eb)) = (trace.get(a), trace.get(b)) else {
                        continue;
                    };
                    let conflicting = matches!(ea.kind, EventKind::Write { .. }) || matches!(eb.kind, EventKind::Write { .. });
                    if ea.thread == eb.thread || !conflicting {
                        continue;
                    }
                    if clocks[a].concurrent(&clocks[b]) {
                        parallel = true;
                    } else {
                        serial = true;
                    }
                }
            }
            let class = match (serial, parallel) {
                (true, true) => AccessClass::Hybrid,
                (false, true) => AccessClass::Parallel,
                (true, false) => AccessClass::Serial,
                (false, false) => continue,
            };
            self.classes.insert(global, class);
        }
    }

    fn taint(&mut self, trace: &Trace, index: &TraceIndex, clocks: &[VectorClock], vars: &HashMap<Arc<str>, usize>) {
        let mut work: Vec<usize> = Vec::new();
        for &r in index.reads.values().flatten() {
            let candidates = candidate_writes(trace, index, r);
            let racy_write = candidates.iter().any(|&w| clocks[w].concurrent(&clocks[r]));
            let racy_pair = candidates
                .iter()
                .enumerate()
                .any(|(i, &a)| candidates[i + 1..].iter().any(|&b| clocks[a].concurrent(&clocks[b])));
            if racy_write || racy_pair {
                work.push(r);
            }
        }

        // Writes that use each read's value
        let mut users: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &w in index.writes.values().flatten() {
            if let Some(EventKind::Write { value, .. }) = trace.get(w).map(|e| &e.kind) {
                for r in reads_in(value, vars) {
                    users.entry(r).or_default().push(w);
                }
            }
        }

        while let Some(r) = work.pop() {
            if !self.tainted_reads.insert(r) {
                continue;
            }
            for &w in users.get(&r).into_iter().flatten() {
                if !self.tainted_writes.insert(w) {
                    continue;
                }
                let Some(global) = trace.get(w).and_then(Event::global) else {
                    continue;
                };
                for &reader in index.reads.get(&global).into_iter().flatten() {
                    if candidate_writes(trace, index, reader).contains(&w) {
                        work.push(reader);
                    }
                }
            }
        }

        for &b in &index.branches {
            let Some((cond, _)) = trace.get(b).and_then(Event::branch_outcome) else {
                continue;
            };
            if reads_in(cond, vars).iter().any(|r| self.tainted_reads.contains(r)) {
                self.tainted_branches.insert(b);
            }
        }
    }

    // ━━━ Queries ━━━

    /// Whether the read or write at `position` takes part in read matching
    pub fn is_related(&self, position: usize) -> bool {
        self.related_reads.contains(&position) || self.related_writes.contains(&position)
    }

    /// Whether the branch at `position` depends on more than one thread
    pub fn spans_threads(&self, position: usize) -> bool {
        self.branch_threads.get(&position).is_some_and(|t| t.len() > 1)
    }

    /// Whether the read at `position` is tainted
    pub fn is_tainted_read(&self, position: usize) -> bool {
        self.tainted_reads.contains(&position)
    }

    /// Whether the branch at `position` is a PTS
    pub fn is_tainted_branch(&self, position: usize) -> bool {
        self.tainted_branches.contains(&position)
    }

    /// Number of potentially-tainted schedule points
    pub fn pts(&self) -> usize {
        self.tainted_branches.len()
    }

    /// Access class of `global`, if it is shared
    pub fn class_of(&self, global: GlobalId) -> Option<AccessClass> {
        self.classes.get(&global).copied()
    }

    /// Order `branches` for the flip search
    pub fn schedule(&self, branches: &[usize], flip_untainted: bool) -> FlipSchedule {
        let mut tainted = Vec::new();
        let mut rest = Vec::new();
        let mut skipped = 0;
        for &b in branches {
            if !self.spans_threads(b) {
                skipped += 1;
            } else if self.is_tainted_branch(b) {
                tainted.push(b);
            } else if flip_untainted {
                rest.push(b);
            } else {
                skipped += 1;
            }
        }
        tainted.extend(rest);
        FlipSchedule {
            ordered: tainted,
            skipped,
        }
    }
}

/// Writes the read at `r` may observe: same variable, and not a later write
/// of the reading thread
pub(crate) fn candidate_writes(trace: &Trace, index: &TraceIndex, r: usize) -> Vec<usize> {
    let Some(read) = trace.get(r) else {
        return Vec::new();
    };
    let Some(global) = read.global() else {
        return Vec::new();
    };
    index
        .writes
        .get(&global)
        .into_iter()
        .flatten()
        .copied()
        .filter(|&w| trace.get(w).is_some_and(|e| e.thread != read.thread || e.seq < read.seq))
        .collect()
}

/// Per-event clocks over program order, create, join and barrier edges
pub(crate) fn fork_join_clocks(trace: &Trace, index: &TraceIndex) -> Vec<VectorClock> {
    let mut current: BTreeMap<ThreadId, VectorClock> = BTreeMap::new();
    let mut finals: BTreeMap<ThreadId, VectorClock> = BTreeMap::new();
    let mut arrived: BTreeMap<(SyncKey, u32), Vec<(ThreadId, VectorClock)>> = BTreeMap::new();
    let mut out = Vec::with_capacity(trace.len());

    for event in trace.events() {
        let t = event.thread;
        let clock = current.entry(t).or_default();
        clock.tick(t);
        match &event.kind {
            EventKind::ThreadJoin { target } => {
                if let Some(child) = finals.get(target) {
                    clock.merge(child);
                }
            }
            EventKind::ThreadCreate { child } => {
                let snapshot = clock.clone();
                current.insert(*child, snapshot);
            }
            EventKind::ThreadExit => {
                let snapshot = clock.clone();
                finals.insert(t, snapshot);
            }
            EventKind::BarrierWait { barrier, generation } => {
                let key = (*barrier, *generation);
                let snapshot = clock.clone();
                let group = arrived.entry(key).or_default();
                group.push((t, snapshot));
                let size = index.barrier_groups.get(&key).map_or(0, Vec::len);
                if group.len() == size {
                    let mut joined = VectorClock::new();
                    for (_, c) in group.iter() {
                        joined.merge(c);
                    }
                    let members: Vec<ThreadId> = group.iter().map(|(m, _)| *m).collect();
                    let own = current.get(&t).cloned().unwrap_or_default();
                    out.push(own);
                    for m in members {
                        if let Some(c) = current.get_mut(&m) {
                            c.merge(&joined);
                        }
                    }
                    continue;
                }
            }
            _ => {}
        }
        out.push(current.get(&t).cloned().unwrap_or_default());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{FunctionId, Location};

    const X: GlobalId = GlobalId(0);
    const Y: GlobalId = GlobalId(1);

    struct Builder {
        trace: Trace,
    }

    impl Builder {
        fn new() -> Self {
            Self { trace: Trace::new() }
        }

        fn push(&mut self, t: u32, kind: EventKind) -> usize {
            self.trace
                .record(ThreadId(t), Location::new(FunctionId(0), 0), kind, VectorClock::new());
            self.trace.len() - 1
        }

        fn read(&mut self, t: u32, global: GlobalId) -> (usize, Expr) {
            let seq = self.trace.next_seq(ThreadId(t));
            let access = self.trace.next_load(global);
            let pos = self.push(t, EventKind::Read { global, access });
            (pos, Expr::int_var(Event::value_var_name(ThreadId(t), seq)))
        }

        fn write(&mut self, t: u32, global: GlobalId, value: Expr) -> usize {
            let access = self.trace.next_store(global);
            self.push(t, EventKind::Write { global, access, value })
        }
    }

    /// T0 spawns T1 and T2, both increment x without a lock, T0 joins and
    /// branches on x.
    fn racy() -> (Trace, usize) {
        let mut b = Builder::new();
        b.push(0, EventKind::ThreadCreate { child: ThreadId(1) });
        b.push(0, EventKind::ThreadCreate { child: ThreadId(2) });
        let (_, v1) = b.read(1, X);
        b.write(1, X, Expr::add(&v1, &Expr::int(1)));
        b.push(1, EventKind::ThreadExit);
        let (_, v2) = b.read(2, X);
        b.write(2, X, Expr::add(&v2, &Expr::int(1)));
        b.push(2, EventKind::ThreadExit);
        b.push(0, EventKind::ThreadJoin { target: ThreadId(1) });
        b.push(0, EventKind::ThreadJoin { target: ThreadId(2) });
        let (_, v0) = b.read(0, X);
        let branch = b.push(
            0,
            EventKind::Branch {
                cond: Expr::eq(&v0, &Expr::int(2)),
                taken: true,
            },
        );
        (b.trace, branch)
    }

    #[test]
    fn test_racy_counter_is_tainted() {
        let (trace, branch) = racy();
        let index = TraceIndex::build(&trace);
        let taint = TaintAnalysis::analyze(&trace, &index);

        assert!(taint.spans_threads(branch));
        assert!(taint.is_tainted_branch(branch));
        assert_eq!(taint.pts(), 1);
        assert_eq!(taint.class_of(X), Some(AccessClass::Hybrid));
        let schedule = taint.schedule(&index.branches, false);
        assert_eq!(schedule.ordered, vec![branch]);
    }

    #[test]
    fn test_thread_local_branch_is_skipped() {
        let mut b = Builder::new();
        b.push(0, EventKind::ThreadCreate { child: ThreadId(1) });
        let (_, v) = b.read(1, Y);
        let branch = b.push(
            1,
            EventKind::Branch {
                cond: Expr::gt(&v, &Expr::int(0)),
                taken: false,
            },
        );
        let (read_x, _) = b.read(0, X);
        let index = TraceIndex::build(&b.trace);
        let taint = TaintAnalysis::analyze(&b.trace, &index);

        assert!(!taint.spans_threads(branch));
        assert!(!taint.is_related(read_x));
        let schedule = taint.schedule(&index.branches, true);
        assert!(schedule.ordered.is_empty());
        assert_eq!(schedule.skipped, 1);
    }

    #[test]
    fn test_barrier_orders_accesses() {
        let bar = SyncKey(9);
        let mut b = Builder::new();
        b.push(0, EventKind::ThreadCreate { child: ThreadId(1) });
        b.write(0, X, Expr::int(1));
        b.push(0, EventKind::BarrierWait { barrier: bar, generation: 0 });
        b.push(1, EventKind::BarrierWait { barrier: bar, generation: 0 });
        b.read(1, X);
        let index = TraceIndex::build(&b.trace);
        let clocks = fork_join_clocks(&b.trace, &index);
        assert!(clocks[1].happens_before(&clocks[4]));

        let taint = TaintAnalysis::analyze(&b.trace, &index);
        assert_eq!(taint.class_of(X), Some(AccessClass::Serial));
        assert!(!taint.is_tainted_read(4));
    }
}
