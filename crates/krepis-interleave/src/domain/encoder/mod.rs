//! Trace Encoder
//!
//! # Overview
//!
//! A concrete trace fixes one interleaving. The encoder turns it into a
//! constraint problem whose models are all the causally consistent
//! reorderings of the same events, then asks, branch by branch, whether
//! some reordering makes the branch go the other way.
//!
//! ```text
//!            ┌──────────────────────── encode(cut) ───────────────────────┐
//!  Trace ──▶ │ program order · fork/join · mutual exclusion · wait/signal │
//!            │ barriers · read matching (value = matched write's value)   │
//!            └────────────────────────────┬───────────────────────────────┘
//!                                         │ + ¬outcome(b) + outcomes before b
//!                                         ▼
//!                                  ConstraintSolver
//!                                         │ SAT
//!                                         ▼
//!                              Prefix (events ordered ≤ o_b)
//! ```
//!
//! # Variables
//!
//! | Name | Sort | Meaning |
//! |------|------|---------|
//! | `o{t}_{s}` | Int | position of event `s` of thread `t` in the new order |
//! | `v{t}_{s}` | Int | value returned by read `s` of thread `t` |
//! | `m{..}` | Bool | a given signal wakes a given wait |
//! | `o_final` | Int | upper bound of every order variable |
//!
//! Symbolic inputs are replaced by the values the run actually used, so the
//! only freedom left is the schedule.
//!
//! # Cuts
//!
//! Flipping branch `b` of thread `t` encodes the trace *cut* at `b`: events
//! of `t` after `b`, and every thread `t` spawns after `b`, are dropped.
//! Constraints that mention a dropped event are relaxed to "happens after
//! `b`" since nothing is known about what follows the flip.

mod constraints;
mod extract;
mod search;

pub use search::{FlipOutcome, FlipReport};

use crate::domain::expr::{Expr, Model};
use crate::domain::program::Program;
use crate::domain::taint::TaintAnalysis;
use crate::domain::trace::{Event, EventKind, Trace, TraceIndex};
use crate::domain::types::ThreadId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Name of the upper bound on every order variable
pub const FINAL_ORDER_VAR: &str = "o_final";

/// Flip point of a cut encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cut {
    /// Position of the flipped branch in the trace
    pub position: usize,
    /// Its thread
    pub thread: ThreadId,
    /// Its thread-local sequence number
    pub seq: u32,
}

/// Constraints of one encoding
#[derive(Debug, Clone)]
pub struct Encoding {
    /// Conjunction to assert
    pub constraints: Vec<Expr>,
    /// Which trace positions take part
    pub kept: Vec<bool>,
    /// Flip point, if any
    pub cut: Option<Cut>,
}

impl Encoding {
    /// Number of constraints
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether there are no constraints
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Whether the event at `position` takes part
    pub fn is_kept(&self, position: usize) -> bool {
        self.kept.get(position).copied().unwrap_or(false)
    }
}

/// Encoder over one completed trace
pub struct TraceEncoder<'a> {
    program: &'a Program,
    trace: &'a Trace,
    index: TraceIndex,
    taint: Option<TaintAnalysis>,
    concrete: HashMap<Arc<str>, Expr>,
    orders: Vec<Expr>,
}

impl<'a> TraceEncoder<'a> {
    /// Prepare an encoder
    ///
    /// `inputs` assigns the symbolic inputs the run used. With
    /// `taint_pruning`, read matching is restricted to the branch-related
    /// set and single-thread branches are never flipped.
    pub fn new(program: &'a Program, trace: &'a Trace, inputs: &Model, taint_pruning: bool) -> Self {
        let index = TraceIndex::build(trace);
        let taint = taint_pruning.then(|| TaintAnalysis::analyze(trace, &index));
        let orders = trace.events().map(Event::order_var).collect();
        Self {
            program,
            trace,
            index,
            taint,
            concrete: inputs.as_substitution(),
            orders,
        }
    }

    /// Derived trace maps
    pub fn index(&self) -> &TraceIndex {
        &self.index
    }

    /// Taint analysis, when pruning is enabled
    pub fn taint(&self) -> Option<&TaintAnalysis> {
        self.taint.as_ref()
    }

    /// The encoded trace
    pub fn trace(&self) -> &Trace {
        self.trace
    }

    /// Replace symbolic inputs by their concrete values
    pub fn concretize(&self, e: &Expr) -> Expr {
        if self.concrete.is_empty() {
            e.clone()
        } else {
            e.substitute(&self.concrete)
        }
    }

    /// Cut at the branch or assertion at `position`
    pub fn cut_at(&self, position: usize) -> Option<Cut> {
        let event = self.trace.get(position)?;
        event.is_branch().then_some(Cut {
            position,
            thread: event.thread,
            seq: event.seq,
        })
    }

    fn order(&self, position: usize) -> &Expr {
        &self.orders[position]
    }

    /// Positions that survive `cut`
    fn kept_events(&self, cut: Option<Cut>) -> Vec<bool> {
        let mut kept = vec![true; self.trace.len()];
        let Some(cut) = cut else {
            return kept;
        };
        let mut dropped_threads: BTreeSet<ThreadId> = BTreeSet::new();
        for (pos, event) in self.trace.events().enumerate() {
            let dropped = dropped_threads.contains(&event.thread) || (event.thread == cut.thread && event.seq > cut.seq);
            if dropped {
                kept[pos] = false;
                if let EventKind::ThreadCreate { child } = event.kind {
                    dropped_threads.insert(child);
                }
            }
        }
        kept
    }

    /// Whether the read or write at `position` takes part in read matching
    fn in_matching(&self, position: usize) -> bool {
        self.taint.as_ref().map_or(true, |t| t.is_related(position))
    }

    /// `outcome` of a branch condition as a constraint
    fn outcome(&self, cond: &Expr, outcome: bool) -> Expr {
        let cond = self.concretize(cond).to_bool();
        if outcome {
            cond
        } else {
            Expr::not(&cond)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-built traces shared by the encoder tests and the bench helpers.

    use crate::domain::expr::Expr;
    use crate::domain::program::{Program, ProgramBuilder};
    use crate::domain::trace::{Event, EventKind, Trace};
    use crate::domain::types::{FunctionId, GlobalId, Location, SyncKey, ThreadId};
    use crate::domain::vector_clock::VectorClock;

    pub const X: GlobalId = GlobalId(0);
    pub const M: SyncKey = SyncKey(0x10);

    pub fn program() -> Program {
        let mut p = ProgramBuilder::new();
        p.global("x", 0);
        let main = p.declare("main", 0);
        p.define(main, |f| f.ret(None));
        p.build(main).unwrap()
    }

    pub struct TraceBuilder {
        pub trace: Trace,
        pcs: Vec<usize>,
    }

    impl TraceBuilder {
        pub fn new() -> Self {
            Self {
                trace: Trace::new(),
                pcs: vec![0; 8],
            }
        }

        pub fn push(&mut self, t: u32, kind: EventKind) -> usize {
            let pc = self.pcs[t as usize];
            self.pcs[t as usize] += 1;
            self.trace
                .record(ThreadId(t), Location::new(FunctionId(t), pc), kind, VectorClock::new());
            self.trace.len() - 1
        }

        pub fn read(&mut self, t: u32, global: GlobalId) -> Expr {
            let seq = self.trace.next_seq(ThreadId(t));
            let access = self.trace.next_load(global);
            self.push(t, EventKind::Read { global, access });
            Expr::int_var(Event::value_var_name(ThreadId(t), seq))
        }

        pub fn write(&mut self, t: u32, global: GlobalId, value: Expr) -> usize {
            let access = self.trace.next_store(global);
            self.push(t, EventKind::Write { global, access, value })
        }

        pub fn increment(&mut self, t: u32, locked: bool) {
            if locked {
                self.push(t, EventKind::Lock { mutex: M, reacquire: false });
            }
            let v = self.read(t, X);
            self.push(t, EventKind::Local);
            self.write(t, X, Expr::add(&v, &Expr::int(1)));
            if locked {
                self.push(t, EventKind::Unlock { mutex: M });
            }
        }
    }

    /// Main spawns two workers that each increment `x` `n` times, joins
    /// them and asserts `x == 2n`. The recorded run is sequential.
    pub fn counter(n: usize, locked: bool) -> (Trace, usize) {
        let mut b = TraceBuilder::new();
        b.push(0, EventKind::ThreadCreate { child: ThreadId(1) });
        b.push(0, EventKind::ThreadCreate { child: ThreadId(2) });
        for t in [1, 2] {
            for _ in 0..n {
                b.increment(t, locked);
            }
            b.push(t, EventKind::ThreadExit);
        }
        b.push(0, EventKind::ThreadJoin { target: ThreadId(1) });
        b.push(0, EventKind::ThreadJoin { target: ThreadId(2) });
        let v = b.read(0, X);
        let expected = i64::try_from(2 * n).unwrap();
        let assert = b.push(
            0,
            EventKind::Assert {
                cond: Expr::eq(&v, &Expr::int(expected)),
                holds: true,
            },
        );
        b.push(0, EventKind::ThreadExit);
        (b.trace, assert)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::domain::config::EngineConfig;
    use crate::domain::session::Session;
    use crate::domain::solver::{SatResult, SolverQuery};
    use crate::domain::trace::EventTag;
    use crate::infrastructure::solver::Z3Solver;

    fn solve(encoding: &Encoding) -> Model {
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        match SolverQuery::new(&solver, &session).check(&encoding.constraints).unwrap() {
            SatResult::Sat(m) => m,
            other => panic!("expected sat, got {other:?}"),
        }
    }

    fn order_of(model: &Model, trace: &Trace, pos: usize) -> i64 {
        let e = trace.get(pos).unwrap();
        model.int(&Event::order_var_name(e.thread, e.seq)).unwrap()
    }

    #[test]
    fn test_recorded_run_is_a_model() {
        let (trace, _) = counter(2, true);
        let program = program();
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), false);
        let model = solve(&encoder.encode(None));

        // Program order within each thread
        for t in trace.threads() {
            let rel = encoder.index().relevant_of(t);
            for w in rel.windows(2) {
                assert!(order_of(&model, &trace, w[0]) < order_of(&model, &trace, w[1]));
            }
        }
    }

    #[test]
    fn test_mutual_exclusion_holds_in_model() {
        let (trace, _) = counter(2, true);
        let program = program();
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), false);
        let model = solve(&encoder.encode(None));

        let intervals = &encoder.index().lock_intervals[&M];
        for a in intervals {
            for b in intervals {
                if a.thread == b.thread {
                    continue;
                }
                let (la, ua) = (order_of(&model, &trace, a.lock), order_of(&model, &trace, a.unlock.unwrap()));
                let (lb, ub) = (order_of(&model, &trace, b.lock), order_of(&model, &trace, b.unlock.unwrap()));
                assert!(ua < lb || ub < la, "critical sections overlap");
            }
        }
    }

    #[test]
    fn test_read_matching_is_valid() {
        let (trace, _) = counter(2, false);
        let program = program();
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), false);
        let model = solve(&encoder.encode(None));

        let writes = &encoder.index().writes[&X];
        for &r in &encoder.index().reads[&X] {
            let read = trace.get(r).unwrap();
            let or = order_of(&model, &trace, r);
            let latest = writes
                .iter()
                .copied()
                .filter(|&w| order_of(&model, &trace, w) < or)
                .max_by_key(|&w| order_of(&model, &trace, w));
            let expected = match latest {
                None => 0,
                Some(w) => match &trace.get(w).unwrap().kind {
                    EventKind::Write { value, .. } => value.eval(&model).as_int(),
                    _ => unreachable!(),
                },
            };
            assert_eq!(read.value_var().eval(&model).as_int(), expected);
        }
    }

    #[test]
    fn test_locked_counter_assert_is_unflippable() {
        let (trace, assert) = counter(2, true);
        let program = program();
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let query = SolverQuery::new(&solver, &session);
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), true);
        assert!(matches!(encoder.flip(&query, assert), FlipOutcome::Unflippable));
    }

    #[test]
    fn test_racy_counter_assert_is_flippable() {
        let (trace, assert) = counter(1, false);
        let program = program();
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let query = SolverQuery::new(&solver, &session);
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), true);

        let FlipOutcome::Flippable(prefix) = encoder.flip(&query, assert) else {
            panic!("expected a flippable assertion");
        };
        let last = prefix.entries().last().unwrap();
        assert_eq!(last.thread, ThreadId::MAIN);
        assert_eq!(last.kind, EventTag::Assert);
        // Both workers must read before either writes.
        let tags: Vec<(ThreadId, EventTag)> = prefix.entries().iter().map(|e| (e.thread, e.kind)).collect();
        let first_write = tags.iter().position(|(_, k)| *k == EventTag::Write).unwrap();
        let reads_before = tags[..first_write].iter().filter(|(_, k)| *k == EventTag::Read).count();
        assert_eq!(reads_before, 2);

        let report = encoder.search(&query, true);
        assert_eq!(report.flippable, 1);
        assert_eq!(report.prefixes.len(), 1);
    }

    #[test]
    fn test_cut_drops_later_events_and_children() {
        let (trace, _) = counter(1, false);
        let program = program();
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), false);
        // Cut right after main's first create: worker 2 is spawned later.
        let first_create = 0;
        let cut = Cut {
            position: first_create,
            thread: ThreadId::MAIN,
            seq: 0,
        };
        let kept = encoder.kept_events(Some(cut));
        for (pos, e) in trace.events().enumerate() {
            let expect = match e.thread.0 {
                0 => e.seq == 0,
                1 => true,
                _ => false,
            };
            assert_eq!(kept[pos], expect, "position {pos}");
        }
    }
}
