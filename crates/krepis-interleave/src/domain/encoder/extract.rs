//! Prefix extraction from a satisfying model

use super::constraints::match_var_name;
use super::{Encoding, TraceEncoder};
use crate::domain::expr::Model;
use crate::domain::prefix::{Prefix, PrefixEntry};
use crate::domain::trace::{Event, EventKind};
use crate::domain::types::{SyncKey, ThreadId};
use std::collections::BTreeMap;

impl TraceEncoder<'_> {
    /// Order the kept events by the model and keep those up to the flip
    ///
    /// Local events carry no order variable; each one is placed with the
    /// next relevant event of its thread.
    pub(super) fn prefix_from_model(&self, encoding: &Encoding, model: &Model) -> Prefix {
        let order_of = |e: &Event| model.int(&Event::order_var_name(e.thread, e.seq));
        let limit = encoding.cut.and_then(|c| self.trace.get(c.position)).and_then(order_of);

        // Walk each thread backwards so locals see the next relevant order.
        let mut keyed: Vec<(i64, ThreadId, u32, usize)> = Vec::new();
        for thread in self.trace.threads() {
            let mut next: Option<i64> = None;
            for pos in self.trace.thread_positions(thread).into_iter().rev() {
                if !encoding.is_kept(pos) {
                    continue;
                }
                let Some(event) = self.trace.get(pos) else {
                    continue;
                };
                if event.is_relevant() {
                    next = order_of(event);
                }
                let Some(order) = next else {
                    continue;
                };
                let in_prefix = match (limit, encoding.cut) {
                    (Some(limit), Some(cut)) if thread == cut.thread => order <= limit,
                    (Some(limit), Some(_)) => order < limit,
                    _ => true,
                };
                if in_prefix {
                    keyed.push((order, thread, event.seq, pos));
                }
            }
        }
        keyed.sort_unstable();

        let entries = keyed
            .into_iter()
            .filter_map(|(_, _, _, pos)| self.trace.get(pos))
            .map(|event| {
                let mut entry = PrefixEntry::from_event(event);
                if let EventKind::Signal { cond, .. } = event.kind {
                    entry.wake = self.matched_waiter(encoding, model, cond, event);
                }
                entry
            })
            .collect();
        Prefix::new(entries)
    }

    /// Waiter whose match variable with `signal` is true in `model`
    fn matched_waiter(&self, encoding: &Encoding, model: &Model, cond: SyncKey, signal: &Event) -> Option<ThreadId> {
        let waits = self.index.waits.get(&cond)?;
        let matched: BTreeMap<u32, ThreadId> = waits
            .iter()
            .filter(|w| encoding.is_kept(w.wait) && w.thread != signal.thread)
            .filter_map(|w| self.trace.get(w.wait))
            .filter(|w| model.bool(&match_var_name(w, signal)) == Some(true))
            .map(|w| (w.seq, w.thread))
            .collect();
        matched.values().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::FlipOutcome;
    use super::*;
    use crate::domain::config::EngineConfig;
    use crate::domain::expr::Expr;
    use crate::domain::session::Session;
    use crate::domain::solver::SolverQuery;
    use crate::domain::trace::EventTag;
    use crate::infrastructure::solver::Z3Solver;

    const C: SyncKey = SyncKey(0x20);

    #[test]
    fn test_locals_travel_with_their_thread() {
        let (trace, assert) = counter(1, false);
        let program = program();
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), false);
        let FlipOutcome::Flippable(prefix) = encoder.flip(&SolverQuery::new(&solver, &session), assert) else {
            panic!("expected flippable");
        };
        // Every worker local sits between that worker's read and write.
        for t in [1, 2] {
            let steps: Vec<EventTag> = prefix
                .entries()
                .iter()
                .filter(|e| e.thread == ThreadId(t))
                .map(|e| e.kind)
                .collect();
            assert_eq!(steps, vec![EventTag::Read, EventTag::Local, EventTag::Write, EventTag::Exit]);
        }
    }

    #[test]
    fn test_signal_carries_matched_waiter() {
        // T1 waits on C under M, main signals it, T1 reacquires and checks x.
        let mut b = TraceBuilder::new();
        b.push(0, EventKind::ThreadCreate { child: ThreadId(1) });
        b.push(1, EventKind::Lock { mutex: M, reacquire: false });
        b.push(1, EventKind::Wait { cond: C, mutex: M });
        b.push(0, EventKind::Lock { mutex: M, reacquire: false });
        b.write(0, X, Expr::int(1));
        b.push(
            0,
            EventKind::Signal {
                cond: C,
                woken: Some(ThreadId(1)),
            },
        );
        b.push(0, EventKind::Unlock { mutex: M });
        b.push(1, EventKind::Lock { mutex: M, reacquire: true });
        let v = b.read(1, X);
        let branch = b.push(
            1,
            EventKind::Branch {
                cond: Expr::eq(&v, &Expr::int(1)),
                taken: true,
            },
        );
        b.push(1, EventKind::Unlock { mutex: M });
        b.push(1, EventKind::ThreadExit);
        b.push(0, EventKind::ThreadJoin { target: ThreadId(1) });
        b.push(0, EventKind::ThreadExit);

        let program = program();
        let encoder = TraceEncoder::new(&program, &b.trace, &Model::default(), false);
        let encoding = encoder.encode(encoder.cut_at(branch));
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let crate::domain::solver::SatResult::Sat(model) =
            SolverQuery::new(&solver, &session).check(&encoding.constraints).unwrap()
        else {
            panic!("expected sat");
        };
        let prefix = encoder.prefix_from_model(&encoding, &model);
        let signal = prefix.entries().iter().find(|e| e.kind == EventTag::Signal).unwrap();
        assert_eq!(signal.wake, Some(ThreadId(1)));
        assert_eq!(prefix.entries().last().unwrap().kind, EventTag::Branch);
    }
}
