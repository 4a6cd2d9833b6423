//! Constraint groups of one encoding

use super::{Cut, Encoding, TraceEncoder, FINAL_ORDER_VAR};
use crate::domain::expr::Expr;
use crate::domain::trace::{Event, EventKind, LockInterval};
use crate::domain::types::ThreadId;
use std::sync::Arc;
use tracing::trace;

/// End of a critical section under a cut
#[derive(Debug, Clone, Copy)]
enum SectionEnd {
    At(usize),
    AfterCut,
    Never,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    thread: ThreadId,
    lock: usize,
    end: SectionEnd,
}

/// Name of the match variable of (wait, signal)
pub(super) fn match_var_name(wait: &Event, signal: &Event) -> Arc<str> {
    Arc::from(format!("m{}_{}_{}_{}", wait.thread.0, wait.seq, signal.thread.0, signal.seq))
}

struct Builder<'e, 'a> {
    enc: &'e TraceEncoder<'a>,
    kept: &'e [bool],
    cut: Option<Cut>,
    out: Vec<Expr>,
}

impl TraceEncoder<'_> {
    /// Encode the trace, optionally cut at a branch
    pub fn encode(&self, cut: Option<Cut>) -> Encoding {
        let kept = self.kept_events(cut);
        let out = {
            let mut b = Builder {
                enc: self,
                kept: &kept,
                cut,
                out: Vec::new(),
            };
            b.program_order();
            b.fork_join();
            b.mutual_exclusion();
            b.wait_signal();
            b.barriers();
            b.read_matching();
            b.out
        };
        trace!(constraints = out.len(), cut = ?cut.map(|c| c.position), "trace encoded");
        Encoding {
            constraints: out,
            kept,
            cut,
        }
    }
}

impl Builder<'_, '_> {
    fn o(&self, position: usize) -> &Expr {
        self.enc.order(position)
    }

    fn lt(&self, a: usize, b: usize) -> Expr {
        Expr::lt(self.o(a), self.o(b))
    }

    fn is_kept(&self, position: usize) -> bool {
        self.kept.get(position).copied().unwrap_or(false)
    }

    fn event(&self, position: usize) -> Option<&Event> {
        self.enc.trace.get(position)
    }

    /// `o_b < o(position)`, or `false` without a cut
    fn after_cut(&self, position: usize) -> Expr {
        match self.cut {
            Some(cut) => Expr::lt(self.o(cut.position), self.o(position)),
            None => Expr::ff(),
        }
    }

    fn kept_relevant(&self, thread: ThreadId) -> Vec<usize> {
        self.enc
            .index
            .relevant_of(thread)
            .iter()
            .copied()
            .filter(|&p| self.is_kept(p))
            .collect()
    }

    /// Whether every event of `thread` survives the cut
    fn thread_complete(&self, thread: ThreadId) -> bool {
        self.enc.index.relevant_of(thread).iter().all(|&p| self.is_kept(p))
    }

    // ━━━ (a) order ━━━

    fn program_order(&mut self) {
        let final_var = Expr::int_var(FINAL_ORDER_VAR);
        let threads: Vec<ThreadId> = self.enc.index.relevant.keys().copied().collect();
        for thread in threads {
            let positions = self.kept_relevant(thread);
            let (Some(&first), Some(&last)) = (positions.first(), positions.last()) else {
                continue;
            };
            self.out.push(Expr::gt(self.o(first), &Expr::int(0)));
            for w in positions.windows(2) {
                let c = self.lt(w[0], w[1]);
                self.out.push(c);
            }
            self.out.push(Expr::lt(self.o(last), &final_var));
        }
    }

    fn fork_join(&mut self) {
        for &(pos, child) in &self.enc.index.creates {
            if !self.is_kept(pos) {
                continue;
            }
            if let Some(&first) = self.kept_relevant(child).first() {
                let c = self.lt(pos, first);
                self.out.push(c);
            }
        }
        for &(pos, target) in &self.enc.index.joins {
            if !self.is_kept(pos) {
                continue;
            }
            let c = if self.thread_complete(target) {
                match self.kept_relevant(target).last() {
                    Some(&last) => self.lt(last, pos),
                    None => continue,
                }
            } else {
                self.after_cut(pos)
            };
            self.out.push(c);
        }
    }

    // ━━━ (b) mutual exclusion ━━━

    fn section(&self, interval: &LockInterval) -> Option<Section> {
        if !self.is_kept(interval.lock) {
            return None;
        }
        let cut_thread = self.cut.is_some_and(|c| c.thread == interval.thread);
        let end = match interval.unlock {
            Some(u) if self.is_kept(u) => SectionEnd::At(u),
            Some(_) => SectionEnd::AfterCut,
            None if cut_thread => SectionEnd::AfterCut,
            None => SectionEnd::Never,
        };
        Some(Section {
            thread: interval.thread,
            lock: interval.lock,
            end,
        })
    }

    /// `first` releases before `second` acquires
    fn released_before(&self, first: &Section, second: &Section) -> Expr {
        match first.end {
            SectionEnd::At(u) => self.lt(u, second.lock),
            SectionEnd::AfterCut => self.after_cut(second.lock),
            SectionEnd::Never => Expr::ff(),
        }
    }

    fn mutual_exclusion(&mut self) {
        for intervals in self.enc.index.lock_intervals.values() {
            let sections: Vec<Section> = intervals.iter().filter_map(|i| self.section(i)).collect();
            for (i, a) in sections.iter().enumerate() {
                for b in &sections[i + 1..] {
                    if a.thread == b.thread {
                        continue;
                    }
                    let c = Expr::or2(&self.released_before(a, b), &self.released_before(b, a));
                    self.out.push(c);
                }
            }
        }
    }

    // ━━━ (c) wait / signal ━━━

    fn wait_signal(&mut self) {
        for (cond, waits) in &self.enc.index.waits {
            let signals = self.enc.index.signals.get(cond).map_or(&[][..], Vec::as_slice);
            let waits: Vec<_> = waits.iter().filter(|w| self.is_kept(w.wait)).collect();
            let signals: Vec<_> = signals.iter().filter(|s| self.is_kept(s.position)).collect();

            // (wait index, signal index, match var)
            let mut matches: Vec<(usize, usize, Expr)> = Vec::new();
            for (wi, w) in waits.iter().enumerate() {
                for (si, s) in signals.iter().enumerate() {
                    if w.thread == s.thread {
                        continue;
                    }
                    let (Some(we), Some(se)) = (self.event(w.wait), self.event(s.position)) else {
                        continue;
                    };
                    let m = Expr::bool_var(match_var_name(we, se));
                    let mut order = vec![self.lt(w.wait, s.position)];
                    if let Some(r) = w.reacquire.filter(|&r| self.is_kept(r)) {
                        order.push(self.lt(s.position, r));
                    }
                    self.out.push(Expr::implies(&m, &Expr::and(order)));
                    matches.push((wi, si, m));
                }
            }

            // A signal wakes at most one waiter; a wait is woken at most once.
            for (i, (wa, sa, ma)) in matches.iter().enumerate() {
                for (wb, sb, mb) in &matches[i + 1..] {
                    let same_signal = sa == sb && !signals[*sa].broadcast;
                    if same_signal || wa == wb {
                        self.out.push(Expr::or2(&Expr::not(ma), &Expr::not(mb)));
                    }
                }
            }

            for (wi, w) in waits.iter().enumerate() {
                let Some(woken_by) = w.woken_by else {
                    continue;
                };
                let mut options: Vec<Expr> = matches
                    .iter()
                    .filter(|(x, _, _)| *x == wi)
                    .map(|(_, _, m)| m.clone())
                    .collect();
                if !self.is_kept(woken_by) {
                    options.push(self.after_cut(w.reacquire.unwrap_or(w.wait)));
                }
                self.out.push(Expr::or(options));
            }
        }
    }

    // ━━━ (d) barriers ━━━

    fn barriers(&mut self) {
        for arrivals in self.enc.index.barrier_groups.values() {
            let kept: Vec<usize> = arrivals.iter().copied().filter(|&p| self.is_kept(p)).collect();
            let Some(&head) = kept.first() else {
                continue;
            };
            for &other in &kept[1..] {
                self.out.push(Expr::eq(self.o(head), self.o(other)));
            }
            if kept.len() < arrivals.len() {
                let c = self.after_cut(head);
                self.out.push(c);
            }
        }
    }

    // ━━━ (e) read matching ━━━

    fn read_matching(&mut self) {
        let program = self.enc.program;
        for (global, reads) in &self.enc.index.reads {
            let writes: Vec<usize> = self
                .enc
                .index
                .writes
                .get(global)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&w| self.is_kept(w) && self.enc.in_matching(w))
                .collect();
            let future_writes = self.cut.is_some()
                && self
                    .enc
                    .index
                    .writes
                    .get(global)
                    .is_some_and(|all| all.iter().any(|&w| !self.is_kept(w)));
            let initial = program.global(*global).map_or(0, |g| g.initial);

            for &r in reads {
                if !self.is_kept(r) || !self.enc.in_matching(r) {
                    continue;
                }
                let Some(read) = self.event(r) else {
                    continue;
                };
                let value = read.value_var();

                // A write of the reading thread shadows everything before it.
                let own_latest = writes
                    .iter()
                    .copied()
                    .filter(|&w| self.event(w).is_some_and(|e| e.thread == read.thread && e.seq < read.seq))
                    .last();
                let candidates: Vec<usize> = writes
                    .iter()
                    .copied()
                    .filter(|&w| {
                        self.event(w).is_some_and(|e| {
                            if e.thread == read.thread {
                                Some(w) == own_latest
                            } else {
                                true
                            }
                        })
                    })
                    .collect();

                let mut options = Vec::with_capacity(candidates.len() + 2);
                if own_latest.is_none() {
                    let mut init: Vec<Expr> = candidates.iter().map(|&w| self.lt(r, w)).collect();
                    init.push(Expr::eq(&value, &Expr::int(initial)));
                    options.push(Expr::and(init));
                }
                for &w in &candidates {
                    let Some(EventKind::Write { value: written, .. }) = self.event(w).map(|e| &e.kind) else {
                        continue;
                    };
                    let mut parts = vec![self.lt(w, r)];
                    for &other in &candidates {
                        if other != w {
                            parts.push(Expr::or2(&self.lt(other, w), &self.lt(r, other)));
                        }
                    }
                    parts.push(Expr::eq(&value, &self.enc.concretize(written)));
                    options.push(Expr::and(parts));
                }
                if future_writes && self.cut.is_some_and(|c| c.thread != read.thread) {
                    options.push(self.after_cut(r));
                }
                self.out.push(Expr::or(options));
            }
        }
    }
}
