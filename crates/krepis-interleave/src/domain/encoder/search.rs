//! Flip search over the branches of one trace

use super::TraceEncoder;
use crate::domain::error::SolverError;
use crate::domain::expr::Expr;
use crate::domain::prefix::Prefix;
use crate::domain::solver::{SatResult, SolverQuery};
use crate::domain::trace::Event;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of trying to flip one branch
#[derive(Debug, Clone)]
pub enum FlipOutcome {
    /// Some reordering takes the other arm; replay this prefix to reach it
    Flippable(Prefix),
    /// Every reordering takes the recorded arm
    Unflippable,
    /// The solver could not decide
    Undecided(String),
    /// The query exceeded its timeout
    TimedOut,
}

/// Outcome of a full search over one trace
#[derive(Debug, Clone, Default)]
pub struct FlipReport {
    /// Distinct prefixes found, in discovery order
    pub prefixes: Vec<Prefix>,
    /// Branches handed to the solver
    pub attempted: u64,
    /// Branches with a SAT flip query
    pub flippable: u64,
    /// Branches proven unflippable
    pub unsat: u64,
    /// Undecided queries
    pub unknown: u64,
    /// Timed-out queries
    pub timeouts: u64,
    /// Branches never attempted
    pub skipped: u64,
}

impl TraceEncoder<'_> {
    /// Try to reverse the branch (or assertion) at `position`
    ///
    /// The flip query is the encoding cut at the branch, the negated
    /// recorded outcome, and the recorded outcome of every other branch
    /// that must still precede it.
    pub fn flip(&self, query: &SolverQuery<'_>, position: usize) -> FlipOutcome {
        let Some(cut) = self.cut_at(position) else {
            return FlipOutcome::Unflippable;
        };
        let Some((cond, taken)) = self.trace.get(position).and_then(|e| e.branch_outcome()) else {
            return FlipOutcome::Unflippable;
        };

        let encoding = self.encode(Some(cut));
        let mut assertions = encoding.constraints.clone();
        assertions.push(self.outcome(cond, !taken));

        for &prior in &self.index.branches {
            if prior == position || !encoding.is_kept(prior) {
                continue;
            }
            let Some(event) = self.trace.get(prior) else {
                continue;
            };
            let Some((c, t)) = event.branch_outcome() else {
                continue;
            };
            let kept_outcome = self.outcome(c, t);
            if event.thread == cut.thread {
                assertions.push(kept_outcome);
            } else {
                // Only branches that end up before the flip are pinned.
                let before = Expr::lt(self.order(prior), self.order(position));
                assertions.push(Expr::implies(&before, &kept_outcome));
            }
        }

        match query.check(&assertions) {
            Ok(SatResult::Sat(model)) => FlipOutcome::Flippable(self.prefix_from_model(&encoding, &model)),
            Ok(SatResult::Unsat) => FlipOutcome::Unflippable,
            Ok(SatResult::Unknown(reason)) | Err(SolverError::Unknown(reason)) => FlipOutcome::Undecided(reason),
            Err(SolverError::Timeout(_)) => FlipOutcome::TimedOut,
            Err(SolverError::Backend(reason)) => FlipOutcome::Undecided(reason),
        }
    }

    /// Try every candidate branch of the trace
    ///
    /// With taint pruning the taint schedule decides which branches are
    /// tried and in what order. Without it, every branch whose condition
    /// mentions a read value is tried in trace order.
    pub fn search(&self, query: &SolverQuery<'_>, flip_untainted: bool) -> FlipReport {
        let mut report = FlipReport::default();
        let candidates = match &self.taint {
            Some(taint) => {
                let schedule = taint.schedule(&self.index.branches, flip_untainted);
                report.skipped = schedule.skipped as u64;
                schedule.ordered
            }
            None => {
                let read_vars: BTreeSet<Arc<str>> = self
                    .index
                    .reads
                    .values()
                    .flatten()
                    .filter_map(|&r| self.trace.get(r))
                    .map(|e| Event::value_var_name(e.thread, e.seq))
                    .collect();
                let mut ordered = Vec::new();
                for &b in &self.index.branches {
                    let depends = self
                        .trace
                        .get(b)
                        .and_then(|e| e.branch_outcome())
                        .is_some_and(|(c, _)| !self.concretize(c).vars().is_disjoint(&read_vars));
                    if depends {
                        ordered.push(b);
                    } else {
                        report.skipped += 1;
                    }
                }
                ordered
            }
        };

        for position in candidates {
            report.attempted += 1;
            let outcome = self.flip(query, position);
            debug!(position, outcome = ?outcome_name(&outcome), "flip attempted");
            match outcome {
                FlipOutcome::Flippable(prefix) => {
                    report.flippable += 1;
                    info!(position, entries = prefix.len(), "branch is flippable");
                    if !report.prefixes.iter().any(|p| p.same_steps(&prefix)) {
                        report.prefixes.push(prefix);
                    }
                }
                FlipOutcome::Unflippable => report.unsat += 1,
                FlipOutcome::Undecided(_) => report.unknown += 1,
                FlipOutcome::TimedOut => report.timeouts += 1,
            }
        }
        report
    }
}

fn outcome_name(outcome: &FlipOutcome) -> &'static str {
    match outcome {
        FlipOutcome::Flippable(_) => "flippable",
        FlipOutcome::Unflippable => "unflippable",
        FlipOutcome::Undecided(_) => "undecided",
        FlipOutcome::TimedOut => "timed_out",
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::domain::config::EngineConfig;
    use crate::domain::expr::Model;
    use crate::domain::session::Session;
    use crate::domain::trace::EventKind;
    use crate::domain::types::ThreadId;
    use crate::infrastructure::solver::Z3Solver;

    #[test]
    fn test_branch_on_constant_is_skipped_without_taint() {
        let mut b = TraceBuilder::new();
        b.push(
            0,
            EventKind::Branch {
                cond: Expr::tt(),
                taken: true,
            },
        );
        b.push(0, EventKind::ThreadExit);
        let program = program();
        let encoder = TraceEncoder::new(&program, &b.trace, &Model::default(), false);
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let report = encoder.search(&SolverQuery::new(&solver, &session), true);
        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_single_thread_branch_is_unflippable() {
        // main: x := 1; r = x; branch r == 1
        let mut b = TraceBuilder::new();
        b.write(0, X, Expr::int(1));
        let v = b.read(0, X);
        let branch = b.push(
            0,
            EventKind::Branch {
                cond: Expr::eq(&v, &Expr::int(1)),
                taken: true,
            },
        );
        b.push(0, EventKind::ThreadExit);
        let program = program();
        let encoder = TraceEncoder::new(&program, &b.trace, &Model::default(), false);
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let outcome = encoder.flip(&SolverQuery::new(&solver, &session), branch);
        assert!(matches!(outcome, FlipOutcome::Unflippable));
    }

    #[test]
    fn test_report_counts_racy_counter() {
        let (trace, _) = counter(1, false);
        let program = program();
        let encoder = TraceEncoder::new(&program, &trace, &Model::default(), false);
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let report = encoder.search(&SolverQuery::new(&solver, &session), true);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.flippable, 1);
        assert_eq!(report.unsat, 0);
        let last = report.prefixes[0].entries().last().unwrap();
        assert_eq!(last.thread, ThreadId::MAIN);
    }
}
