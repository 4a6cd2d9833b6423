//! Integration Test: Data-dependent Branches
//!
//! Branches over symbolic inputs must fork into both arms whatever the
//! arithmetic (products, masks, shifts) and branches over shared reads must
//! be flippable through the trace encoder, under every base scheduler.

mod common;

use common::SCHEDULERS;
use krepis_interleave::domain::error::RuntimeErrorKind;
use krepis_interleave::domain::expr::BinaryOp;
use krepis_interleave::domain::trace::EventKind;
use krepis_interleave::{Engine, Program, TerminationReason, Trace};
use std::collections::BTreeSet;

fn branch_outcome(trace: &Trace) -> Option<bool> {
    trace.events().find_map(|e| match e.kind {
        EventKind::Branch { taken, .. } => Some(taken),
        _ => None,
    })
}

/// Branch outcomes of every completed trace the engine retired
fn completed_outcomes(engine: &Engine) -> BTreeSet<bool> {
    engine
        .repository()
        .retired()
        .iter()
        .filter(|r| r.reason == TerminationReason::Completed)
        .filter_map(|r| branch_outcome(&r.trace))
        .collect()
}

fn assert_both_arms(program: &Program) {
    for scheduler in SCHEDULERS {
        let (engine, report) = common::explore(program.clone(), scheduler);
        assert!(report.bugs.is_empty(), "{scheduler:?}: {:?}", report.bugs);
        assert_eq!(report.stats.solver_timeouts, 0);
        assert_eq!(report.stats.states_explored, 2);
        assert_eq!(completed_outcomes(&engine), BTreeSet::from([false, true]), "{scheduler:?}");
    }
}

#[test]
fn test_square_branch_takes_both_arms() {
    // n * n == 4 holds for n = 2 and fails for n = 0
    assert_both_arms(&common::input_branch(BinaryOp::Mul, None, 4));
}

#[test]
fn test_mask_branch_takes_both_arms() {
    assert_both_arms(&common::input_branch(BinaryOp::BitAnd, Some(4), 4));
}

#[test]
fn test_shift_branch_takes_both_arms() {
    assert_both_arms(&common::input_branch(BinaryOp::Shl, Some(3), 40));
}

#[test]
fn test_unreachable_arm_is_not_forked() {
    // n * n == -1 has no 64-bit solution, so only the else arm runs
    for scheduler in SCHEDULERS {
        let (engine, report) = common::explore(common::input_branch(BinaryOp::Mul, None, -1), scheduler);
        assert!(report.bugs.is_empty(), "{:?}", report.bugs);
        assert_eq!(report.stats.states_explored, 1);
        assert_eq!(completed_outcomes(&engine), BTreeSet::from([false]));
    }
}

#[test]
fn test_parity_race_is_found_under_every_scheduler() {
    for scheduler in SCHEDULERS {
        let (_, report) = common::explore(common::parity_race(), scheduler);
        let found = report.bugs.iter().any(|b| {
            matches!(
                &b.reason,
                TerminationReason::RuntimeError(RuntimeErrorKind::AssertionFailed { message, .. })
                    if message == "worker saw an even value"
            )
        });
        assert!(found, "{scheduler:?}: {:?}", report.bugs);
        assert_eq!(report.stats.replay_mismatches, 0);
        assert_eq!(report.stats.solver_timeouts, 0);
    }
}

#[test]
fn test_counters_under_every_scheduler() {
    for scheduler in SCHEDULERS {
        let (_, locked) = common::explore(common::counter(2, 1, true), scheduler);
        assert!(!locked.has_bugs(), "{scheduler:?}: {:?}", locked.bugs);

        let (_, racy) = common::explore(common::counter(2, 1, false), scheduler);
        assert!(racy.has_bugs(), "{scheduler:?}");
        assert_eq!(racy.stats.replay_mismatches, 0);
    }
}
