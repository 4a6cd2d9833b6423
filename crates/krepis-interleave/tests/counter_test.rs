//! Integration Test: Shared Counter
//!
//! With the mutex every interleaving produces the same total, so no branch
//! can be flipped. Without it the lost update is found by the flip search
//! and confirmed by replaying the emitted prefix.

mod common;

use krepis_interleave::domain::error::RuntimeErrorKind;
use krepis_interleave::{Engine, EngineConfig, TerminationReason};

#[test]
fn test_locked_counter_has_no_flippable_branch() {
    let mut engine = Engine::new(common::counter(2, 2, true), EngineConfig::default()).unwrap();
    let report = engine.explore().unwrap();

    assert!(!report.has_bugs(), "{:?}", report.bugs);
    assert_eq!(report.runs, 1);
    assert_eq!(report.stats.branches_flippable, 0);
    assert_eq!(report.stats.prefixes_queued, 0);
    assert_eq!(report.stats.branches_attempted, report.stats.branches_unsat);
}

#[test]
fn test_racy_counter_loses_an_update() {
    let mut engine = Engine::new(common::counter(2, 1, false), EngineConfig::default()).unwrap();
    let report = engine.explore().unwrap();

    assert!(report.stats.branches_flippable >= 1);
    assert!(report.stats.prefixes_queued >= 1);
    assert!(report.runs >= 2);
    let bug = report
        .bugs
        .iter()
        .find(|b| {
            matches!(
                b.reason,
                TerminationReason::RuntimeError(RuntimeErrorKind::AssertionFailed { .. })
            )
        })
        .expect("lost update reached");
    assert!(bug.run >= 2, "found by a replay run");
    assert_eq!(report.stats.replay_mismatches, 0);
}

#[test]
fn test_racy_counter_without_taint_pruning() {
    let config = EngineConfig {
        taint_pruning: false,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(common::counter(2, 1, false), config).unwrap();
    let report = engine.explore().unwrap();
    assert!(report.has_bugs());
    assert_eq!(report.stats.branches_skipped_taint, 0);
}

#[test]
fn test_run_budget_stops_exploration() {
    let config = EngineConfig {
        max_runs: 1,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(common::counter(2, 1, false), config).unwrap();
    let report = engine.explore().unwrap();
    assert_eq!(report.runs, 1);
    assert!(report.pending >= 1);
}
