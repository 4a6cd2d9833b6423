//! Integration Test: Prefix Replay
//!
//! A guided run over a recorded prefix reproduces the recorded steps.

mod common;

use krepis_interleave::domain::executor::Executor;
use krepis_interleave::domain::prefix::{Prefix, PrefixEntry};
use krepis_interleave::domain::session::Session;
use krepis_interleave::{Engine, EngineConfig, TerminationReason, Z3Solver};

fn steps(trace: &krepis_interleave::Trace) -> Vec<PrefixEntry> {
    trace.events().map(PrefixEntry::from_event).collect()
}

#[test]
fn test_replay_reproduces_prefix() {
    let program = common::counter(3, 2, true);
    let session = Session::new(EngineConfig::default());
    let solver = Z3Solver::new();

    let first = Executor::new(&program, &session, &solver).run(None).unwrap();
    let recorded = steps(&first.retired[0].trace);
    for cut in [1, recorded.len() / 2, recorded.len()] {
        let prefix = Prefix::new(recorded[..cut].to_vec());
        let replay = Executor::new(&program, &session, &solver).run(Some(prefix)).unwrap();
        let state = &replay.retired[0];
        assert_eq!(state.reason, TerminationReason::Completed);
        assert_eq!(steps(&state.trace)[..cut], recorded[..cut]);
    }
    assert_eq!(session.stats().replay_mismatches, 0);
}

#[test]
fn test_emitted_prefixes_replay_without_mismatch() {
    let program = common::counter(2, 1, false);
    let mut engine = Engine::new(program, EngineConfig::default()).unwrap();
    engine.explore().unwrap();

    let retired = engine.repository().retired();
    let replayed: Vec<_> = retired.iter().filter(|t| t.run > 1).collect();
    assert!(!replayed.is_empty());
    assert!(replayed
        .iter()
        .all(|t| !matches!(t.reason, TerminationReason::ReplayMismatch { .. })));
}

#[test]
fn test_engine_replay_of_foreign_prefix_mismatches() {
    let mut engine = Engine::new(common::spawner(2), EngineConfig::default()).unwrap();
    let other = common::counter(2, 1, false);
    let session = Session::new(EngineConfig::default());
    let solver = Z3Solver::new();
    let run = Executor::new(&other, &session, &solver).run(None).unwrap();
    // Worker reads where the spawner's workers only return.
    let prefix = Prefix::new(steps(&run.retired[0].trace));

    let outcome = engine.replay(prefix).unwrap();
    assert!(matches!(
        outcome.retired[0].reason,
        TerminationReason::ReplayMismatch { .. }
    ));
    assert_eq!(engine.session().stats().replay_mismatches, 1);
}
