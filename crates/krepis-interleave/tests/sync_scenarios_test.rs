//! Integration Test: Synchronization Scenarios
//!
//! Lost wake-ups, the thread limit and barrier release, driven end to end
//! through the engine.

mod common;

use krepis_interleave::domain::error::CapacityError;
use krepis_interleave::domain::thread::ThreadState;
use krepis_interleave::domain::trace::EventKind;
use krepis_interleave::domain::types::ThreadId;
use krepis_interleave::{Engine, EngineConfig, RuntimeErrorKind, SchedulerKind, TerminationReason};

#[test]
fn test_signal_then_wait_deadlocks() {
    let mut engine = Engine::new(common::signal_then_wait(), EngineConfig::default()).unwrap();
    let report = engine.explore().unwrap();

    let deadlock = report.deadlocks().next().expect("deadlock reported");
    let TerminationReason::RuntimeError(RuntimeErrorKind::Deadlock { blocked }) = &deadlock.reason else {
        unreachable!();
    };
    assert_eq!(
        blocked,
        &vec![(
            ThreadId::MAIN,
            ThreadState::CondBlocked {
                cond: common::C,
                mutex: common::M
            }
        )]
    );
    assert_eq!(report.stats.deadlocks, 1);
    assert!(report.stats.runtime_errors >= 1);
}

#[test]
fn test_seventeenth_thread_is_refused() {
    let mut engine = Engine::new(common::spawner(16), EngineConfig::default()).unwrap();
    let report = engine.explore().unwrap();

    assert!(!report.has_bugs());
    assert_eq!(report.stats.capacity_failures, 1);
    let retired = engine.repository().retired();
    assert_eq!(retired.len(), 1);
    assert_eq!(
        retired[0].reason,
        TerminationReason::Capacity(CapacityError::ThreadLimit { limit: 16 })
    );
    let created = retired[0]
        .trace
        .events()
        .filter(|e| matches!(e.kind, EventKind::ThreadCreate { .. }))
        .count();
    assert_eq!(created, 15);
}

#[test]
fn test_sixteen_threads_fit() {
    let mut engine = Engine::new(common::spawner(15), EngineConfig::default()).unwrap();
    let report = engine.explore().unwrap();
    assert_eq!(report.stats.capacity_failures, 0);
    assert_eq!(report.stats.states_explored, 1);
}

#[test]
fn test_barrier_releases_every_participant() {
    for scheduler in [SchedulerKind::ArrivalOrder, SchedulerKind::Preemptive] {
        let config = EngineConfig {
            scheduler,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(common::barrier(3), config).unwrap();
        let report = engine.explore().unwrap();
        assert!(!report.has_bugs(), "{scheduler:?}: {:?}", report.bugs);

        let retired = engine.repository().retired();
        let trace = &retired[0].trace;
        let arrivals: Vec<_> = trace
            .events()
            .filter_map(|e| match e.kind {
                EventKind::BarrierWait { generation, .. } => Some((e.thread, generation)),
                _ => None,
            })
            .collect();
        assert_eq!(arrivals.len(), 4);
        assert!(arrivals.iter().all(|(_, g)| *g == 0));

        // Everyone leaves the barrier after the last arrival.
        let last = trace
            .events()
            .filter(|e| matches!(e.kind, EventKind::BarrierWait { .. }))
            .last()
            .unwrap()
            .clock
            .clone();
        for exit in trace.events().filter(|e| e.kind == EventKind::ThreadExit) {
            assert!(last.le(&exit.clock), "{scheduler:?}");
        }
    }
}
