//! Exploration Session
//!
//! Everything that outlives one execution state is reachable from a
//! [`Session`] passed by reference: the configuration, cumulative counters
//! and a halt flag. There is no global state.

use crate::domain::config::EngineConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cumulative counters of one exploration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Runs started (initial + replays)
    pub runs: u64,
    /// States retired
    pub states_explored: u64,
    /// Forks on data-dependent branches
    pub forks: u64,
    /// Instructions executed
    pub instructions: u64,
    /// Successful state merges
    pub merges: u64,
    /// Traces encoded
    pub formulas_built: u64,
    /// Branches submitted to the flip search
    pub branches_attempted: u64,
    /// Branches with a satisfying alternate schedule
    pub branches_flippable: u64,
    /// Branches proven unflippable
    pub branches_unsat: u64,
    /// Branches the solver could not decide
    pub branches_unknown: u64,
    /// Branches skipped by the taint analysis
    pub branches_skipped_taint: u64,
    /// Solver queries issued
    pub solver_queries: u64,
    /// Time spent in the solver (µs)
    pub solver_time_us: u64,
    /// Prefixes added to the repository
    pub prefixes_queued: u64,
    /// Completed traces already covered by an earlier run
    pub duplicate_traces: u64,
    /// States retired because replay diverged
    pub replay_mismatches: u64,
    /// Branch arms dropped during replay because the prefix takes the other arm
    #[serde(default)]
    pub replay_siblings_pruned: u64,
    /// Runtime errors found (deadlocks included)
    pub runtime_errors: u64,
    /// Deadlocks found
    pub deadlocks: u64,
    /// Solver timeouts
    pub solver_timeouts: u64,
    /// States retired on capacity limits
    pub capacity_failures: u64,
    /// States retired by the memory cap
    pub memory_cap_terminations: u64,
}

/// Shared context of one exploration
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    stats: Mutex<RunStatistics>,
    halt: AtomicBool,
    started: Instant,
}

impl Session {
    /// Start a session
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RunStatistics::default()),
            halt: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    /// Configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Update counters under the lock
    pub fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut RunStatistics),
    {
        f(&mut self.stats.lock());
    }

    /// Copy of the current counters
    pub fn stats(&self) -> RunStatistics {
        self.stats.lock().clone()
    }

    /// Ask the driver to stop after the current step
    pub fn halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }

    /// Whether a halt was requested
    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    /// Whether the wall-clock budget is spent
    pub fn time_exhausted(&self) -> bool {
        self.config
            .time_budget()
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_halt() {
        let session = Session::new(EngineConfig::default());
        session.record(|s| s.forks += 2);
        session.record(|s| s.forks += 1);
        assert_eq!(session.stats().forks, 3);
        assert!(!session.is_halted());
        session.halt();
        assert!(session.is_halted());
        assert!(!session.time_exhausted());
    }

    #[test]
    fn test_zero_time_budget_is_exhausted() {
        let session = Session::new(EngineConfig {
            max_time_ms: Some(0),
            ..EngineConfig::default()
        });
        assert!(session.time_exhausted());
    }
}
