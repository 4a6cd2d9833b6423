//! Engine Configuration
//!
//! Every knob of an exploration run. The struct is serde-deserializable with
//! per-field defaults, so a JSON file only needs the fields it overrides
//! (see [`crate::infrastructure::config::load_config`]).

use crate::domain::error::EngineError;
use crate::domain::scheduler::SchedulerKind;
use crate::domain::sync::WaitQueuePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// State-selection strategy of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearcherKind {
    /// Most recently forked state first
    #[default]
    Dfs,
    /// Oldest state first
    Bfs,
}

/// Exploration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Threads per state, including the initial thread
    pub max_threads: usize,
    /// Base scheduling policy
    pub scheduler: SchedulerKind,
    /// Condition-variable wake-up policy
    pub cond_policy: WaitQueuePolicy,
    /// State-selection strategy
    pub searcher: SearcherKind,
    /// Timeout per solver query
    pub solver_timeout_ms: u64,
    /// Instructions a single state may execute
    pub max_instructions_per_state: u64,
    /// Forks per run
    pub max_forks: u64,
    /// Wall-clock budget for the whole exploration
    pub max_time_ms: Option<u64>,
    /// Call depth per thread
    pub max_stack_depth: usize,
    /// Live-state footprint that triggers the memory cap
    pub memory_cap_bytes: usize,
    /// Instructions between two memory checks
    pub memory_check_interval: u64,
    /// Runs (initial + replays) before the engine stops
    pub max_runs: usize,
    /// Restrict read matching to the branch-related set
    pub taint_pruning: bool,
    /// Also try branches that no tainted read reaches
    pub flip_untainted_branches: bool,
    /// Directory receiving traces, prefixes and statistics
    pub artifact_dir: Option<PathBuf>,
    /// Retired traces kept by the repository
    pub max_retained_traces: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: 16,
            scheduler: SchedulerKind::ArrivalOrder,
            cond_policy: WaitQueuePolicy::Fifo,
            searcher: SearcherKind::Dfs,
            solver_timeout_ms: 5_000,
            max_instructions_per_state: 100_000,
            max_forks: 1_024,
            max_time_ms: None,
            max_stack_depth: 256,
            memory_cap_bytes: 512 * 1024 * 1024,
            memory_check_interval: 1_024,
            max_runs: 256,
            taint_pruning: true,
            flip_untainted_branches: true,
            artifact_dir: None,
            max_retained_traces: 64,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_threads == 0 {
            return Err(EngineError::Config("max_threads must be at least 1".into()));
        }
        if self.solver_timeout_ms == 0 {
            return Err(EngineError::Config("solver_timeout_ms must be positive".into()));
        }
        if self.memory_check_interval == 0 {
            return Err(EngineError::Config("memory_check_interval must be positive".into()));
        }
        Ok(())
    }

    /// Solver timeout as a duration
    pub fn solver_timeout(&self) -> Duration {
        Duration::from_millis(self.solver_timeout_ms)
    }

    /// Wall-clock budget as a duration
    pub fn time_budget(&self) -> Option<Duration> {
        self.max_time_ms.map(Duration::from_millis)
    }
}
