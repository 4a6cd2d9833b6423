//! Exploration Engine
//!
//! # Overview
//!
//! The engine owns everything that outlives a run and drives the outer
//! loop:
//!
//! ```text
//!        ┌──────────────────────── get_next_prefix ◄───────────────┐
//!        ▼                                                         │
//!  Executor::run(prefix) ──► retired states ──► untested? ──► TraceEncoder::search
//!                                  │                               │
//!                                  ├─► bugs                        └─► add_prefix
//!                                  └─► retire_trace / artifacts
//! ```
//!
//! The first run has no prefix. Exploration stops when the repository has
//! no pending prefix, `max_runs` is reached, the time budget is spent or
//! the session is halted.

use crate::domain::config::EngineConfig;
use crate::domain::encoder::{FlipReport, TraceEncoder};
use crate::domain::error::{EngineError, TerminationReason};
use crate::domain::executor::{Executor, RetiredState, RunOutcome};
use crate::domain::expr::Model;
use crate::domain::prefix::Prefix;
use crate::domain::program::Program;
use crate::domain::repository::RunRepository;
use crate::domain::session::{RunStatistics, Session};
use crate::domain::solver::{ConstraintSolver, SolverQuery};
use crate::domain::trace::Trace;
use crate::domain::types::StateId;
use crate::infrastructure::artifacts::ArtifactWriter;
use crate::infrastructure::solver::default_solver;
use tracing::{debug, info, warn};

/// A retired state that reports a bug in the program under test
#[derive(Debug, Clone)]
pub struct Bug {
    /// Run that found it (1-based)
    pub run: u64,
    /// State that retired
    pub state: StateId,
    /// Solver timeout, runtime error or deadlock
    pub reason: TerminationReason,
    /// Input values reaching it
    pub inputs: Model,
    /// Events leading to it
    pub trace: Trace,
}

/// Summary of a finished exploration
#[derive(Debug, Clone)]
pub struct ExplorationReport {
    /// Runs executed
    pub runs: u64,
    /// Cumulative counters
    pub stats: RunStatistics,
    /// Bugs in discovery order
    pub bugs: Vec<Bug>,
    /// Prefixes still queued when exploration stopped
    pub pending: usize,
}

impl ExplorationReport {
    /// Whether any bug was found
    pub fn has_bugs(&self) -> bool {
        !self.bugs.is_empty()
    }

    /// Bugs that are deadlocks
    pub fn deadlocks(&self) -> impl Iterator<Item = &Bug> {
        self.bugs.iter().filter(|b| b.reason.is_deadlock())
    }
}

/// Systematic exploration of one program
pub struct Engine {
    program: Program,
    session: Session,
    solver: Box<dyn ConstraintSolver>,
    repository: RunRepository,
    artifacts: Option<ArtifactWriter>,
    runs: u64,
}

impl Engine {
    /// Engine over `program` with the default constraint backend
    ///
    /// # Errors
    /// When the configuration is invalid or the artifact directory cannot
    /// be created.
    pub fn new(program: Program, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let artifacts = config
            .artifact_dir
            .as_ref()
            .map(ArtifactWriter::new)
            .transpose()
            .map_err(|err| EngineError::Config(format!("{err:#}")))?;
        let repository = RunRepository::new(config.max_retained_traces);
        Ok(Self {
            program,
            session: Session::new(config),
            solver: default_solver(),
            repository,
            artifacts,
            runs: 0,
        })
    }

    /// Replace the constraint backend
    #[must_use]
    pub fn with_solver(mut self, solver: Box<dyn ConstraintSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Program under test
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Shared session (configuration, counters, halt flag)
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Name of the constraint backend in use
    pub fn backend(&self) -> &'static str {
        self.solver.name()
    }

    /// Prefix queue and retired traces
    pub fn repository(&self) -> &RunRepository {
        &self.repository
    }

    /// Explore until no alternate schedule is left or a budget runs out
    ///
    /// # Errors
    /// Only when the initial state of a run cannot be built.
    pub fn explore(&mut self) -> Result<ExplorationReport, EngineError> {
        let max_runs = self.session.config().max_runs;
        let mut bugs = Vec::new();
        let mut prefix = None;
        info!(backend = self.solver.name(), max_runs, "exploration started");
        loop {
            let outcome = self.execute(prefix.take())?;
            let run = self.runs;
            self.absorb(run, outcome, &mut bugs);
            self.write_statistics();

            if self.session.is_halted() || self.session.time_exhausted() {
                info!(run, "exploration interrupted");
                break;
            }
            if usize::try_from(run).map_or(true, |r| r >= max_runs) {
                info!(run, pending = self.repository.pending(), "run budget exhausted");
                break;
            }
            match self.repository.get_next_prefix() {
                Some(next) => prefix = Some(next),
                None => break,
            }
        }
        let report = ExplorationReport {
            runs: self.runs,
            stats: self.session.stats(),
            bugs,
            pending: self.repository.pending(),
        };
        info!(runs = report.runs, bugs = report.bugs.len(), pending = report.pending, "exploration finished");
        Ok(report)
    }

    /// Run once under `prefix` without touching the prefix queue
    ///
    /// # Errors
    /// Only when the initial state cannot be built.
    pub fn replay(&mut self, prefix: Prefix) -> Result<RunOutcome, EngineError> {
        self.execute(Some(prefix))
    }

    fn execute(&mut self, prefix: Option<Prefix>) -> Result<RunOutcome, EngineError> {
        self.runs += 1;
        let mut executor = Executor::new(&self.program, &self.session, self.solver.as_ref());
        executor.run(prefix)
    }

    /// Encode new traces, collect bugs and retire every trace of a run
    fn absorb(&mut self, run: u64, outcome: RunOutcome, bugs: &mut Vec<Bug>) {
        for state in outcome.retired {
            if state.reason.is_bug() {
                info!(run, state = %state.id, reason = %state.reason, "bug found");
                bugs.push(Bug {
                    run,
                    state: state.id,
                    reason: state.reason.clone(),
                    inputs: state.inputs.clone(),
                    trace: state.trace.clone(),
                });
            }
            if is_encodable(&state.reason) {
                if self.repository.is_current_trace_untested(&state.trace) {
                    self.search(&state);
                } else {
                    debug!(run, state = %state.id, "trace already tested");
                    self.session.record(|s| s.duplicate_traces += 1);
                }
            }
            if let Some(writer) = &self.artifacts {
                if let Err(err) = writer.write_trace(&self.program, run, state.id, &state.reason, &state.trace) {
                    warn!(error = %format!("{err:#}"), "trace artifact not written");
                }
            }
            self.repository.retire_trace(run, state.id, state.reason, state.trace);
        }
    }

    /// Flip search over one retired trace; queues every new prefix
    fn search(&mut self, state: &RetiredState) {
        let config = self.session.config();
        let encoder = TraceEncoder::new(&self.program, &state.trace, &state.inputs, config.taint_pruning);
        let query = SolverQuery::new(self.solver.as_ref(), &self.session);
        let report = encoder.search(&query, config.flip_untainted_branches);
        self.record_search(&report);

        let mut queued = 0u64;
        for prefix in report.prefixes {
            if let Some(writer) = self.artifacts.as_mut() {
                if let Err(err) = writer.write_prefix(&prefix) {
                    warn!(error = %format!("{err:#}"), "prefix artifact not written");
                }
            }
            if self.repository.add_prefix(prefix) {
                queued += 1;
            }
        }
        if queued > 0 {
            info!(state = %state.id, queued, pending = self.repository.pending(), "prefixes queued");
        }
        self.session.record(|s| s.prefixes_queued += queued);
    }

    fn record_search(&self, report: &FlipReport) {
        if report.timeouts > 0 {
            warn!(timeouts = report.timeouts, "flip queries timed out");
        }
        self.session.record(|s| {
            s.formulas_built += 1;
            s.branches_attempted += report.attempted;
            s.branches_flippable += report.flippable;
            s.branches_unsat += report.unsat;
            s.branches_unknown += report.unknown + report.timeouts;
            s.branches_skipped_taint += report.skipped;
            s.solver_timeouts += report.timeouts;
        });
    }

    fn write_statistics(&self) {
        if let Some(writer) = &self.artifacts {
            if let Err(err) = writer.write_statistics(&self.session.stats()) {
                warn!(error = %format!("{err:#}"), "statistics artifact not written");
            }
        }
    }
}

/// Traces whose branches are worth flipping
fn is_encodable(reason: &TerminationReason) -> bool {
    matches!(reason, TerminationReason::Completed | TerminationReason::RuntimeError(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::program::{ComputeOp, Operand, ProgramBuilder};

    fn two_arms() -> Program {
        let mut p = ProgramBuilder::new();
        let main = p.declare("main", 0);
        p.define(main, |f| {
            let n = f.symbolic("n");
            let c = f.compute(ComputeOp::Lt, Operand::Reg(n), Operand::Const(0));
            f.assert(Operand::Reg(c), "n < 0");
            f.ret(None);
        });
        p.build(main).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            max_threads: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(two_arms(), config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_single_threaded_program_needs_one_run() {
        let mut engine = Engine::new(two_arms(), EngineConfig::default()).unwrap();
        let report = engine.explore().unwrap();
        assert_eq!(report.runs, 1);
        assert_eq!(report.bugs.len(), 1);
        assert_eq!(report.pending, 0);
        assert_eq!(report.stats.formulas_built, 2);
        assert_eq!(report.stats.states_explored, 2);
        assert_eq!(engine.repository().retired().len(), 2);
    }

    #[test]
    fn test_default_backend_decides_nonlinear_branch() {
        let mut p = ProgramBuilder::new();
        let main = p.declare("main", 0);
        p.define(main, |f| {
            let n = f.symbolic("n");
            let sq = f.compute(ComputeOp::Mul, Operand::Reg(n), Operand::Reg(n));
            let c = f.compute(ComputeOp::Eq, Operand::Reg(sq), Operand::Const(4));
            let br = f.branch(Operand::Reg(c));
            let end = f.here();
            f.ret(None);
            f.patch_branch(br, end, end);
        });
        let mut engine = Engine::new(p.build(main).unwrap(), EngineConfig::default()).unwrap();
        assert_eq!(engine.backend(), "z3");

        let report = engine.explore().unwrap();
        assert!(report.bugs.is_empty(), "{:?}", report.bugs);
        assert_eq!(report.stats.states_explored, 2);
        assert_eq!(report.stats.solver_timeouts, 0);
    }

    #[test]
    fn test_halt_stops_after_first_run() {
        let mut engine = Engine::new(two_arms(), EngineConfig::default()).unwrap();
        engine.session().halt();
        let report = engine.explore().unwrap();
        assert_eq!(report.runs, 1);
        assert!(!report.has_bugs());
    }

    #[test]
    fn test_artifacts_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            artifact_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(two_arms(), config).unwrap();
        engine.explore().unwrap();
        assert!(dir.path().join("statistics.json").exists());
        assert!(dir.path().join("run-1-state-0.trace").exists());
    }
}
