//! Executor
//!
//! # Overview
//!
//! One *run* explores the program from its initial state under one
//! scheduler. A replay run binds a [`Prefix`] through the guided policy
//! and behaves exactly like an initial run once the prefix is exhausted.
//!
//! ```text
//!                ┌──────────── Searcher (Dfs | Bfs) ────────────┐
//!                │  s0   s1   s2 ...                            │
//!                └───┬──────────────────────────────────▲───────┘
//!                    │ select                           │ forks
//!                    ▼                                  │
//!   pending? ─► budgets? ─► pick thread ─► replay check ─► relock | execute
//!      │            │            │               │                    │
//!      └────────────┴── retire ◄─┴── deadlock ───┴─── mismatch ◄──────┘
//! ```
//!
//! # Step
//!
//! Each step runs exactly one thread for one event:
//!
//! 1. A retirement scheduled by a fork (error child) is applied first.
//! 2. Halt flag, wall-clock budget and per-state instruction budget.
//! 3. The scheduler picks a thread. A thread parked on a mutex that is
//!    still held is rotated past; meeting the same thread a third time
//!    without progress means nothing can run, which is a deadlock.
//! 4. While replaying, the chosen (thread, location) must be the next
//!    prefix entry; otherwise the state retires with a replay mismatch.
//! 5. The thread either re-acquires the mutex it was parked on, or
//!    executes its next instruction.
//!
//! Every recorded event advances the prefix cursor. Blocking attempts
//! record nothing and leave the program counter in place, so the
//! instruction is retried when the thread is woken.
//!
//! # Memory cap
//!
//! Every `memory_check_interval` steps the footprint of all live states is
//! summed. Above `memory_cap_bytes`, the largest states retire (lowest
//! weight first among equals) until the total drops below 90% of the cap.

mod searcher;
mod step;
mod sync_calls;

pub use searcher::Searcher;

use crate::domain::error::{Budget, EngineError, RuntimeErrorKind, TerminationReason};
use crate::domain::evaluator::{ArithmeticEvaluator, Evaluator};
use crate::domain::expr::Model;
use crate::domain::prefix::Prefix;
use crate::domain::program::{Instruction, Program, SyncCall};
use crate::domain::scheduler::Scheduler;
use crate::domain::session::Session;
use crate::domain::solver::{ConstraintSolver, SolverQuery};
use crate::domain::state::ExecutionState;
use crate::domain::sync::WaitQueuePolicy;
use crate::domain::thread::{Thread, ThreadState};
use crate::domain::trace::Trace;
use crate::domain::types::{StateId, SyncKey, ThreadId};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A state removed from exploration
#[derive(Debug, Clone)]
pub struct RetiredState {
    /// State id
    pub id: StateId,
    /// Why it retired
    pub reason: TerminationReason,
    /// Recorded events
    pub trace: Trace,
    /// Concrete input values satisfying its path condition
    pub inputs: Model,
    /// Exploration weight at retirement
    pub weight: f64,
}

/// Everything one run produced
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Retired states, in retirement order
    pub retired: Vec<RetiredState>,
    /// Forks taken during the run
    pub forks: u64,
    /// Whether the run replayed a prefix
    pub replayed: bool,
}

impl RunOutcome {
    /// Retired states that report a bug
    pub fn bugs(&self) -> impl Iterator<Item = &RetiredState> {
        self.retired.iter().filter(|s| s.reason.is_bug())
    }

    /// Retired states that ran to completion
    pub fn completed(&self) -> impl Iterator<Item = &RetiredState> {
        self.retired
            .iter()
            .filter(|s| s.reason == TerminationReason::Completed)
    }
}

/// What a step did to the selected state
#[derive(Debug)]
pub(crate) enum Step {
    /// Keep exploring; `jumped` marks a control-flow join worth a merge attempt
    Continue { jumped: bool },
    /// Remove the state
    Retire(TerminationReason),
}

impl Step {
    pub(crate) const fn proceed() -> Self {
        Self::Continue { jumped: false }
    }
}

/// How the picked thread makes progress
#[derive(Debug, Clone, Copy)]
struct Pick {
    thread: ThreadId,
    relock: Option<SyncKey>,
}

/// Drives execution states of one program
pub struct Executor<'a> {
    program: &'a Program,
    session: &'a Session,
    solver: &'a dyn ConstraintSolver,
    evaluator: Box<dyn Evaluator + 'a>,
    next_state: u64,
    forks: u64,
    instructions: u64,
}

impl<'a> Executor<'a> {
    /// Create an executor with the default evaluator
    pub fn new(program: &'a Program, session: &'a Session, solver: &'a dyn ConstraintSolver) -> Self {
        Self {
            program,
            session,
            solver,
            evaluator: Box::new(ArithmeticEvaluator),
            next_state: 0,
            forks: 0,
            instructions: 0,
        }
    }

    /// Replace the evaluator
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator + 'a>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Program under test
    pub fn program(&self) -> &'a Program {
        self.program
    }

    fn query(&self) -> SolverQuery<'a> {
        SolverQuery::new(self.solver, self.session)
    }

    fn fresh_id(&mut self) -> StateId {
        let id = StateId(self.next_state);
        self.next_state += 1;
        id
    }

    /// Explore from the initial state, replaying `prefix` first if given
    ///
    /// # Errors
    /// Only when the initial state cannot be built; everything that goes
    /// wrong afterwards retires a single state.
    pub fn run(&mut self, prefix: Option<Prefix>) -> Result<RunOutcome, EngineError> {
        let session = self.session;
        let config = session.config();
        let replayed = prefix.is_some();
        let base = Scheduler::new(config.scheduler);
        let (scheduler, policy) = match prefix {
            Some(prefix) => (Scheduler::guided(base, prefix), WaitQueuePolicy::Guided),
            None => (base, config.cond_policy),
        };
        let id = self.fresh_id();
        let initial = ExecutionState::initial(id, self.program, scheduler, policy, config.max_threads)?;
        info!(state = %id, scheduler = initial.scheduler().name(), replay = replayed, "run started");

        self.forks = 0;
        self.instructions = 0;
        let mut searcher = Searcher::new(config.searcher);
        searcher.add(initial);
        let mut retired = Vec::new();
        let mut children = Vec::new();
        let mut since_check = 0u64;

        while let Some(state) = searcher.select() {
            match self.step(state, &mut children) {
                Step::Retire(reason) => {
                    if let Some(state) = searcher.take_selected() {
                        retired.push(self.retire(state, reason));
                    }
                }
                Step::Continue { jumped } => {
                    if jumped && searcher.len() > 1 && searcher.merge_selected().is_some() {
                        session.record(|s| s.merges += 1);
                    }
                    searcher.update();
                }
            }
            for child in children.drain(..) {
                searcher.add(child);
            }

            since_check += 1;
            if since_check >= config.memory_check_interval {
                since_check = 0;
                let total = searcher.approx_bytes();
                if total > config.memory_cap_bytes {
                    let shed = searcher.shed(config.memory_cap_bytes / 10 * 9);
                    warn!(total, cap = config.memory_cap_bytes, shed = shed.len(), "memory cap reached");
                    for state in shed {
                        retired.push(self.retire(state, TerminationReason::MemoryCap));
                    }
                }
            }
        }

        let (forks, instructions) = (self.forks, self.instructions);
        self.session.record(|s| {
            s.runs += 1;
            s.forks += forks;
            s.instructions += instructions;
        });
        info!(retired = retired.len(), forks, instructions, "run finished");
        Ok(RunOutcome {
            retired,
            forks,
            replayed,
        })
    }

    /// Advance `state` by one event
    fn step(&mut self, state: &mut ExecutionState, forks: &mut Vec<ExecutionState>) -> Step {
        if let Some(reason) = state.take_pending_termination() {
            return Step::Retire(reason);
        }
        let config = self.session.config();
        if self.session.is_halted() {
            return Step::Retire(TerminationReason::Halted);
        }
        if self.session.time_exhausted() {
            return Step::Retire(TerminationReason::BudgetExceeded(Budget::Time));
        }
        if state.instructions() >= config.max_instructions_per_state {
            return Step::Retire(TerminationReason::BudgetExceeded(Budget::Instructions));
        }

        let pick = match pick_thread(state) {
            Ok(pick) => pick,
            Err(reason) => return Step::Retire(reason),
        };
        if let Some(reason) = replay_mismatch(state, pick.thread) {
            warn!(state = %state.id(), %reason, "replay diverged");
            return Step::Retire(reason);
        }

        state.set_current(pick.thread);
        state.count_instruction();
        self.instructions += 1;
        match pick.relock {
            Some(mutex) => self.relock(state, pick.thread, mutex),
            None => self.execute(state, pick.thread, forks),
        }
    }

    /// Re-acquire the mutex `tid` was parked on
    fn relock(&mut self, state: &mut ExecutionState, tid: ThreadId, mutex: SyncKey) -> Step {
        if !state.mutexes_mut().try_lock_for_blocked_thread(tid) {
            state.scheduler_mut().re_schedule();
            return Step::proceed();
        }
        let reacquire = state
            .thread(tid)
            .and_then(Thread::location)
            .and_then(|at| self.program.instruction(at))
            .is_some_and(|i| matches!(i, Instruction::Sync(SyncCall::CondWait { .. })));
        state.wake(tid);
        self.acquired(state, tid, mutex, reacquire);
        Step::proceed()
    }

    /// Turn a retired state into its report
    fn retire(&self, state: ExecutionState, reason: TerminationReason) -> RetiredState {
        self.session.record(|s| {
            s.states_explored += 1;
            match &reason {
                TerminationReason::RuntimeError(kind) => {
                    s.runtime_errors += 1;
                    if matches!(kind, RuntimeErrorKind::Deadlock { .. }) {
                        s.deadlocks += 1;
                    }
                }
                TerminationReason::SolverTimeout(_) => s.solver_timeouts += 1,
                TerminationReason::ReplayMismatch { .. } => s.replay_mismatches += 1,
                TerminationReason::Capacity(_) => s.capacity_failures += 1,
                TerminationReason::MemoryCap => s.memory_cap_terminations += 1,
                _ => {}
            }
        });

        let inputs = if state.inputs().is_empty() {
            Model::default()
        } else {
            match self
                .query()
                .get_initial_values(state.constraints(), &state.inputs().names())
            {
                Ok(model) => model,
                Err(err) => {
                    warn!(state = %state.id(), %err, "no concrete inputs for retired state");
                    Model::default()
                }
            }
        };

        if reason.is_bug() {
            info!(state = %state.id(), events = state.trace().len(), %reason, "bug found");
        } else {
            debug!(state = %state.id(), events = state.trace().len(), %reason, "state retired");
        }
        RetiredState {
            id: state.id(),
            reason,
            trace: state.trace().clone(),
            inputs,
            weight: state.weight(),
        }
    }
}

/// Choose the thread to run, rotating past threads that cannot
fn pick_thread(state: &mut ExecutionState) -> Result<Pick, TerminationReason> {
    let mut visits: BTreeMap<ThreadId, u32> = BTreeMap::new();
    loop {
        let next = {
            let view = &*state;
            view.scheduler().select_next_item(&|t| view.is_schedulable(t))
        };
        let Some(tid) = next else {
            return Err(stalled(state));
        };
        let seen = visits.entry(tid).or_insert(0);
        *seen += 1;
        if *seen > 2 {
            return Err(deadlock(state));
        }
        match state.thread(tid).map(Thread::state) {
            Some(ThreadState::Runnable) => return Ok(Pick { thread: tid, relock: None }),
            Some(ThreadState::MutexBlocked(m)) if state.mutexes().is_available(m) => {
                return Ok(Pick {
                    thread: tid,
                    relock: Some(m),
                })
            }
            Some(ThreadState::MutexBlocked(_)) => state.scheduler_mut().re_schedule(),
            _ => state.scheduler_mut().remove_item(tid),
        }
    }
}

/// Nothing is ready: either every thread finished or the rest are stuck
fn stalled(state: &ExecutionState) -> TerminationReason {
    if state.all_terminated() {
        TerminationReason::Completed
    } else {
        deadlock(state)
    }
}

fn deadlock(state: &ExecutionState) -> TerminationReason {
    let blocked = state.live_threads();
    if let Some(cycle) = blocked
        .iter()
        .find_map(|(tid, _)| state.mutexes().wait_for_cycle(*tid))
    {
        debug!(state = %state.id(), ?cycle, "mutex wait-for cycle");
    }
    TerminationReason::RuntimeError(RuntimeErrorKind::Deadlock { blocked })
}

/// Compare the next prefix entry with what is about to run
fn replay_mismatch(state: &ExecutionState, tid: ThreadId) -> Option<TerminationReason> {
    let (expected_thread, expected_location) = state.scheduler().expected()?;
    let location = state.thread(tid).and_then(Thread::location);
    if expected_thread == tid && location == Some(expected_location) {
        return None;
    }
    let found = match location {
        Some(location) => format!("{tid} {location}"),
        None => format!("{tid} <no frame>"),
    };
    Some(TerminationReason::ReplayMismatch {
        expected: format!("{expected_thread} {expected_location}"),
        found,
    })
}
