//! Instruction semantics
//!
//! | Instruction | Event | Notes |
//! |-------------|-------|-------|
//! | Move, Compute, MakeSymbolic, Jump, Call | Local | Compute may fork an error child |
//! | Load | Read | value = memory cell, trace view = fresh read variable |
//! | Store | Write | trace view of the stored value is recorded |
//! | Branch | Branch, or Local when no read or input flows in | forks when both arms are feasible |
//! | Assert | Assert | forks an error child when it may fail |
//! | Return | Local, or Exit from the initial frame | |
//! | Sync | see [`sync_calls`](super::sync_calls) | |

use super::{Executor, Step};
use crate::domain::error::{Budget, RuntimeErrorKind, SolverError, TerminationReason};
use crate::domain::evaluator::{Computed, Value};
use crate::domain::expr::Expr;
use crate::domain::program::{Instruction, Operand, Reg};
use crate::domain::solver::Validity;
use crate::domain::state::ExecutionState;
use crate::domain::thread::{StackFrame, Thread};
use crate::domain::trace::{Event, EventKind};
use crate::domain::types::{FunctionId, GlobalId, Location, ThreadId};
use tracing::{debug, trace};

/// Falling off the end of a body behaves like `ret`
static IMPLICIT_RETURN: Instruction = Instruction::Return { value: None };

/// Record `kind` for `tid` and advance the replay cursor
pub(super) fn emit(state: &mut ExecutionState, tid: ThreadId, at: Location, kind: EventKind, spawned: Option<ThreadId>) {
    let clock = state.thread(tid).map(|t| t.clock().clone()).unwrap_or_default();
    state.trace_mut().record(tid, at, kind, clock);
    state.scheduler_mut().on_event(spawned);
}

pub(super) fn thread_mut(state: &mut ExecutionState, tid: ThreadId, at: Location) -> Result<&mut Thread, RuntimeErrorKind> {
    state.thread_mut(tid).ok_or(RuntimeErrorKind::InvalidOperand(at))
}

pub(super) fn operand(state: &ExecutionState, tid: ThreadId, at: Location, op: Operand) -> Result<Value, RuntimeErrorKind> {
    state
        .thread(tid)
        .ok_or(RuntimeErrorKind::InvalidOperand(at))?
        .operand(op)
}

fn set_register(state: &mut ExecutionState, tid: ThreadId, at: Location, reg: Reg, value: Value) -> Result<(), RuntimeErrorKind> {
    thread_mut(state, tid, at)?.set_register(reg, value)
}

fn advance(state: &mut ExecutionState, tid: ThreadId) {
    if let Some(t) = state.thread_mut(tid) {
        t.advance();
    }
}

impl Executor<'_> {
    /// Execute the next instruction of `tid`
    pub(super) fn execute(&mut self, state: &mut ExecutionState, tid: ThreadId, forks: &mut Vec<ExecutionState>) -> Step {
        let Some(at) = state.thread(tid).and_then(Thread::location) else {
            state.scheduler_mut().remove_item(tid);
            return Step::proceed();
        };
        let program = self.program;
        let instruction = program.instruction(at).unwrap_or(&IMPLICIT_RETURN);
        trace!(thread = %tid, %at, ?instruction, "step");
        match self.dispatch(state, tid, at, instruction, forks) {
            Ok(step) => step,
            Err(kind) => Step::Retire(TerminationReason::RuntimeError(kind)),
        }
    }

    fn dispatch(
        &mut self,
        state: &mut ExecutionState,
        tid: ThreadId,
        at: Location,
        instruction: &Instruction,
        forks: &mut Vec<ExecutionState>,
    ) -> Result<Step, RuntimeErrorKind> {
        match instruction {
            Instruction::Move { dst, src } => {
                let value = operand(state, tid, at, *src)?;
                set_register(state, tid, at, *dst, value)?;
                self.local(state, tid, at);
                Ok(Step::proceed())
            }
            Instruction::Compute { dst, op, lhs, rhs } => {
                let lhs = operand(state, tid, at, *lhs)?;
                let rhs = operand(state, tid, at, *rhs)?;
                match self.evaluator.compute(*op, &lhs, &rhs) {
                    Computed::Value(value) => set_register(state, tid, at, *dst, value)?,
                    Computed::Guarded { value, guard, error } => match self.decide(state, &guard) {
                        Ok(Validity::True) => set_register(state, tid, at, *dst, value)?,
                        Ok(Validity::False) => return Err(error),
                        Ok(Validity::Unknown) => {
                            let mut child = match self.fork(state) {
                                Ok(child) => child,
                                Err(reason) => return Ok(Step::Retire(reason)),
                            };
                            child.add_constraint(Expr::not(&guard));
                            child.set_pending_termination(TerminationReason::RuntimeError(error));
                            forks.push(child);
                            state.add_constraint(guard);
                            set_register(state, tid, at, *dst, value)?;
                        }
                        Err(err) => return Ok(Step::Retire(TerminationReason::SolverTimeout(err))),
                    },
                }
                self.local(state, tid, at);
                Ok(Step::proceed())
            }
            Instruction::Load { dst, global } => self.load(state, tid, at, *dst, *global),
            Instruction::Store { global, src } => self.store(state, tid, at, *global, *src),
            Instruction::MakeSymbolic { dst, name } => {
                let input = state.inputs_mut().fresh(name, tid, at);
                debug!(thread = %tid, %at, input = ?input.as_var(), "symbolic input");
                set_register(state, tid, at, *dst, Value::uniform(input))?;
                self.local(state, tid, at);
                Ok(Step::proceed())
            }
            Instruction::Branch { cond, then_pc, else_pc } => {
                let value = operand(state, tid, at, *cond)?;
                Ok(self.branch(state, tid, at, &value, (*then_pc, *else_pc), forks))
            }
            Instruction::Jump { target } => {
                emit(state, tid, at, EventKind::Local, None);
                thread_mut(state, tid, at)?.jump(*target);
                Ok(Step::Continue { jumped: true })
            }
            Instruction::Assert { cond, message } => {
                let value = operand(state, tid, at, *cond)?;
                Ok(self.assert(state, tid, at, &value, message, forks))
            }
            Instruction::Call { function, args, dst } => self.call(state, tid, at, *function, args, *dst),
            Instruction::Return { value } => {
                let value = (*value).map(|v| operand(state, tid, at, v)).transpose()?;
                self.ret(state, tid, at, value)
            }
            Instruction::Sync(call) => self.sync_call(state, tid, at, call),
        }
    }

    /// Record a local event and move on
    fn local(&self, state: &mut ExecutionState, tid: ThreadId, at: Location) {
        emit(state, tid, at, EventKind::Local, None);
        advance(state, tid);
    }

    /// Classify `cond` (symbolic view) under the path condition
    fn decide(&self, state: &ExecutionState, cond: &Expr) -> Result<Validity, SolverError> {
        match cond.to_bool().as_bool() {
            Some(true) => Ok(Validity::True),
            Some(false) => Ok(Validity::False),
            None => self.query().evaluate(state.constraints(), cond),
        }
    }

    /// Split `state`, charging the fork budget
    fn fork(&mut self, state: &mut ExecutionState) -> Result<ExecutionState, TerminationReason> {
        if self.forks >= self.session.config().max_forks {
            debug!(state = %state.id(), forks = self.forks, "fork budget exhausted");
            return Err(TerminationReason::BudgetExceeded(Budget::Forks));
        }
        self.forks += 1;
        let id = self.fresh_id();
        let child = state.branch(id);
        debug!(parent = %state.id(), child = %id, depth = child.depth(), "forked");
        Ok(child)
    }

    fn load(&mut self, state: &mut ExecutionState, tid: ThreadId, at: Location, dst: Reg, global: GlobalId) -> Result<Step, RuntimeErrorKind> {
        let current = state
            .address_space()
            .read(global)
            .cloned()
            .ok_or(RuntimeErrorKind::OutOfBounds(global))?;
        let seq = state.trace().next_seq(tid);
        let access = state.trace_mut().next_load(global);
        let read = Expr::int_var(Event::value_var_name(tid, seq));
        set_register(state, tid, at, dst, Value::new(current, read))?;
        emit(state, tid, at, EventKind::Read { global, access }, None);
        advance(state, tid);
        Ok(Step::proceed())
    }

    fn store(&mut self, state: &mut ExecutionState, tid: ThreadId, at: Location, global: GlobalId, src: Operand) -> Result<Step, RuntimeErrorKind> {
        if !state.address_space().contains(global) {
            return Err(RuntimeErrorKind::OutOfBounds(global));
        }
        if state.address_space().is_read_only(global) {
            return Err(RuntimeErrorKind::WriteToReadOnly(global));
        }
        let value = operand(state, tid, at, src)?;
        state.address_space_mut().write(global, value.sym);
        let access = state.trace_mut().next_store(global);
        emit(
            state,
            tid,
            at,
            EventKind::Write {
                global,
                access,
                value: value.trace,
            },
            None,
        );
        advance(state, tid);
        Ok(Step::proceed())
    }

    fn branch(
        &mut self,
        state: &mut ExecutionState,
        tid: ThreadId,
        at: Location,
        value: &Value,
        (then_pc, else_pc): (usize, usize),
        forks: &mut Vec<ExecutionState>,
    ) -> Step {
        let sym = value.sym.to_bool();
        let cond = value.trace.to_bool();
        match self.decide(state, &sym) {
            Ok(Validity::True) => take_branch(state, tid, at, &cond, true, then_pc),
            Ok(Validity::False) => take_branch(state, tid, at, &cond, false, else_pc),
            Ok(Validity::Unknown) => {
                let mut child = match self.fork(state) {
                    Ok(child) => child,
                    Err(reason) => return Step::Retire(reason),
                };
                child.add_constraint(Expr::not(&sym));
                take_branch(&mut child, tid, at, &cond, false, else_pc);
                state.add_constraint(sym);
                let step = take_branch(state, tid, at, &cond, true, then_pc);
                match (off_prefix(state, tid), off_prefix(&child, tid)) {
                    (false, true) => self.prune_sibling(&child, at),
                    (true, false) => {
                        std::mem::swap(state, &mut child);
                        self.prune_sibling(&child, at);
                    }
                    _ => forks.push(child),
                }
                step
            }
            Err(err) => Step::Retire(TerminationReason::SolverTimeout(err)),
        }
    }

    /// Drop an arm the replayed prefix does not take
    fn prune_sibling(&self, sibling: &ExecutionState, at: Location) {
        debug!(state = %sibling.id(), %at, "replay sibling pruned");
        self.session.record(|s| s.replay_siblings_pruned += 1);
    }

    fn assert(
        &mut self,
        state: &mut ExecutionState,
        tid: ThreadId,
        at: Location,
        value: &Value,
        message: &str,
        forks: &mut Vec<ExecutionState>,
    ) -> Step {
        let sym = value.sym.to_bool();
        let cond = value.trace.to_bool();
        let failure = || {
            TerminationReason::RuntimeError(RuntimeErrorKind::AssertionFailed {
                location: at,
                message: message.to_string(),
            })
        };
        match self.decide(state, &sym) {
            Ok(Validity::True) => {
                emit(state, tid, at, EventKind::Assert { cond, holds: true }, None);
                advance(state, tid);
                Step::proceed()
            }
            Ok(Validity::False) => {
                emit(state, tid, at, EventKind::Assert { cond, holds: false }, None);
                Step::Retire(failure())
            }
            Ok(Validity::Unknown) => {
                let mut child = match self.fork(state) {
                    Ok(child) => child,
                    Err(reason) => return Step::Retire(reason),
                };
                child.add_constraint(Expr::not(&sym));
                emit(
                    &mut child,
                    tid,
                    at,
                    EventKind::Assert {
                        cond: cond.clone(),
                        holds: false,
                    },
                    None,
                );
                child.set_pending_termination(failure());
                forks.push(child);
                state.add_constraint(sym);
                emit(state, tid, at, EventKind::Assert { cond, holds: true }, None);
                advance(state, tid);
                Step::proceed()
            }
            Err(err) => Step::Retire(TerminationReason::SolverTimeout(err)),
        }
    }

    fn call(
        &mut self,
        state: &mut ExecutionState,
        tid: ThreadId,
        at: Location,
        callee: FunctionId,
        args: &[Operand],
        dst: Option<Reg>,
    ) -> Result<Step, RuntimeErrorKind> {
        let program = self.program;
        let function = program
            .function(callee)
            .ok_or(RuntimeErrorKind::InvalidFunction(callee))?;
        if args.len() < function.params {
            return Err(RuntimeErrorKind::TooFewArguments {
                function: callee,
                expected: function.params,
                got: args.len(),
            });
        }
        let depth = state.thread(tid).map_or(0, Thread::depth);
        if depth >= self.session.config().max_stack_depth {
            return Err(RuntimeErrorKind::StackOverflow(depth));
        }
        let values = args
            .iter()
            .map(|a| operand(state, tid, at, *a))
            .collect::<Result<Vec<_>, _>>()?;
        self.local(state, tid, at);
        thread_mut(state, tid, at)?.push_frame(StackFrame::new(callee, function.registers, values, dst));
        Ok(Step::proceed())
    }

    fn ret(&mut self, state: &mut ExecutionState, tid: ThreadId, at: Location, value: Option<Value>) -> Result<Step, RuntimeErrorKind> {
        let thread = thread_mut(state, tid, at)?;
        let frame = thread.pop_frame();
        if thread.depth() > 0 {
            if let Some(reg) = frame.and_then(|f| f.return_to) {
                thread.set_register(reg, value.unwrap_or_default())?;
            }
            emit(state, tid, at, EventKind::Local, None);
            return Ok(Step::proceed());
        }

        thread.tick();
        state.terminate(tid, value);
        emit(state, tid, at, EventKind::ThreadExit, None);
        debug!(thread = %tid, "thread exited");
        Ok(Step::proceed())
    }
}

/// Record the branch outcome and jump to `target`
///
/// A condition with no read or input in its trace view cannot change under
/// any schedule, so it is recorded as a local event.
/// Whether the prefix expects `tid` somewhere other than where it now is
fn off_prefix(state: &ExecutionState, tid: ThreadId) -> bool {
    state
        .scheduler()
        .replay_lookahead(tid)
        .is_some_and(|expected| state.thread(tid).and_then(Thread::location) != Some(expected))
}

fn take_branch(state: &mut ExecutionState, tid: ThreadId, at: Location, cond: &Expr, taken: bool, target: usize) -> Step {
    let kind = if cond.is_const() {
        EventKind::Local
    } else {
        EventKind::Branch {
            cond: cond.clone(),
            taken,
        }
    };
    emit(state, tid, at, kind, None);
    if let Some(t) = state.thread_mut(tid) {
        t.jump(target);
    }
    Step::proceed()
}
