//! Synchronization calls
//!
//! Every successful call ticks the caller's own clock component before its
//! event is recorded. Happens-before edges are carried by clock merges:
//!
//! ```text
//!  unlock  ──release clock──►  next lock of the same mutex
//!  signal  ──────────────────► woken waiter
//!  create  ──────────────────► child (starts with the parent clock)
//!  exit    ──────────────────► join
//!  barrier ── join of all ───► every participant of the release
//! ```
//!
//! A call that has to wait records no event and keeps the program counter
//! on the call; the thread retries it once woken. The one exception is
//! `cond_wait`, which records its `Wait` immediately and later records the
//! re-acquisition as a `Lock` at the same location.

use super::step::{emit, operand, thread_mut};
use super::{Executor, Step};
use crate::domain::error::{RuntimeErrorKind, TerminationReason};
use crate::domain::evaluator::Value;
use crate::domain::expr::Expr;
use crate::domain::program::SyncCall;
use crate::domain::state::ExecutionState;
use crate::domain::sync::{BarrierOutcome, LockOutcome, Waiter};
use crate::domain::thread::{StackFrame, ThreadState};
use crate::domain::trace::EventKind;
use crate::domain::types::{Location, SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use tracing::{debug, warn};

fn tick(state: &mut ExecutionState, tid: ThreadId) {
    if let Some(t) = state.thread_mut(tid) {
        t.tick();
    }
}

fn advance(state: &mut ExecutionState, tid: ThreadId) {
    if let Some(t) = state.thread_mut(tid) {
        t.advance();
    }
}

fn merge_clock(state: &mut ExecutionState, tid: ThreadId, clock: &VectorClock) {
    if let Some(t) = state.thread_mut(tid) {
        t.clock_mut().merge(clock);
    }
}

fn clock_of(state: &ExecutionState, tid: ThreadId) -> VectorClock {
    state.thread(tid).map(|t| t.clock().clone()).unwrap_or_default()
}

impl Executor<'_> {
    pub(super) fn sync_call(
        &mut self,
        state: &mut ExecutionState,
        tid: ThreadId,
        at: Location,
        call: &SyncCall,
    ) -> Result<Step, RuntimeErrorKind> {
        match *call {
            SyncCall::ThreadCreate { entry, arg, dst } => {
                let program = self.program;
                let function = program
                    .function(entry)
                    .ok_or(RuntimeErrorKind::InvalidFunction(entry))?;
                if function.params > 1 {
                    return Err(RuntimeErrorKind::TooFewArguments {
                        function: entry,
                        expected: function.params,
                        got: 1,
                    });
                }
                let arg = operand(state, tid, at, arg)?;
                let args = if function.params == 0 { Vec::new() } else { vec![arg] };
                let frame = StackFrame::new(entry, function.registers, args, None);
                tick(state, tid);
                let child = match state.spawn_thread(tid, frame) {
                    Ok(child) => child,
                    Err(err) => {
                        warn!(thread = %tid, %err, "thread creation refused");
                        return Ok(Step::Retire(TerminationReason::Capacity(err)));
                    }
                };
                if let Some(dst) = dst {
                    let id = Value::concrete(i64::from(child.0));
                    thread_mut(state, tid, at)?.set_register(dst, id)?;
                }
                emit(state, tid, at, EventKind::ThreadCreate { child }, Some(child));
                advance(state, tid);
                debug!(parent = %tid, %child, "thread created");
                Ok(Step::proceed())
            }
            SyncCall::ThreadJoin { thread } => {
                let value = operand(state, tid, at, thread)?;
                let target = self.join_target(state, tid, at, value)?;
                let finished = state
                    .thread(target)
                    .is_some_and(|t| t.state().is_terminated());
                if !finished {
                    state.block(tid, ThreadState::JoinBlocked(target));
                    return Ok(Step::proceed());
                }
                let child_clock = clock_of(state, target);
                merge_clock(state, tid, &child_clock);
                tick(state, tid);
                emit(state, tid, at, EventKind::ThreadJoin { target }, None);
                advance(state, tid);
                Ok(Step::proceed())
            }
            SyncCall::MutexLock(mutex) => {
                match state.mutexes_mut().lock(mutex, tid) {
                    LockOutcome::Acquired => self.acquired(state, tid, mutex, false),
                    LockOutcome::Blocked => state.block(tid, ThreadState::MutexBlocked(mutex)),
                }
                Ok(Step::proceed())
            }
            SyncCall::MutexUnlock(mutex) => {
                tick(state, tid);
                let clock = clock_of(state, tid);
                state.mutexes_mut().unlock(mutex, tid, &clock);
                state.requeue_mutex_waiters(mutex);
                emit(state, tid, at, EventKind::Unlock { mutex }, None);
                advance(state, tid);
                Ok(Step::proceed())
            }
            SyncCall::CondWait { cond, mutex } => {
                tick(state, tid);
                let clock = clock_of(state, tid);
                let (conditions, mutexes) = state.condition_parts();
                conditions.wait(cond, mutex, tid, mutexes, &clock)?;
                emit(state, tid, at, EventKind::Wait { cond, mutex }, None);
                state.block(tid, ThreadState::CondBlocked { cond, mutex });
                state.requeue_mutex_waiters(mutex);
                Ok(Step::proceed())
            }
            SyncCall::CondSignal(cond) => {
                let hint = state.scheduler().wake_hint();
                tick(state, tid);
                let woken = state.condition_parts().0.signal(cond, hint);
                if let Some(waiter) = woken {
                    self.wake_waiter(state, tid, waiter);
                } else {
                    debug!(thread = %tid, %cond, "signal with no waiter");
                }
                let woken = woken.map(|w| w.thread);
                emit(state, tid, at, EventKind::Signal { cond, woken }, None);
                advance(state, tid);
                Ok(Step::proceed())
            }
            SyncCall::CondBroadcast(cond) => {
                tick(state, tid);
                let waiters = state.condition_parts().0.broadcast(cond);
                for waiter in &waiters {
                    self.wake_waiter(state, tid, *waiter);
                }
                let woken = waiters.iter().map(|w| w.thread).collect();
                emit(state, tid, at, EventKind::Broadcast { cond, woken }, None);
                advance(state, tid);
                Ok(Step::proceed())
            }
            SyncCall::BarrierInit { barrier, count } => {
                state.barriers_mut().init(barrier, count)?;
                tick(state, tid);
                emit(state, tid, at, EventKind::BarrierInit { barrier, count }, None);
                advance(state, tid);
                Ok(Step::proceed())
            }
            SyncCall::BarrierWait(barrier) => {
                let outcome = state.barriers_mut().wait(barrier, tid)?;
                tick(state, tid);
                let generation = outcome.generation();
                emit(state, tid, at, EventKind::BarrierWait { barrier, generation }, None);
                advance(state, tid);
                match outcome {
                    BarrierOutcome::Blocked { .. } => state.block(tid, ThreadState::BarrierBlocked(barrier)),
                    BarrierOutcome::Released { waiters, .. } => {
                        let mut joined = clock_of(state, tid);
                        for w in &waiters {
                            joined.merge(&clock_of(state, *w));
                        }
                        merge_clock(state, tid, &joined);
                        for w in waiters {
                            merge_clock(state, w, &joined);
                            state.wake(w);
                        }
                        debug!(%barrier, generation, "barrier released");
                    }
                }
                Ok(Step::proceed())
            }
        }
    }

    /// Ownership of `mutex` was just granted to `tid`
    ///
    /// Also the completion of a parked lock or of a `cond_wait`.
    pub(super) fn acquired(&self, state: &mut ExecutionState, tid: ThreadId, mutex: SyncKey, reacquire: bool) {
        let release = state.mutexes().release_clock(mutex).cloned().unwrap_or_default();
        merge_clock(state, tid, &release);
        tick(state, tid);
        let at = state.thread(tid).and_then(|t| t.location());
        if let Some(at) = at {
            emit(state, tid, at, EventKind::Lock { mutex, reacquire }, None);
        }
        advance(state, tid);
    }

    /// Hand a signalled waiter over to its mutex
    fn wake_waiter(&self, state: &mut ExecutionState, signaller: ThreadId, waiter: Waiter) {
        let clock = clock_of(state, signaller);
        merge_clock(state, waiter.thread, &clock);
        state.park_on_mutex(waiter.thread, waiter.mutex);
    }

    /// Resolve the operand of a join to a thread id
    fn join_target(
        &self,
        state: &mut ExecutionState,
        tid: ThreadId,
        at: Location,
        value: Value,
    ) -> Result<ThreadId, RuntimeErrorKind> {
        let raw = match value.as_int() {
            Some(raw) => raw,
            None => {
                let raw = self
                    .query()
                    .get_value(state.constraints(), &value.sym)
                    .map_err(|_| RuntimeErrorKind::InvalidOperand(at))?;
                state.add_constraint(Expr::eq(&value.sym, &Expr::int(raw)));
                raw
            }
        };
        let target = u32::try_from(raw)
            .ok()
            .map(ThreadId)
            .filter(|t| *t != tid && state.thread(*t).is_some())
            .ok_or(RuntimeErrorKind::InvalidJoinTarget(raw))?;
        Ok(target)
    }
}
