//! Execution State
//!
//! # Overview
//!
//! One [`ExecutionState`] is one point in the exploration tree: a complete
//! snapshot of a multi-threaded program under one path condition.
//!
//! ```text
//! ExecutionState
//! ├── AddressSpace      shared globals           (imbl::OrdMap)
//! ├── ConstraintSet     path condition           (imbl::Vector)
//! ├── SymbolicInputs    input descriptors        (Arc-shared)
//! ├── threads[]         arena indexed by ThreadId
//! ├── Scheduler         ready set + policy
//! ├── Mutex/Condition/BarrierManager
//! └── Trace             event log                (imbl::Vector)
//! ```
//!
//! # Invariants
//!
//! - Exactly one thread is current at any instant.
//! - The scheduler's ready set only contains non-terminated threads.
//! - A thread is schedulable iff it is `Runnable`, or `MutexBlocked` on a
//!   currently free mutex.
//! - `branch` conserves weight: `child + parent_after == parent_before`.

mod merge;

use crate::domain::error::{CapacityError, EngineError, ProgramError, TerminationReason};
use crate::domain::evaluator::Value;
use crate::domain::expr::Expr;
use crate::domain::memory::{AddressSpace, ConstraintSet, SymbolicInputs};
use crate::domain::program::Program;
use crate::domain::scheduler::Scheduler;
use crate::domain::sync::{BarrierManager, ConditionManager, MutexManager, WaitQueuePolicy};
use crate::domain::thread::{StackFrame, Thread, ThreadState};
use crate::domain::trace::Trace;
use crate::domain::types::{StateId, SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use std::fmt;

/// A snapshot of the program under one path condition
#[derive(Debug, Clone)]
pub struct ExecutionState {
    id: StateId,
    parent: Option<StateId>,
    weight: f64,
    depth: u32,
    address_space: AddressSpace,
    constraints: ConstraintSet,
    inputs: SymbolicInputs,
    threads: Vec<Thread>,
    current: ThreadId,
    scheduler: Scheduler,
    mutexes: MutexManager,
    conditions: ConditionManager,
    barriers: BarrierManager,
    trace: Trace,
    instructions: u64,
    max_threads: usize,
    pending: Option<TerminationReason>,
}

impl ExecutionState {
    /// Initial state: globals at their initial values, one thread at `entry`
    ///
    /// # Errors
    /// - `Program(MissingEntry)`: the entry function does not exist
    /// - `Capacity(ThreadLimit)`: `max_threads` is zero
    pub fn initial(
        id: StateId,
        program: &Program,
        scheduler: Scheduler,
        cond_policy: WaitQueuePolicy,
        max_threads: usize,
    ) -> Result<Self, EngineError> {
        let entry = program.entry();
        let function = program
            .function(entry)
            .ok_or(ProgramError::MissingEntry(entry))?;
        if max_threads == 0 {
            return Err(CapacityError::ThreadLimit { limit: 0 }.into());
        }
        let frame = StackFrame::new(entry, function.registers, Vec::new(), None);
        let main = Thread::new(ThreadId::MAIN, frame, VectorClock::with_capacity(max_threads.min(16)), None);
        let mut state = Self {
            id,
            parent: None,
            weight: 1.0,
            depth: 0,
            address_space: AddressSpace::from_program(program),
            constraints: ConstraintSet::new(),
            inputs: SymbolicInputs::default(),
            threads: vec![main],
            current: ThreadId::MAIN,
            scheduler,
            mutexes: MutexManager::new(),
            conditions: ConditionManager::new(cond_policy),
            barriers: BarrierManager::new(),
            trace: Trace::new(),
            instructions: 0,
            max_threads,
            pending: None,
        };
        state.scheduler.add_item(ThreadId::MAIN);
        Ok(state)
    }

    // ━━━ Identity ━━━

    /// State id
    #[inline]
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Parent state id (`None` for the initial state)
    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Exploration weight
    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Number of forks between the initial state and this one
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Fork: structural copy with half of this state's weight
    ///
    /// Threads, stacks and clocks are copied; thread ids are arena indices
    /// so the id remap is the identity. Stores and the trace are persistent
    /// and share structure with the parent.
    pub fn branch(&mut self, child_id: StateId) -> ExecutionState {
        let half = self.weight / 2.0;
        self.weight -= half;
        self.depth += 1;
        let mut child = self.clone();
        child.id = child_id;
        child.parent = Some(self.id);
        child.weight = half;
        child
    }

    /// Try to merge `other` into this state; see [`merge`](self::merge)
    pub fn merge(&mut self, other: &ExecutionState) -> bool {
        merge::merge_into(self, other)
    }

    // ━━━ Stores ━━━

    /// Shared globals
    pub fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }

    /// Mutable shared globals
    pub fn address_space_mut(&mut self) -> &mut AddressSpace {
        &mut self.address_space
    }

    /// Path condition
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Conjoin a path condition
    pub fn add_constraint(&mut self, constraint: Expr) {
        self.constraints.add(constraint);
    }

    /// Symbolic inputs
    pub fn inputs(&self) -> &SymbolicInputs {
        &self.inputs
    }

    /// Mutable symbolic inputs
    pub fn inputs_mut(&mut self) -> &mut SymbolicInputs {
        &mut self.inputs
    }

    /// Event log
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Mutable event log
    pub fn trace_mut(&mut self) -> &mut Trace {
        &mut self.trace
    }

    // ━━━ Threads ━━━

    /// All threads, indexed by id
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Thread by id
    pub fn thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.get(tid.as_index())
    }

    /// Mutable thread by id
    pub fn thread_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(tid.as_index())
    }

    /// Current thread id
    #[inline]
    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// Make `tid` current
    pub fn set_current(&mut self, tid: ThreadId) {
        self.current = tid;
    }

    /// Configured thread bound
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Allocate a thread created by `parent`
    ///
    /// The child starts with the parent's clock and is immediately ready.
    ///
    /// # Errors
    /// - `ThreadLimit`: the state already holds `max_threads` threads
    pub fn spawn_thread(&mut self, parent: ThreadId, frame: StackFrame) -> Result<ThreadId, CapacityError> {
        if self.threads.len() >= self.max_threads {
            return Err(CapacityError::ThreadLimit {
                limit: self.max_threads,
            });
        }
        let tid = ThreadId(u32::try_from(self.threads.len()).map_err(|_| CapacityError::ThreadLimit {
            limit: self.max_threads,
        })?);
        let clock = self
            .thread(parent)
            .map(|t| t.clock().clone())
            .unwrap_or_default();
        self.threads.push(Thread::new(tid, frame, clock, Some(parent)));
        self.scheduler.add_item(tid);
        Ok(tid)
    }

    /// Whether `tid` can execute now
    pub fn is_schedulable(&self, tid: ThreadId) -> bool {
        match self.thread(tid).map(Thread::state) {
            Some(ThreadState::Runnable) => true,
            Some(ThreadState::MutexBlocked(m)) => self.mutexes.is_available(m),
            _ => false,
        }
    }

    /// Move `tid` into a blocked state and out of the ready set
    pub fn block(&mut self, tid: ThreadId, state: ThreadState) {
        if let Some(t) = self.threads.get_mut(tid.as_index()) {
            t.set_state(state);
        }
        self.scheduler.remove_item(tid);
    }

    /// Make `tid` runnable and ready
    pub fn wake(&mut self, tid: ThreadId) {
        if let Some(t) = self.threads.get_mut(tid.as_index()) {
            if t.state().is_terminated() {
                return;
            }
            t.set_state(ThreadState::Runnable);
        }
        self.scheduler.add_item(tid);
    }

    /// Park `tid` waiting for `mutex`; it is ready again once `mutex` is free
    pub fn park_on_mutex(&mut self, tid: ThreadId, mutex: SyncKey) {
        if let Some(t) = self.threads.get_mut(tid.as_index()) {
            t.set_state(ThreadState::MutexBlocked(mutex));
        }
        self.mutexes.park(tid, mutex);
        if self.mutexes.is_available(mutex) {
            self.scheduler.add_item(tid);
        } else {
            self.scheduler.remove_item(tid);
        }
    }

    /// Re-queue every thread parked on `mutex` after it was released
    pub fn requeue_mutex_waiters(&mut self, mutex: SyncKey) {
        for tid in self.mutexes.waiters_of(mutex) {
            self.scheduler.add_item(tid);
        }
    }

    /// Terminate `tid`, waking every thread joining it
    pub fn terminate(&mut self, tid: ThreadId, exit_value: Option<Value>) {
        if let Some(t) = self.threads.get_mut(tid.as_index()) {
            t.set_exit_value(exit_value);
            t.set_state(ThreadState::Terminated);
        }
        self.scheduler.remove_item(tid);
        let joiners: Vec<ThreadId> = self
            .threads
            .iter()
            .filter(|t| t.state() == ThreadState::JoinBlocked(tid))
            .map(Thread::id)
            .collect();
        for joiner in joiners {
            self.wake(joiner);
        }
    }

    /// Whether every thread has terminated
    pub fn all_terminated(&self) -> bool {
        self.threads.iter().all(|t| t.state().is_terminated())
    }

    /// Non-terminated threads with their states
    pub fn live_threads(&self) -> Vec<(ThreadId, ThreadState)> {
        self.threads
            .iter()
            .filter(|t| !t.state().is_terminated())
            .map(|t| (t.id(), t.state()))
            .collect()
    }

    // ━━━ Scheduling & sync ━━━

    /// Scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Mutable scheduler
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Mutex manager
    pub fn mutexes(&self) -> &MutexManager {
        &self.mutexes
    }

    /// Mutable mutex manager
    pub fn mutexes_mut(&mut self) -> &mut MutexManager {
        &mut self.mutexes
    }

    /// Condition manager
    pub fn conditions(&self) -> &ConditionManager {
        &self.conditions
    }

    /// Barrier manager
    pub fn barriers(&self) -> &BarrierManager {
        &self.barriers
    }

    /// Mutable barrier manager
    pub fn barriers_mut(&mut self) -> &mut BarrierManager {
        &mut self.barriers
    }

    /// Condition manager together with the mutex manager it releases into
    pub fn condition_parts(&mut self) -> (&mut ConditionManager, &mut MutexManager) {
        (&mut self.conditions, &mut self.mutexes)
    }

    // ━━━ Bookkeeping ━━━

    /// Instructions executed by this state (inherited across forks)
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Count one executed instruction
    pub fn count_instruction(&mut self) {
        self.instructions += 1;
    }

    /// Termination scheduled for the next time the driver looks at the state
    pub fn pending_termination(&self) -> Option<&TerminationReason> {
        self.pending.as_ref()
    }

    /// Schedule retirement (used for error children of a fork)
    pub fn set_pending_termination(&mut self, reason: TerminationReason) {
        self.pending = Some(reason);
    }

    /// Take the scheduled retirement
    pub fn take_pending_termination(&mut self) -> Option<TerminationReason> {
        self.pending.take()
    }

    /// Rough footprint used by the memory cap
    pub fn approx_bytes(&self) -> usize {
        256 + self.address_space.approx_bytes()
            + self.constraints.approx_bytes()
            + self.threads.iter().map(Thread::approx_bytes).sum::<usize>()
            + self.trace.approx_bytes()
    }

    pub(crate) fn threads_mut(&mut self) -> &mut [Thread] {
        &mut self.threads
    }

    pub(crate) fn replace_constraints(&mut self, constraints: ConstraintSet) {
        self.constraints = constraints;
    }

    pub(crate) fn add_weight(&mut self, weight: f64) {
        self.weight += weight;
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (w={:.4}, threads={}, events={}, pc={})",
            self.id,
            self.weight,
            self.threads.len(),
            self.trace.len(),
            self.constraints.len()
        )
    }
}
