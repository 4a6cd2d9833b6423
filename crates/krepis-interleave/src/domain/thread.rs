//! Simulated Threads
//!
//! # Lifecycle
//!
//! ```text
//!            ┌──────────── MutexBlocked(m) ◄──── lock contended / cond woken
//!            │                  │ re-lock succeeds
//!            ▼                  ▼
//! create ─► Runnable ◄──────────┴──── CondBlocked / BarrierBlocked / JoinBlocked
//!            │
//!            └─ return from initial frame ─► Terminated (never resurrected)
//! ```
//!
//! A thread is *schedulable* iff it is `Runnable`, or `MutexBlocked` on a
//! mutex that is currently free.
//!
//! Threads never hold a pointer to the address space they share with their
//! siblings: the owning [`ExecutionState`](crate::domain::state::ExecutionState)
//! passes it in when a thread executes.

use crate::domain::error::RuntimeErrorKind;
use crate::domain::evaluator::Value;
use crate::domain::program::{Operand, Reg};
use crate::domain::types::{FunctionId, Location, SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use imbl::Vector;
use std::fmt;

/// Thread lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Ready to execute
    Runnable,
    /// Waiting to (re)acquire a mutex
    MutexBlocked(SyncKey),
    /// Waiting on a condition variable
    CondBlocked {
        /// Condition waited on
        cond: SyncKey,
        /// Mutex to re-acquire after wake-up
        mutex: SyncKey,
    },
    /// Waiting at a barrier
    BarrierBlocked(SyncKey),
    /// Waiting for another thread to terminate
    JoinBlocked(ThreadId),
    /// Finished (terminal)
    Terminated,
}

impl ThreadState {
    /// Check if the thread can execute its next instruction
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Runnable)
    }

    /// Check if the thread is in any blocked state
    #[inline]
    pub fn is_blocked(&self) -> bool {
        !matches!(self, Self::Runnable | Self::Terminated)
    }

    /// Check if the thread has finished
    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runnable => write!(f, "runnable"),
            Self::MutexBlocked(m) => write!(f, "mutex-blocked({m})"),
            Self::CondBlocked { cond, mutex } => write!(f, "cond-blocked({cond}, {mutex})"),
            Self::BarrierBlocked(b) => write!(f, "barrier-blocked({b})"),
            Self::JoinBlocked(t) => write!(f, "join-blocked({t})"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// One activation record
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Executing function
    pub function: FunctionId,
    /// Index of the next instruction
    pub pc: usize,
    /// Register file
    pub registers: Vector<Value>,
    /// Arguments passed by the caller
    pub args: Vector<Value>,
    /// Caller register receiving the return value
    pub return_to: Option<Reg>,
}

impl StackFrame {
    /// Fresh frame at pc 0 with zeroed registers
    pub fn new(function: FunctionId, registers: usize, args: Vec<Value>, return_to: Option<Reg>) -> Self {
        Self {
            function,
            pc: 0,
            registers: std::iter::repeat(Value::default()).take(registers).collect(),
            args: args.into_iter().collect(),
            return_to,
        }
    }

    /// Current location
    #[inline]
    pub fn location(&self) -> Location {
        Location::new(self.function, self.pc)
    }
}

/// A simulated thread
#[derive(Debug, Clone)]
pub struct Thread {
    id: ThreadId,
    state: ThreadState,
    stack: Vec<StackFrame>,
    clock: VectorClock,
    parent: Option<ThreadId>,
    exit_value: Option<Value>,
}

impl Thread {
    /// Create a runnable thread whose initial frame runs `entry`
    pub fn new(id: ThreadId, entry: StackFrame, clock: VectorClock, parent: Option<ThreadId>) -> Self {
        Self {
            id,
            state: ThreadState::Runnable,
            stack: vec![entry],
            clock,
            parent,
            exit_value: None,
        }
    }

    /// Thread id
    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Lifecycle state
    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Change lifecycle state
    pub(crate) fn set_state(&mut self, state: ThreadState) {
        debug_assert!(!self.state.is_terminated() || state.is_terminated(), "thread resurrected");
        self.state = state;
    }

    /// Creating thread (`None` for the initial thread)
    pub fn parent(&self) -> Option<ThreadId> {
        self.parent
    }

    /// Vector clock
    #[inline]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Mutable vector clock
    #[inline]
    pub fn clock_mut(&mut self) -> &mut VectorClock {
        &mut self.clock
    }

    /// Tick this thread's own clock component
    pub fn tick(&mut self) {
        self.clock.tick(self.id);
    }

    /// Call stack, innermost frame last
    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut [StackFrame] {
        &mut self.stack
    }

    /// Innermost frame
    pub fn frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    /// Mutable innermost frame
    pub fn frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.stack.last_mut()
    }

    /// Location of the next instruction (`None` once the stack is empty)
    pub fn location(&self) -> Option<Location> {
        self.frame().map(StackFrame::location)
    }

    /// Advance the program counter of the innermost frame
    pub fn advance(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.pc += 1;
        }
    }

    /// Set the program counter of the innermost frame
    pub fn jump(&mut self, pc: usize) {
        if let Some(frame) = self.stack.last_mut() {
            frame.pc = pc;
        }
    }

    /// Push a callee frame
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.stack.push(frame);
    }

    /// Pop the innermost frame
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.stack.pop()
    }

    /// Call depth
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Value returned from the initial frame
    pub fn exit_value(&self) -> Option<&Value> {
        self.exit_value.as_ref()
    }

    pub(crate) fn set_exit_value(&mut self, value: Option<Value>) {
        self.exit_value = value;
    }

    /// Read an operand in the innermost frame
    pub fn operand(&self, op: Operand) -> Result<Value, RuntimeErrorKind> {
        let frame = self
            .frame()
            .ok_or(RuntimeErrorKind::InvalidOperand(Location::new(FunctionId(u32::MAX), 0)))?;
        let invalid = || RuntimeErrorKind::InvalidOperand(frame.location());
        match op {
            Operand::Const(v) => Ok(Value::concrete(v)),
            Operand::Reg(r) => frame.registers.get(usize::from(r.0)).cloned().ok_or_else(invalid),
            Operand::Arg(i) => frame.args.get(usize::from(i)).cloned().ok_or_else(invalid),
        }
    }

    /// Write a register in the innermost frame
    pub fn set_register(&mut self, reg: Reg, value: Value) -> Result<(), RuntimeErrorKind> {
        let frame = self
            .stack
            .last_mut()
            .ok_or(RuntimeErrorKind::InvalidOperand(Location::new(FunctionId(u32::MAX), 0)))?;
        let location = frame.location();
        let slot = frame
            .registers
            .get_mut(usize::from(reg.0))
            .ok_or(RuntimeErrorKind::InvalidOperand(location))?;
        *slot = value;
        Ok(())
    }

    /// Shape of the stack: (function, pc) per frame
    pub fn stack_shape(&self) -> Vec<Location> {
        self.stack.iter().map(StackFrame::location).collect()
    }

    /// Rough footprint used by the memory cap
    pub fn approx_bytes(&self) -> usize {
        let frames: usize = self
            .stack
            .iter()
            .map(|f| 64 + (f.registers.len() + f.args.len()) * 48)
            .sum();
        frames + self.clock.heap_size() + 64
    }
}
