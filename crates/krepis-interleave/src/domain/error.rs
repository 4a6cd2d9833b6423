//! Error Taxonomy
//!
//! Every fatal condition is an explicit value so the driver can retire a
//! single state instead of aborting the process:
//!
//! | Class | Type | Bug in program under test? |
//! |-------|------|----------------------------|
//! | (a) solver timeout | [`TerminationReason::SolverTimeout`] | yes |
//! | (b) runtime error | [`RuntimeErrorKind`] | yes |
//! | (c) deadlock | [`RuntimeErrorKind::Deadlock`] | yes |
//! | (d) replay mismatch | [`TerminationReason::ReplayMismatch`] | no |
//! | (e) capacity | [`CapacityError`], [`TerminationReason::MemoryCap`] | no |

use crate::domain::thread::ThreadState;
use crate::domain::types::{FunctionId, GlobalId, Location, SyncKey, ThreadId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Misuse of a synchronization primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// `cond_wait` on a mutex that was never locked
    #[error("cond {cond}: mutex {mutex} is undefined")]
    MutexUndefined {
        /// Condition variable
        cond: SyncKey,
        /// Mutex passed to the wait
        mutex: SyncKey,
    },

    /// `cond_wait` by a thread that does not own the mutex
    #[error("cond {cond}: {thread} does not own mutex {mutex}")]
    MutexNotOwned {
        /// Condition variable
        cond: SyncKey,
        /// Mutex passed to the wait
        mutex: SyncKey,
        /// Calling thread
        thread: ThreadId,
    },

    /// `barrier_wait` before `barrier_init`
    #[error("barrier {0} is not initialized")]
    BarrierUninitialized(SyncKey),

    /// `barrier_init` with a zero count
    #[error("barrier {0} initialized with count 0")]
    BarrierZeroCount(SyncKey),

    /// `barrier_init` while threads are waiting
    #[error("barrier {0} re-initialized with waiters pending")]
    BarrierBusy(SyncKey),
}

/// Engine capacity limits (class (e))
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// Thread-id allocation exceeded the configured bound
    #[error("thread limit of {limit} exceeded")]
    ThreadLimit {
        /// Configured maximum number of threads per state
        limit: usize,
    },
}

/// Runtime errors of the program under test (classes (b) and (c))
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    /// Access to a global that does not exist
    #[error("out-of-bounds access to global {0}")]
    OutOfBounds(GlobalId),

    /// Division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Store to a read-only global
    #[error("write to read-only global {0}")]
    WriteToReadOnly(GlobalId),

    /// Call or thread-create with an unknown function
    #[error("invalid function {0}")]
    InvalidFunction(FunctionId),

    /// Call with fewer arguments than the callee declares
    #[error("too few arguments to {function}: expected {expected}, got {got}")]
    TooFewArguments {
        /// Callee
        function: FunctionId,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// Read of a register or argument slot the frame does not have
    #[error("invalid operand at {0}")]
    InvalidOperand(Location),

    /// Call depth exceeded `max_stack_depth`
    #[error("stack overflow at depth {0}")]
    StackOverflow(usize),

    /// An `Assert` instruction can fail
    #[error("assertion failed at {location}: {message}")]
    AssertionFailed {
        /// Location of the assertion
        location: Location,
        /// Message attached to the assertion
        message: String,
    },

    /// Join on a thread id that does not name another live-or-dead thread
    #[error("invalid join target {0}")]
    InvalidJoinTarget(i64),

    /// Misuse of a synchronization primitive
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// No thread can make progress
    #[error("deadlock: {}", DeadlockDisplay(.blocked))]
    Deadlock {
        /// Every non-terminated thread with its blocked state
        blocked: Vec<(ThreadId, ThreadState)>,
    },
}

struct DeadlockDisplay<'a>(&'a [(ThreadId, ThreadState)]);

impl fmt::Display for DeadlockDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (tid, state)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{tid} {state}")?;
        }
        Ok(())
    }
}

/// Solver failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// The query did not finish within its timeout
    #[error("solver timeout after {0:?}")]
    Timeout(Duration),

    /// The backend could not decide the query
    #[error("solver returned unknown: {0}")]
    Unknown(String),

    /// The backend failed
    #[error("solver backend error: {0}")]
    Backend(String),
}

/// Malformed program representation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// Entry function is not defined
    #[error("entry function {0} is not defined")]
    MissingEntry(FunctionId),

    /// Function declared but never given a body
    #[error("function {0} was declared but not defined")]
    UndefinedFunction(String),

    /// Branch or jump outside the function body
    #[error("{function}: jump target {target} out of range at pc {pc}")]
    TargetOutOfRange {
        /// Function name
        function: String,
        /// Instruction index
        pc: usize,
        /// Offending target
        target: usize,
    },

    /// Register index beyond the frame size
    #[error("{function}: register r{register} out of range at pc {pc}")]
    RegisterOutOfRange {
        /// Function name
        function: String,
        /// Instruction index
        pc: usize,
        /// Offending register
        register: u16,
    },

    /// Two globals share a name
    #[error("duplicate global {0}")]
    DuplicateGlobal(String),
}

/// Budget that forced a state to retire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Per-state instruction budget
    Instructions,
    /// Global fork budget
    Forks,
    /// Wall-clock budget
    Time,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instructions => "instructions",
            Self::Forks => "forks",
            Self::Time => "time",
        };
        write!(f, "{name}")
    }
}

/// Why an execution state was retired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Every thread reached `Terminated`
    Completed,
    /// Class (a): a solver query timed out or was undecidable
    SolverTimeout(SolverError),
    /// Classes (b) and (c)
    RuntimeError(RuntimeErrorKind),
    /// Class (d): the executed schedule diverged from the bound prefix
    ReplayMismatch {
        /// Expected thread and location
        expected: String,
        /// Thread and location about to execute
        found: String,
    },
    /// A configured budget ran out
    BudgetExceeded(Budget),
    /// Class (e): retired by the memory cap
    MemoryCap,
    /// Class (e): thread limit or similar
    Capacity(CapacityError),
    /// The session halt flag was raised
    Halted,
}

impl TerminationReason {
    /// Whether this retirement reports a bug in the program under test
    pub fn is_bug(&self) -> bool {
        matches!(self, Self::SolverTimeout(_) | Self::RuntimeError(_))
    }

    /// Whether this retirement is a deadlock
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::RuntimeError(RuntimeErrorKind::Deadlock { .. }))
    }

    /// Short tag for logs and artifacts
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SolverTimeout(_) => "solver-timeout",
            Self::RuntimeError(RuntimeErrorKind::Deadlock { .. }) => "deadlock",
            Self::RuntimeError(_) => "runtime-error",
            Self::ReplayMismatch { .. } => "replay-mismatch",
            Self::BudgetExceeded(_) => "budget",
            Self::MemoryCap => "memory-cap",
            Self::Capacity(_) => "capacity",
            Self::Halted => "halted",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::SolverTimeout(e) => write!(f, "{e}"),
            Self::RuntimeError(e) => write!(f, "runtime error: {e}"),
            Self::ReplayMismatch { expected, found } => {
                write!(f, "replay mismatch: expected {expected}, found {found}")
            }
            Self::BudgetExceeded(b) => write!(f, "{b} budget exceeded"),
            Self::MemoryCap => write!(f, "terminated by memory cap"),
            Self::Capacity(e) => write!(f, "{e}"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed program
    #[error("program error: {0}")]
    Program(#[from] ProgramError),

    /// Solver failure outside a state (e.g. while encoding)
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Capacity limit hit while building the initial state
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
