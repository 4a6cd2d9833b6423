//! Domain Layer - Execution Model, Scheduling and Trace Analysis
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Domain Layer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Program Model             Execution State                  │
//! │  ├─ Program / Builder      ├─ ExecutionState (branch/merge) │
//! │  ├─ Expr / Model           ├─ Thread / StackFrame           │
//! │  └─ Evaluator              ├─ Memory / InputSet             │
//! │                            └─ Mutex / Condition / Barrier   │
//! │                                                             │
//! │  Scheduling                Executor                         │
//! │  ├─ ArrivalOrder           ├─ step loop + Searcher          │
//! │  ├─ Preemptive             ├─ deadlock / replay mismatch    │
//! │  └─ Guided (Prefix)        └─ budgets + memory cap          │
//! │                                                             │
//! │  Trace Analysis            Run Repository                   │
//! │  ├─ Trace / TraceIndex     ├─ pending prefixes              │
//! │  ├─ TaintAnalysis          ├─ tested signatures             │
//! │  └─ TraceEncoder (flips)   └─ retired traces                │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The domain layer never talks to a concrete solver or the file system:
//! it sees the solver through [`solver::ConstraintSolver`] and hands
//! artifacts to the caller as plain values.

pub mod config;
pub mod encoder;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expr;
pub mod memory;
pub mod prefix;
pub mod program;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod solver;
pub mod state;
pub mod sync;
pub mod taint;
pub mod thread;
pub mod trace;
pub mod types;
pub mod vector_clock;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-exports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub use config::{EngineConfig, SearcherKind};
pub use encoder::{FlipOutcome, FlipReport, TraceEncoder};
pub use error::{
    Budget, CapacityError, EngineError, ProgramError, RuntimeErrorKind, SolverError, SyncError, TerminationReason,
};
pub use executor::{Executor, RetiredState, RunOutcome};
pub use expr::{Expr, Model};
pub use prefix::{Prefix, PrefixEntry};
pub use program::{ComputeOp, Operand, Program, ProgramBuilder};
pub use repository::{RetiredTrace, RunRepository};
pub use scheduler::{Scheduler, SchedulerKind};
pub use session::{RunStatistics, Session};
pub use solver::{ConstraintSolver, SatResult, SolverQuery, Validity};
pub use state::ExecutionState;
pub use sync::WaitQueuePolicy;
pub use thread::ThreadState;
pub use trace::{Event, EventKind, EventTag, Trace};
pub use types::{FunctionId, GlobalId, Location, StateId, SyncKey, ThreadId};
pub use vector_clock::VectorClock;
