//! Krepis Interleave - Systematic Testing of Multi-threaded Programs
//!
//! # Overview
//!
//! `krepis-interleave` symbolically executes a program over a small
//! register-machine IR and explores both data-dependent branches and
//! thread interleavings. Every run records a trace; the trace encoder turns
//! it into ordering and read-matching constraints and asks the solver
//! whether some other interleaving would reverse a branch or an assertion.
//! Each satisfiable flip becomes a prefix that the next run replays under a
//! guided scheduler.
//!
//! # Trinity Architecture
//!
//! - **Domain**: execution model, schedulers, sync managers, executor,
//!   trace encoder, taint reduction, run repository
//! - **Infrastructure**: constraint backends, config files, artifacts
//! - **Adapters**: the [`Engine`] driving the explore/replay loop
//!
//! # Runtime Laws (Invariants)
//!
//! ## Scheduling
//! - Exactly one thread of a state is current at a time
//! - A scheduler's ready set only holds non-terminated threads
//!
//! ## Synchronization
//! - A mutex has at most one owner
//! - A barrier of count N releases exactly N arrivals per generation
//!
//! ## Ordering
//! - A thread's own clock component only grows on its own events
//! - Replaying a prefix reproduces its steps up to its length
//!
//! # Usage
//!
//! ```rust
//! use krepis_interleave::{Engine, EngineConfig};
//! use krepis_interleave::domain::program::{ComputeOp, Operand, ProgramBuilder};
//!
//! let mut p = ProgramBuilder::new();
//! let x = p.global("x", 0);
//! let main = p.declare("main", 0);
//! let worker = p.declare("worker", 0);
//! p.define(worker, |f| {
//!     let v = f.load(x);
//!     let v1 = f.compute(ComputeOp::Add, Operand::Reg(v), Operand::Const(1));
//!     f.store(x, Operand::Reg(v1));
//!     f.ret(None);
//! });
//! p.define(main, |f| {
//!     let a = f.spawn(worker, Operand::Const(0));
//!     let b = f.spawn(worker, Operand::Const(0));
//!     f.join(Operand::Reg(a));
//!     f.join(Operand::Reg(b));
//!     let v = f.load(x);
//!     let ok = f.compute(ComputeOp::Eq, Operand::Reg(v), Operand::Const(2));
//!     f.assert(Operand::Reg(ok), "x == 2");
//!     f.ret(None);
//! });
//!
//! let mut engine = Engine::new(p.build(main).unwrap(), EngineConfig::default()).unwrap();
//! let report = engine.explore().unwrap();
//! assert!(report.has_bugs());
//! ```
//!
//! # Constraint Backend
//!
//! Queries go to Z3 (`infrastructure::Z3Solver`) over 64-bit bit-vectors;
//! the `z3` crate links against the system `libz3`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// Trinity Architecture Layers
pub mod adapters;
pub mod domain;
pub mod infrastructure;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-export Primary Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// Engine
pub use adapters::{Bug, Engine, ExplorationReport};

// Configuration and statistics
pub use domain::{EngineConfig, RunStatistics, SchedulerKind, SearcherKind, WaitQueuePolicy};

// Errors
pub use domain::{EngineError, RuntimeErrorKind, TerminationReason};

// Program model and traces
pub use domain::{Prefix, PrefixEntry, Program, ProgramBuilder, Trace};

// Solver backends
pub use infrastructure::{default_solver, Z3Solver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
