//! Constraint backends
//!
//! # Overview
//!
//! [`Z3Solver`] decides every query the engine asks: path-condition checks
//! during execution and flip queries over encoded traces.
//!
//! ```text
//! Expr ──translate──▶ z3::ast::{Bool, BV} ──check──▶ z3::Model ──read back──▶ Model
//!                     (64-bit bit-vectors)
//! ```
//!
//! Integers are 64-bit bit-vectors, so wrapping arithmetic, bitwise
//! operators and shifts agree with concrete evaluation. Other backends plug
//! in through [`ConstraintSolver`].

mod z3_backend;

pub use z3_backend::Z3Solver;

use crate::domain::solver::ConstraintSolver;

/// Backend the engine uses unless told otherwise
pub fn default_solver() -> Box<dyn ConstraintSolver> {
    Box::new(Z3Solver::new())
}
