//! Constraint Solver Interface
//!
//! # Overview
//!
//! The engine talks to a decision procedure through one narrow trait,
//! [`ConstraintSolver`], and a query façade, [`SolverQuery`], that phrases
//! the classic symbolic-execution questions on top of it:
//!
//! | Query | Solver call |
//! |-------|-------------|
//! | `must_be_true(pc, e)` | `check(pc ∧ ¬e)` is UNSAT |
//! | `may_be_true(pc, e)`  | `check(pc ∧ e)` is SAT |
//! | `evaluate(pc, e)`     | both of the above |
//! | `get_value(pc, e)`    | `e` under a model of `pc` |
//! | `get_initial_values`  | a model of `pc` restricted to inputs |
//!
//! Every call is synchronous and bounded by the session's solver timeout.
//! Queries over literal expressions are answered without a solver call.

use crate::domain::error::SolverError;
use crate::domain::expr::{Expr, Model};
use crate::domain::memory::ConstraintSet;
use crate::domain::session::Session;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Answer of one satisfiability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    /// Satisfiable, with a witness
    Sat(Model),
    /// Unsatisfiable
    Unsat,
    /// Undecided
    Unknown(String),
}

impl SatResult {
    /// Whether the result is `Sat`
    pub fn is_sat(&self) -> bool {
        matches!(self, Self::Sat(_))
    }
}

/// Decision procedure collaborator
pub trait ConstraintSolver: Send + Sync {
    /// Check the conjunction of `assertions`
    ///
    /// # Errors
    /// - `Timeout`: the check did not finish within `timeout`
    /// - `Backend`: the backend failed
    fn check(&self, assertions: &[Expr], timeout: Duration) -> Result<SatResult, SolverError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Three-valued answer of [`SolverQuery::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// True on every path
    True,
    /// False on every path
    False,
    /// Depends on the inputs
    Unknown,
}

/// Query façade binding a solver to a session
pub struct SolverQuery<'a> {
    solver: &'a dyn ConstraintSolver,
    session: &'a Session,
}

impl<'a> SolverQuery<'a> {
    /// Bind `solver` to `session` (timeout and statistics)
    pub fn new(solver: &'a dyn ConstraintSolver, session: &'a Session) -> Self {
        Self { solver, session }
    }

    /// Raw check with accounting
    pub fn check(&self, assertions: &[Expr]) -> Result<SatResult, SolverError> {
        let timeout = self.session.config().solver_timeout();
        let started = Instant::now();
        let result = self.solver.check(assertions, timeout);
        let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.session.record(|s| {
            s.solver_queries += 1;
            s.solver_time_us += elapsed;
        });
        if let Err(SolverError::Timeout(_)) = &result {
            warn!(backend = self.solver.name(), assertions = assertions.len(), "solver query timed out");
            self.session.record(|s| s.solver_timeouts += 1);
        }
        result
    }

    fn check_with(&self, pc: &ConstraintSet, extra: Expr) -> Result<SatResult, SolverError> {
        let mut assertions = pc.to_vec();
        assertions.push(extra);
        self.check(&assertions)
    }

    /// Whether `e` holds on every model of `pc`
    pub fn must_be_true(&self, pc: &ConstraintSet, e: &Expr) -> Result<bool, SolverError> {
        if let Some(b) = e.to_bool().as_bool() {
            return Ok(b);
        }
        match self.check_with(pc, Expr::not(e))? {
            SatResult::Unsat => Ok(true),
            SatResult::Sat(_) => Ok(false),
            SatResult::Unknown(reason) => Err(SolverError::Unknown(reason)),
        }
    }

    /// Whether `e` holds on some model of `pc`
    pub fn may_be_true(&self, pc: &ConstraintSet, e: &Expr) -> Result<bool, SolverError> {
        if let Some(b) = e.to_bool().as_bool() {
            return Ok(b);
        }
        match self.check_with(pc, e.to_bool())? {
            SatResult::Sat(_) => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown(reason) => Err(SolverError::Unknown(reason)),
        }
    }

    /// Classify `e` under `pc`
    pub fn evaluate(&self, pc: &ConstraintSet, e: &Expr) -> Result<Validity, SolverError> {
        if self.must_be_true(pc, e)? {
            Ok(Validity::True)
        } else if !self.may_be_true(pc, e)? {
            Ok(Validity::False)
        } else {
            Ok(Validity::Unknown)
        }
    }

    /// One feasible integer value of `e` under `pc`
    pub fn get_value(&self, pc: &ConstraintSet, e: &Expr) -> Result<i64, SolverError> {
        if let Some(v) = e.as_int() {
            return Ok(v);
        }
        Ok(e.eval(&self.model_of(pc)?).as_int())
    }

    /// A model of `pc` restricted to `inputs`; unconstrained inputs are 0
    pub fn get_initial_values(&self, pc: &ConstraintSet, inputs: &[Arc<str>]) -> Result<Model, SolverError> {
        let full = if pc.is_empty() { Model::default() } else { self.model_of(pc)? };
        let mut model = Model::default();
        for name in inputs {
            model.set_int(name.clone(), full.int(name).unwrap_or(0));
        }
        Ok(model)
    }

    fn model_of(&self, pc: &ConstraintSet) -> Result<Model, SolverError> {
        match self.check(&pc.to_vec())? {
            SatResult::Sat(model) => Ok(model),
            SatResult::Unsat => Err(SolverError::Backend("path condition is unsatisfiable".into())),
            SatResult::Unknown(reason) => Err(SolverError::Unknown(reason)),
        }
    }

    /// Backend name
    pub fn backend(&self) -> &'static str {
        self.solver.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::EngineConfig;
    use crate::infrastructure::solver::Z3Solver;

    #[test]
    fn test_query_forms() {
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let q = SolverQuery::new(&solver, &session);
        let x = Expr::int_var("x");
        let mut pc = ConstraintSet::new();
        pc.add(Expr::ge(&x, &Expr::int(3)));

        assert!(q.must_be_true(&pc, &Expr::gt(&x, &Expr::int(0))).unwrap());
        assert!(q.may_be_true(&pc, &Expr::eq(&x, &Expr::int(7))).unwrap());
        assert!(!q.may_be_true(&pc, &Expr::lt(&x, &Expr::int(2))).unwrap());
        assert_eq!(q.evaluate(&pc, &Expr::lt(&x, &Expr::int(5))).unwrap(), Validity::Unknown);
        assert!(q.get_value(&pc, &x).unwrap() >= 3);

        let model = q.get_initial_values(&pc, &[Arc::from("x"), Arc::from("y")]).unwrap();
        assert!(model.int("x").unwrap_or(0) >= 3);
        assert_eq!(model.int("y"), Some(0));
        assert!(session.stats().solver_queries >= 5);
    }

    #[test]
    fn test_literals_skip_the_solver() {
        let session = Session::new(EngineConfig::default());
        let solver = Z3Solver::new();
        let q = SolverQuery::new(&solver, &session);
        let pc = ConstraintSet::new();
        assert!(q.must_be_true(&pc, &Expr::tt()).unwrap());
        assert!(!q.may_be_true(&pc, &Expr::ff()).unwrap());
        assert_eq!(q.get_value(&pc, &Expr::int(4)).unwrap(), 4);
        assert_eq!(session.stats().solver_queries, 0);
    }
}
