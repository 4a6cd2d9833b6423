//! Instruction-Level Evaluation
//!
//! Computing the symbolic result of one arithmetic or comparison operation
//! is delegated to an [`Evaluator`]. The engine only needs the resulting
//! [`Value`] and, for partial operations such as division, a guard that must
//! hold for the operation to be defined.
//!
//! Every value carries two expressions:
//!
//! - `sym`: the symbolic value over program inputs, used for path conditions
//! - `trace`: the same computation over *read-event variables*, used by the
//!   trace encoder to express data flow between reads and writes

use crate::domain::error::RuntimeErrorKind;
use crate::domain::expr::{BinaryOp, Expr};
use crate::domain::program::ComputeOp;

/// Register or memory value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// Symbolic value over program inputs
    pub sym: Expr,
    /// Value over read-event variables and inputs
    pub trace: Expr,
}

impl Value {
    /// Concrete integer (same expression in both views)
    pub fn concrete(v: i64) -> Self {
        let e = Expr::int(v);
        Self {
            sym: e.clone(),
            trace: e,
        }
    }

    /// Build from both views
    pub fn new(sym: Expr, trace: Expr) -> Self {
        Self { sym, trace }
    }

    /// Value whose two views coincide (inputs, constants)
    pub fn uniform(e: Expr) -> Self {
        Self {
            sym: e.clone(),
            trace: e,
        }
    }

    /// Concrete integer value, if the symbolic view is a literal
    pub fn as_int(&self) -> Option<i64> {
        self.sym.as_int().or_else(|| self.sym.as_bool().map(i64::from))
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::concrete(0)
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Computed {
    /// Total operation
    Value(Value),
    /// Partial operation: `value` is only meaningful when `guard` holds,
    /// otherwise the program hits `error`
    Guarded {
        /// Result when defined
        value: Value,
        /// Condition under which the operation is defined
        guard: Expr,
        /// Error raised when the guard can fail
        error: RuntimeErrorKind,
    },
}

/// Instruction-level evaluator collaborator
pub trait Evaluator: Send + Sync {
    /// Compute `lhs op rhs`
    fn compute(&self, op: ComputeOp, lhs: &Value, rhs: &Value) -> Computed;

    /// Backend name for logs
    fn name(&self) -> &'static str {
        "evaluator"
    }
}

/// Default evaluator over wrapping 64-bit integer arithmetic
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticEvaluator;

impl ArithmeticEvaluator {
    fn apply(op: ComputeOp, lhs: &Expr, rhs: &Expr) -> Expr {
        match op {
            ComputeOp::Binary(b) => Expr::binary(b, lhs, rhs),
            ComputeOp::Compare(c) => Expr::cmp(c, lhs, rhs),
            ComputeOp::LogicalAnd => Expr::and2(&lhs.to_bool(), &rhs.to_bool()),
            ComputeOp::LogicalOr => Expr::or2(&lhs.to_bool(), &rhs.to_bool()),
        }
    }
}

impl Evaluator for ArithmeticEvaluator {
    fn compute(&self, op: ComputeOp, lhs: &Value, rhs: &Value) -> Computed {
        let value = Value::new(
            Self::apply(op, &lhs.sym, &rhs.sym),
            Self::apply(op, &lhs.trace, &rhs.trace),
        );
        match op {
            ComputeOp::Binary(BinaryOp::Div | BinaryOp::Rem) => {
                let guard = Expr::ne(&rhs.sym, &Expr::int(0));
                if guard.as_bool() == Some(true) {
                    Computed::Value(value)
                } else {
                    Computed::Guarded {
                        value,
                        guard,
                        error: RuntimeErrorKind::DivisionByZero,
                    }
                }
            }
            _ => Computed::Value(value),
        }
    }

    fn name(&self) -> &'static str {
        "arithmetic"
    }
}
