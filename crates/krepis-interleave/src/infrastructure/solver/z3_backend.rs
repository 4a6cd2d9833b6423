//! Z3 backend
//!
//! Division and remainder by zero evaluate to 0, as in
//! [`Expr::eval`], instead of Z3's total definitions.

use crate::domain::error::SolverError;
use crate::domain::expr::{BinaryOp, CmpOp, Expr, ExprKind, Model, Sort};
use crate::domain::solver::{ConstraintSolver, SatResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use z3::ast::{Bool, BV};

const WIDTH: u32 = 64;

/// Backend over Z3's bit-vector theory
///
/// Stateless: every check builds a fresh solver on the calling thread's
/// context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Z3Solver;

impl Z3Solver {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

#[derive(Default)]
struct Vars {
    ints: BTreeMap<Arc<str>, BV>,
    bools: BTreeMap<Arc<str>, Bool>,
}

impl Vars {
    fn int(&mut self, name: &Arc<str>) -> BV {
        self.ints
            .entry(name.clone())
            .or_insert_with(|| BV::new_const(name.as_ref(), WIDTH))
            .clone()
    }

    fn bool(&mut self, name: &Arc<str>) -> Bool {
        self.bools
            .entry(name.clone())
            .or_insert_with(|| Bool::new_const(name.as_ref()))
            .clone()
    }
}

fn to_bv(e: &Expr, vars: &mut Vars) -> BV {
    match e.kind() {
        ExprKind::Int(v) => BV::from_i64(*v, WIDTH),
        ExprKind::Var(name, Sort::Int) => vars.int(name),
        ExprKind::Binary(op, a, b) => {
            let (a, b) = (to_bv(a, vars), to_bv(b, vars));
            match op {
                BinaryOp::Add => a.bvadd(&b),
                BinaryOp::Sub => a.bvsub(&b),
                BinaryOp::Mul => a.bvmul(&b),
                BinaryOp::Div => guard_zero(&b, &a.bvsdiv(&b)),
                BinaryOp::Rem => guard_zero(&b, &a.bvsrem(&b)),
                BinaryOp::BitAnd => a.bvand(&b),
                BinaryOp::BitOr => a.bvor(&b),
                BinaryOp::BitXor => a.bvxor(&b),
                BinaryOp::Shl => a.bvshl(&b.bvand(&BV::from_i64(63, WIDTH))),
                BinaryOp::Shr => a.bvashr(&b.bvand(&BV::from_i64(63, WIDTH))),
            }
        }
        ExprKind::Ite(c, t, f) => to_bool(c, vars).ite(&to_bv(t, vars), &to_bv(f, vars)),
        _ => to_bool(e, vars).ite(&BV::from_i64(1, WIDTH), &BV::from_i64(0, WIDTH)),
    }
}

fn guard_zero(divisor: &BV, result: &BV) -> BV {
    let zero = BV::from_i64(0, WIDTH);
    divisor.eq(&zero).ite(&zero, result)
}

/// Read a 64-bit numeral back as two's complement
fn numeral(v: &BV) -> Option<i64> {
    v.as_u64()
        .map(|u| i64::from_ne_bytes(u.to_ne_bytes()))
        .or_else(|| v.as_i64())
}

fn to_bool(e: &Expr, vars: &mut Vars) -> Bool {
    match e.kind() {
        ExprKind::Bool(b) => Bool::from_bool(*b),
        ExprKind::Var(name, Sort::Bool) => vars.bool(name),
        ExprKind::Cmp(op, a, b) => {
            let (a, b) = (to_bv(a, vars), to_bv(b, vars));
            match op {
                CmpOp::Eq => a.eq(&b),
                CmpOp::Ne => a.eq(&b).not(),
                CmpOp::Lt => a.bvslt(&b),
                CmpOp::Le => a.bvsle(&b),
                CmpOp::Gt => a.bvsgt(&b),
                CmpOp::Ge => a.bvsge(&b),
            }
        }
        ExprKind::Not(a) => to_bool(a, vars).not(),
        ExprKind::And(xs) => {
            let parts: Vec<Bool> = xs.iter().map(|x| to_bool(x, vars)).collect();
            Bool::and(&parts.iter().collect::<Vec<_>>())
        }
        ExprKind::Or(xs) => {
            let parts: Vec<Bool> = xs.iter().map(|x| to_bool(x, vars)).collect();
            Bool::or(&parts.iter().collect::<Vec<_>>())
        }
        _ => to_bv(e, vars).eq(&BV::from_i64(0, WIDTH)).not(),
    }
}

impl ConstraintSolver for Z3Solver {
    fn check(&self, assertions: &[Expr], timeout: Duration) -> Result<SatResult, SolverError> {
        let solver = z3::Solver::new();
        let mut params = z3::Params::new();
        params.set_u32("timeout", u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        solver.set_params(&params);

        let mut vars = Vars::default();
        for e in assertions {
            solver.assert(to_bool(&e.to_bool(), &mut vars));
        }

        match solver.check() {
            z3::SatResult::Unsat => {
                trace!(assertions = assertions.len(), "z3 unsat");
                Ok(SatResult::Unsat)
            }
            z3::SatResult::Unknown => {
                let reason = solver.get_reason_unknown().unwrap_or_default();
                if reason.contains("timeout") || reason.contains("canceled") {
                    Err(SolverError::Timeout(timeout))
                } else {
                    debug!(%reason, assertions = assertions.len(), "z3 unknown");
                    Ok(SatResult::Unknown(reason))
                }
            }
            z3::SatResult::Sat => {
                let Some(z3_model) = solver.get_model() else {
                    return Err(SolverError::Backend("sat without a model".into()));
                };
                trace!(assertions = assertions.len(), ints = vars.ints.len(), "z3 sat");
                let mut model = Model::default();
                for (name, v) in &vars.ints {
                    if let Some(value) = z3_model.eval(v, true).as_ref().and_then(numeral) {
                        model.set_int(name.clone(), value);
                    }
                }
                for (name, b) in &vars.bools {
                    if let Some(value) = z3_model.eval(b, true).and_then(|x| x.as_bool()) {
                        model.set_bool(name.clone(), value);
                    }
                }
                Ok(SatResult::Sat(model))
            }
        }
    }

    fn name(&self) -> &'static str {
        "z3"
    }
}
