//! State merging
//!
//! Two states that reached the same control point along different paths can
//! be folded into one whose values are selected by the path condition:
//!
//! ```text
//! A: common ∧ pA     x = 1          merged: common ∧ (pA ∨ pB)
//! B: common ∧ pB     x = 2                  x = ite(pA, 1, 2)
//! ```
//!
//! Merging requires identical program counters and call-stack shapes in
//! every thread, the same symbolic inputs, the same synchronization state
//! and traces of equal length. If any of these differ both states are left
//! untouched.

use super::ExecutionState;
use crate::domain::evaluator::Value;
use crate::domain::expr::Expr;
use crate::domain::memory::ConstraintSet;
use imbl::{OrdMap, OrdSet};
use tracing::debug;

fn compatible(a: &ExecutionState, b: &ExecutionState) -> bool {
    a.threads.len() == b.threads.len()
        && a
            .threads
            .iter()
            .zip(&b.threads)
            .all(|(x, y)| x.state() == y.state() && x.stack_shape() == y.stack_shape())
        && a.inputs.same_inputs(&b.inputs)
        && a.mutexes == b.mutexes
        && a.conditions == b.conditions
        && a.barriers == b.barriers
        && a.trace.len() == b.trace.len()
        && a.scheduler.items() == b.scheduler.items()
        && a.address_space.len() == b.address_space.len()
}

fn select(path: &Expr, mine: &Value, theirs: &Value) -> Value {
    if mine == theirs {
        return mine.clone();
    }
    Value::new(
        Expr::ite(path, &mine.sym, &theirs.sym),
        Expr::ite(path, &mine.trace, &theirs.trace),
    )
}

pub(super) fn merge_into(state: &mut ExecutionState, other: &ExecutionState) -> bool {
    if !compatible(state, other) {
        return false;
    }

    let (common, mine, theirs) = state.constraints.split_common(&other.constraints);
    let path_a = Expr::and(mine);
    let path_b = Expr::and(theirs);

    for (thread, peer) in state.threads_mut().iter_mut().zip(&other.threads) {
        for (frame, peer_frame) in thread.stack_mut().iter_mut().zip(peer.stack()) {
            for (reg, peer_reg) in frame.registers.iter_mut().zip(peer_frame.registers.iter()) {
                *reg = select(&path_a, reg, peer_reg);
            }
            for (arg, peer_arg) in frame.args.iter_mut().zip(peer_frame.args.iter()) {
                *arg = select(&path_a, arg, peer_arg);
            }
        }
        thread.clock_mut().merge(peer.clock());
    }

    let mut cells = OrdMap::new();
    for ((id, mine), (_, theirs)) in state.address_space.iter().zip(other.address_space.iter()) {
        let value = if mine == theirs {
            mine.clone()
        } else {
            Expr::ite(&path_a, mine, theirs)
        };
        cells.insert(*id, value);
    }
    let written: OrdSet<_> = state
        .address_space
        .written()
        .clone()
        .union(other.address_space.written().clone());
    state.address_space.replace_cells(cells, written);

    let mut constraints: ConstraintSet = common;
    constraints.add(Expr::or2(&path_a, &path_b));
    state.replace_constraints(constraints);
    state.add_weight(other.weight);

    debug!(into = %state.id, from = %other.id, "merged states");
    true
}
