//! Symbolic Expressions
//!
//! # Overview
//!
//! A small `Arc`-shared expression language over 64-bit integers and
//! booleans. It is the currency shared by the executor (symbolic register
//! values and path conditions), the trace recorder (the *trace expression*
//! of every read and written value), the encoder (order and match
//! constraints), and the solver backends.
//!
//! # Design Notes
//!
//! - `Expr` is a cheap `Arc` handle, so values can be shared freely between
//!   forked states.
//! - All constructors fold constants and apply a handful of local
//!   simplifications. `x + c1 + c2` collapses to `x + (c1 + c2)` so trace
//!   expressions of counter-style updates stay small.
//! - Integer arithmetic wraps. Division or remainder by zero is never folded
//!   and evaluates to 0, which keeps evaluation total.
//!
//! # Example
//!
//! ```rust
//! use krepis_interleave::domain::expr::{Expr, Model};
//!
//! let x = Expr::int_var("x");
//! let cond = Expr::lt(&Expr::add(&x, &Expr::int(1)), &Expr::int(10));
//!
//! let mut model = Model::default();
//! model.set_int("x", 3);
//! assert!(cond.eval(&model).as_bool());
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operators and Sorts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sort of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    /// 64-bit two's complement integer
    Int,
    /// Boolean
    Bool,
}

/// Integer-valued binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Wrapping addition
    Add,
    /// Wrapping subtraction
    Sub,
    /// Wrapping multiplication
    Mul,
    /// Signed division
    Div,
    /// Signed remainder
    Rem,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise xor
    BitXor,
    /// Left shift (amount masked to 6 bits)
    Shl,
    /// Arithmetic right shift (amount masked to 6 bits)
    Shr,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::BitAnd => "bvand",
            Self::BitOr => "bvor",
            Self::BitXor => "bvxor",
            Self::Shl => "shl",
            Self::Shr => "shr",
        }
    }

    /// Apply the operator to concrete operands
    ///
    /// Returns `None` for division or remainder by zero.
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        Some(match self {
            Self::Add => lhs.wrapping_add(rhs),
            Self::Sub => lhs.wrapping_sub(rhs),
            Self::Mul => lhs.wrapping_mul(rhs),
            Self::Div => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            Self::Rem => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            Self::BitAnd => lhs & rhs,
            Self::BitOr => lhs | rhs,
            Self::BitXor => lhs ^ rhs,
            Self::Shl => lhs.wrapping_shl((rhs & 63) as u32),
            Self::Shr => lhs.wrapping_shr((rhs & 63) as u32),
        })
    }
}

/// Integer comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// The operator whose truth value is the complement of this one
    pub const fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }

    /// The operator obtained by swapping the operands
    pub const fn swap(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Apply the comparison to concrete operands
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "distinct",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expression Nodes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Expression node
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    /// Integer literal
    Int(i64),
    /// Boolean literal
    Bool(bool),
    /// Free variable of the given sort
    Var(Arc<str>, Sort),
    /// Integer binary operation
    Binary(BinaryOp, Expr, Expr),
    /// Integer comparison (boolean valued)
    Cmp(CmpOp, Expr, Expr),
    /// Boolean negation
    Not(Expr),
    /// N-ary conjunction
    And(Vec<Expr>),
    /// N-ary disjunction
    Or(Vec<Expr>),
    /// If-then-else over either sort
    Ite(Expr, Expr, Expr),
}

/// Shared, immutable expression handle
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Expr(Arc<ExprKind>);

impl Expr {
    fn mk(kind: ExprKind) -> Self {
        Expr(Arc::new(kind))
    }

    /// Borrow the node
    #[inline]
    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    /// Pointer identity (cheap pre-check before structural equality)
    #[inline]
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ━━━ Leaves ━━━

    /// Integer literal
    pub fn int(value: i64) -> Self {
        Self::mk(ExprKind::Int(value))
    }

    /// Boolean literal
    pub fn bool(value: bool) -> Self {
        Self::mk(ExprKind::Bool(value))
    }

    /// `true`
    pub fn tt() -> Self {
        Self::bool(true)
    }

    /// `false`
    pub fn ff() -> Self {
        Self::bool(false)
    }

    /// Variable with an explicit sort
    pub fn var(name: impl Into<Arc<str>>, sort: Sort) -> Self {
        Self::mk(ExprKind::Var(name.into(), sort))
    }

    /// Integer variable
    pub fn int_var(name: impl Into<Arc<str>>) -> Self {
        Self::var(name, Sort::Int)
    }

    /// Boolean variable
    pub fn bool_var(name: impl Into<Arc<str>>) -> Self {
        Self::var(name, Sort::Bool)
    }

    // ━━━ Integer arithmetic ━━━

    /// Build a binary operation, folding constants
    pub fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
            if let Some(v) = op.apply(a, b) {
                return Self::int(v);
            }
        }
        let lhs = lhs.to_int();
        let rhs = rhs.to_int();
        match op {
            BinaryOp::Add => return Self::fold_add(&lhs, &rhs),
            BinaryOp::Sub => {
                if let Some(c) = rhs.as_int() {
                    return Self::fold_add(&lhs, &Self::int(c.wrapping_neg()));
                }
                if lhs == rhs {
                    return Self::int(0);
                }
            }
            BinaryOp::Mul => match (lhs.as_int(), rhs.as_int()) {
                (Some(0), _) | (_, Some(0)) => return Self::int(0),
                (Some(1), _) => return rhs,
                (_, Some(1)) => return lhs,
                _ => {}
            },
            BinaryOp::Div => {
                if rhs.as_int() == Some(1) {
                    return lhs;
                }
            }
            _ => {}
        }
        Self::mk(ExprKind::Binary(op, lhs, rhs))
    }

    fn fold_add(lhs: &Expr, rhs: &Expr) -> Self {
        match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => return Self::int(a.wrapping_add(b)),
            (Some(0), _) => return rhs.clone(),
            (_, Some(0)) => return lhs.clone(),
            (Some(_), None) => return Self::fold_add(rhs, lhs),
            _ => {}
        }
        if let Some(c2) = rhs.as_int() {
            if let ExprKind::Binary(BinaryOp::Add, inner, c1) = lhs.kind() {
                if let Some(c1) = c1.as_int() {
                    return Self::fold_add(inner, &Self::int(c1.wrapping_add(c2)));
                }
            }
        }
        Self::mk(ExprKind::Binary(BinaryOp::Add, lhs.clone(), rhs.clone()))
    }

    /// `lhs + rhs`
    pub fn add(lhs: &Expr, rhs: &Expr) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    /// `lhs - rhs`
    pub fn sub(lhs: &Expr, rhs: &Expr) -> Self {
        Self::binary(BinaryOp::Sub, lhs, rhs)
    }

    /// `lhs * rhs`
    pub fn mul(lhs: &Expr, rhs: &Expr) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    // ━━━ Comparisons ━━━

    /// Build a comparison, folding constants and syntactic identities
    pub fn cmp(op: CmpOp, lhs: &Expr, rhs: &Expr) -> Self {
        let lhs = lhs.to_int();
        let rhs = rhs.to_int();
        if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
            return Self::bool(op.apply(a, b));
        }
        if lhs == rhs {
            return Self::bool(matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Ge));
        }
        Self::mk(ExprKind::Cmp(op, lhs, rhs))
    }

    /// `lhs == rhs`
    pub fn eq(lhs: &Expr, rhs: &Expr) -> Self {
        if lhs.sort() == Sort::Bool && rhs.sort() == Sort::Bool {
            return Self::iff(lhs, rhs);
        }
        Self::cmp(CmpOp::Eq, lhs, rhs)
    }

    /// `lhs != rhs`
    pub fn ne(lhs: &Expr, rhs: &Expr) -> Self {
        Self::not(&Self::eq(lhs, rhs))
    }

    /// `lhs < rhs`
    pub fn lt(lhs: &Expr, rhs: &Expr) -> Self {
        Self::cmp(CmpOp::Lt, lhs, rhs)
    }

    /// `lhs <= rhs`
    pub fn le(lhs: &Expr, rhs: &Expr) -> Self {
        Self::cmp(CmpOp::Le, lhs, rhs)
    }

    /// `lhs > rhs`
    pub fn gt(lhs: &Expr, rhs: &Expr) -> Self {
        Self::cmp(CmpOp::Gt, lhs, rhs)
    }

    /// `lhs >= rhs`
    pub fn ge(lhs: &Expr, rhs: &Expr) -> Self {
        Self::cmp(CmpOp::Ge, lhs, rhs)
    }

    // ━━━ Boolean structure ━━━

    /// Negation (pushes through literals, double negation and comparisons)
    pub fn not(e: &Expr) -> Self {
        if e.sort() == Sort::Int {
            return Self::cmp(CmpOp::Eq, e, &Self::int(0));
        }
        match e.kind() {
            ExprKind::Bool(b) => Self::bool(!b),
            ExprKind::Not(inner) => inner.clone(),
            ExprKind::Cmp(op, l, r) => Self::mk(ExprKind::Cmp(op.negate(), l.clone(), r.clone())),
            _ => Self::mk(ExprKind::Not(e.clone())),
        }
    }

    /// Conjunction (flattens, drops `true`, short-circuits on `false`)
    pub fn and<I: IntoIterator<Item = Expr>>(items: I) -> Self {
        let mut out = Vec::new();
        for item in items {
            let item = item.to_bool();
            match item.kind() {
                ExprKind::Bool(true) => {}
                ExprKind::Bool(false) => return Self::ff(),
                ExprKind::And(inner) => out.extend(inner.iter().cloned()),
                _ => out.push(item),
            }
        }
        match out.len() {
            0 => Self::tt(),
            1 => out.swap_remove(0),
            _ => Self::mk(ExprKind::And(out)),
        }
    }

    /// Disjunction (flattens, drops `false`, short-circuits on `true`)
    pub fn or<I: IntoIterator<Item = Expr>>(items: I) -> Self {
        let mut out = Vec::new();
        for item in items {
            let item = item.to_bool();
            match item.kind() {
                ExprKind::Bool(false) => {}
                ExprKind::Bool(true) => return Self::tt(),
                ExprKind::Or(inner) => out.extend(inner.iter().cloned()),
                _ => out.push(item),
            }
        }
        match out.len() {
            0 => Self::ff(),
            1 => out.swap_remove(0),
            _ => Self::mk(ExprKind::Or(out)),
        }
    }

    /// Binary conjunction
    pub fn and2(a: &Expr, b: &Expr) -> Self {
        Self::and([a.clone(), b.clone()])
    }

    /// Binary disjunction
    pub fn or2(a: &Expr, b: &Expr) -> Self {
        Self::or([a.clone(), b.clone()])
    }

    /// `a => b`
    pub fn implies(a: &Expr, b: &Expr) -> Self {
        Self::or([Self::not(a), b.clone()])
    }

    /// `a <=> b`
    pub fn iff(a: &Expr, b: &Expr) -> Self {
        Self::and([Self::implies(a, b), Self::implies(b, a)])
    }

    /// If-then-else
    pub fn ite(cond: &Expr, then: &Expr, otherwise: &Expr) -> Self {
        let cond = cond.to_bool();
        match cond.as_bool() {
            Some(true) => return then.clone(),
            Some(false) => return otherwise.clone(),
            None => {}
        }
        if then == otherwise {
            return then.clone();
        }
        if then.sort() == Sort::Bool && otherwise.sort() == Sort::Bool {
            return Self::or([
                Self::and2(&cond, then),
                Self::and2(&Self::not(&cond), otherwise),
            ]);
        }
        Self::mk(ExprKind::Ite(cond, then.to_int(), otherwise.to_int()))
    }

    // ━━━ Sort coercions ━━━

    /// View as a boolean (`x != 0` for integers)
    pub fn to_bool(&self) -> Expr {
        match self.sort() {
            Sort::Bool => self.clone(),
            Sort::Int => Self::cmp(CmpOp::Ne, self, &Self::int(0)),
        }
    }

    /// View as an integer (`ite(b, 1, 0)` for booleans)
    pub fn to_int(&self) -> Expr {
        match self.sort() {
            Sort::Int => self.clone(),
            Sort::Bool => match self.as_bool() {
                Some(b) => Self::int(i64::from(b)),
                None => Self::mk(ExprKind::Ite(self.clone(), Self::int(1), Self::int(0))),
            },
        }
    }

    // ━━━ Inspection ━━━

    /// Sort of the expression
    pub fn sort(&self) -> Sort {
        match self.kind() {
            ExprKind::Int(_) | ExprKind::Binary(..) | ExprKind::Ite(..) => Sort::Int,
            ExprKind::Var(_, sort) => *sort,
            ExprKind::Bool(_)
            | ExprKind::Cmp(..)
            | ExprKind::Not(_)
            | ExprKind::And(_)
            | ExprKind::Or(_) => Sort::Bool,
        }
    }

    /// Integer literal value, if any
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean literal value, if any
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            ExprKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the expression is a literal
    #[inline]
    pub fn is_const(&self) -> bool {
        matches!(self.kind(), ExprKind::Int(_) | ExprKind::Bool(_))
    }

    /// Variable name, if the expression is a bare variable
    pub fn as_var(&self) -> Option<&Arc<str>> {
        match self.kind() {
            ExprKind::Var(name, _) => Some(name),
            _ => None,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self.kind() {
            ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Var(..) => Vec::new(),
            ExprKind::Binary(_, a, b) | ExprKind::Cmp(_, a, b) => vec![a, b],
            ExprKind::Not(a) => vec![a],
            ExprKind::And(xs) | ExprKind::Or(xs) => xs.iter().collect(),
            ExprKind::Ite(c, a, b) => vec![c, a, b],
        }
    }

    /// Collect free variable names into `out`
    pub fn collect_vars(&self, out: &mut BTreeSet<Arc<str>>) {
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            if let ExprKind::Var(name, _) = e.kind() {
                out.insert(name.clone());
            } else {
                stack.extend(e.children());
            }
        }
    }

    /// Free variable names
    pub fn vars(&self) -> BTreeSet<Arc<str>> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    /// Number of nodes (shared subtrees counted once per occurrence)
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Replace variables by expressions, re-folding as the tree is rebuilt
    pub fn substitute(&self, map: &HashMap<Arc<str>, Expr>) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        match self.kind() {
            ExprKind::Int(_) | ExprKind::Bool(_) => self.clone(),
            ExprKind::Var(name, _) => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            ExprKind::Binary(op, a, b) => Self::binary(*op, &a.substitute(map), &b.substitute(map)),
            ExprKind::Cmp(op, a, b) => Self::cmp(*op, &a.substitute(map), &b.substitute(map)),
            ExprKind::Not(a) => Self::not(&a.substitute(map)),
            ExprKind::And(xs) => Self::and(xs.iter().map(|x| x.substitute(map))),
            ExprKind::Or(xs) => Self::or(xs.iter().map(|x| x.substitute(map))),
            ExprKind::Ite(c, a, b) => {
                Self::ite(&c.substitute(map), &a.substitute(map), &b.substitute(map))
            }
        }
    }

    /// Evaluate under a model (unassigned variables default to 0 / false)
    pub fn eval(&self, model: &Model) -> ModelValue {
        match self.kind() {
            ExprKind::Int(v) => ModelValue::Int(*v),
            ExprKind::Bool(b) => ModelValue::Bool(*b),
            ExprKind::Var(name, Sort::Int) => ModelValue::Int(model.int(name).unwrap_or(0)),
            ExprKind::Var(name, Sort::Bool) => ModelValue::Bool(model.bool(name).unwrap_or(false)),
            ExprKind::Binary(op, a, b) => {
                let (a, b) = (a.eval(model).as_int(), b.eval(model).as_int());
                ModelValue::Int(op.apply(a, b).unwrap_or(0))
            }
            ExprKind::Cmp(op, a, b) => {
                ModelValue::Bool(op.apply(a.eval(model).as_int(), b.eval(model).as_int()))
            }
            ExprKind::Not(a) => ModelValue::Bool(!a.eval(model).as_bool()),
            ExprKind::And(xs) => ModelValue::Bool(xs.iter().all(|x| x.eval(model).as_bool())),
            ExprKind::Or(xs) => ModelValue::Bool(xs.iter().any(|x| x.eval(model).as_bool())),
            ExprKind::Ite(c, a, b) => {
                if c.eval(model).as_bool() {
                    a.eval(model)
                } else {
                    b.eval(model)
                }
            }
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Int(v) if *v < 0 => write!(f, "(- {})", v.unsigned_abs()),
            ExprKind::Int(v) => write!(f, "{v}"),
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Var(name, _) => write!(f, "{name}"),
            ExprKind::Binary(op, a, b) => write!(f, "({} {a} {b})", op.symbol()),
            ExprKind::Cmp(op, a, b) => write!(f, "({} {a} {b})", op.symbol()),
            ExprKind::Not(a) => write!(f, "(not {a})"),
            ExprKind::And(xs) | ExprKind::Or(xs) => {
                let head = if matches!(self.kind(), ExprKind::And(_)) { "and" } else { "or" };
                write!(f, "({head}")?;
                for x in xs {
                    write!(f, " {x}")?;
                }
                write!(f, ")")
            }
            ExprKind::Ite(c, a, b) => write!(f, "(ite {c} {a} {b})"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Models
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Concrete value produced by evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelValue {
    /// Integer result
    Int(i64),
    /// Boolean result
    Bool(bool),
}

impl ModelValue {
    /// Integer view (`true` is 1)
    pub fn as_int(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Bool(b) => i64::from(b),
        }
    }

    /// Boolean view (non-zero is `true`)
    pub fn as_bool(self) -> bool {
        match self {
            Self::Int(v) => v != 0,
            Self::Bool(b) => b,
        }
    }
}

/// Variable assignment returned by a satisfiable solver query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    ints: BTreeMap<Arc<str>, i64>,
    bools: BTreeMap<Arc<str>, bool>,
}

impl Model {
    /// Assign an integer variable
    pub fn set_int(&mut self, name: impl Into<Arc<str>>, value: i64) {
        self.ints.insert(name.into(), value);
    }

    /// Assign a boolean variable
    pub fn set_bool(&mut self, name: impl Into<Arc<str>>, value: bool) {
        self.bools.insert(name.into(), value);
    }

    /// Integer assignment, if present
    pub fn int(&self, name: &str) -> Option<i64> {
        self.ints.get(name).copied()
    }

    /// Boolean assignment, if present
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.bools.get(name).copied()
    }

    /// Number of assigned variables
    pub fn len(&self) -> usize {
        self.ints.len() + self.bools.len()
    }

    /// Whether nothing is assigned
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.bools.is_empty()
    }

    /// Substitution map turning every integer assignment into a literal
    pub fn as_substitution(&self) -> HashMap<Arc<str>, Expr> {
        self.ints
            .iter()
            .map(|(k, v)| (k.clone(), Expr::int(*v)))
            .chain(self.bools.iter().map(|(k, v)| (k.clone(), Expr::bool(*v))))
            .collect()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model:")?;
        for (name, value) in &self.ints {
            writeln!(f, "  {name} = {value}")?;
        }
        for (name, value) in &self.bools {
            writeln!(f, "  {name} = {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = Expr::add(&Expr::int(2), &Expr::int(3));
        assert_eq!(e.as_int(), Some(5));
        assert_eq!(Expr::lt(&Expr::int(1), &Expr::int(2)).as_bool(), Some(true));
        assert_eq!(Expr::mul(&Expr::int_var("x"), &Expr::int(0)).as_int(), Some(0));
    }

    #[test]
    fn test_add_chain_collapses() {
        let x = Expr::int_var("x");
        let e = Expr::add(&Expr::add(&x, &Expr::int(1)), &Expr::int(1));
        assert_eq!(e, Expr::add(&x, &Expr::int(2)));

        let e = Expr::sub(&Expr::add(&x, &Expr::int(5)), &Expr::int(5));
        assert_eq!(e, x);
    }

    #[test]
    fn test_division_by_zero_not_folded() {
        let e = Expr::binary(BinaryOp::Div, &Expr::int(4), &Expr::int(0));
        assert!(!e.is_const());
        assert_eq!(e.eval(&Model::default()), ModelValue::Int(0));
    }

    #[test]
    fn test_not_pushes_into_comparison() {
        let x = Expr::int_var("x");
        let e = Expr::not(&Expr::lt(&x, &Expr::int(3)));
        assert_eq!(e, Expr::ge(&x, &Expr::int(3)));
        assert_eq!(Expr::not(&Expr::not(&Expr::bool_var("b"))), Expr::bool_var("b"));
    }

    #[test]
    fn test_and_or_simplification() {
        let b = Expr::bool_var("b");
        assert_eq!(Expr::and([Expr::tt(), b.clone()]), b);
        assert_eq!(Expr::and([Expr::ff(), b.clone()]).as_bool(), Some(false));
        assert_eq!(Expr::or([Expr::ff(), b.clone()]), b);
        assert_eq!(Expr::or(Vec::<Expr>::new()).as_bool(), Some(false));
    }

    #[test]
    fn test_ite_and_eval() {
        let c = Expr::bool_var("c");
        let e = Expr::ite(&c, &Expr::int(10), &Expr::int(20));
        let mut m = Model::default();
        m.set_bool("c", true);
        assert_eq!(e.eval(&m).as_int(), 10);
        m.set_bool("c", false);
        assert_eq!(e.eval(&m).as_int(), 20);
    }

    #[test]
    fn test_vars_and_substitute() {
        let x = Expr::int_var("x");
        let y = Expr::int_var("y");
        let e = Expr::eq(&Expr::add(&x, &Expr::int(1)), &y);
        let vars = e.vars();
        assert_eq!(vars.len(), 2);

        let mut map = HashMap::new();
        map.insert(Arc::from("x"), Expr::int(4));
        map.insert(Arc::from("y"), Expr::int(5));
        assert_eq!(e.substitute(&map).as_bool(), Some(true));
    }

    #[test]
    fn test_display_smtlib() {
        let x = Expr::int_var("x");
        let e = Expr::le(&x, &Expr::int(-2));
        assert_eq!(e.to_string(), "(<= x (- 2))");
    }
}
