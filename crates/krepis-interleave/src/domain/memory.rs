//! Persistent State Stores
//!
//! The address space, the path-condition store and the symbolic-input set of
//! an execution state. All three sit on `imbl` structures so forking a state
//! shares every unchanged subtree with its parent.
//!
//! ```text
//! parent ──┬── AddressSpace (OrdMap)   ◄── shared until written
//!          ├── ConstraintSet (Vector)  ◄── shared prefix of path conditions
//!          └── SymbolicInputs (OrdMap<_, Arc<InputDescriptor>>)
//! fork() ──┘   O(1) clone, O(log n) first write
//! ```

use crate::domain::expr::Expr;
use crate::domain::program::Program;
use crate::domain::types::{GlobalId, Location, ThreadId};
use imbl::{OrdMap, OrdSet, Vector};
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Address Space
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Word-granular shared memory of one execution state
#[derive(Debug, Clone)]
pub struct AddressSpace {
    cells: OrdMap<GlobalId, Expr>,
    read_only: OrdSet<GlobalId>,
    written: OrdSet<GlobalId>,
}

impl AddressSpace {
    /// Initialize every global of `program` to its initial value
    pub fn from_program(program: &Program) -> Self {
        let mut cells = OrdMap::new();
        let mut read_only = OrdSet::new();
        for g in program.globals() {
            cells.insert(g.id, Expr::int(g.initial));
            if g.read_only {
                read_only.insert(g.id);
            }
        }
        Self {
            cells,
            read_only,
            written: OrdSet::new(),
        }
    }

    /// Current symbolic content of a global
    pub fn read(&self, global: GlobalId) -> Option<&Expr> {
        self.cells.get(&global)
    }

    /// Whether `global` exists
    pub fn contains(&self, global: GlobalId) -> bool {
        self.cells.contains_key(&global)
    }

    /// Whether stores to `global` are forbidden
    pub fn is_read_only(&self, global: GlobalId) -> bool {
        self.read_only.contains(&global)
    }

    /// Overwrite a global
    pub fn write(&mut self, global: GlobalId, value: Expr) {
        self.cells.insert(global, value);
        self.written.insert(global);
    }

    /// Globals written at least once in this state's history
    pub fn written(&self) -> &OrdSet<GlobalId> {
        &self.written
    }

    /// Iterate over all cells
    pub fn iter(&self) -> impl Iterator<Item = (&GlobalId, &Expr)> {
        self.cells.iter()
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the address space is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Rough footprint used by the memory cap
    pub fn approx_bytes(&self) -> usize {
        self.cells
            .values()
            .map(|e| 48 + e.node_count() * 40)
            .sum::<usize>()
    }

    /// Replace the whole cell map (merge support)
    pub(crate) fn replace_cells(&mut self, cells: OrdMap<GlobalId, Expr>, written: OrdSet<GlobalId>) {
        self.cells = cells;
        self.written = written;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path Conditions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conjunction of path conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: Vector<Expr>,
}

impl ConstraintSet {
    /// Empty (trivially true) set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint; literal `true` is dropped
    pub fn add(&mut self, constraint: Expr) {
        let c = constraint.to_bool();
        if c.as_bool() != Some(true) {
            self.constraints.push_back(c);
        }
    }

    /// Whether a literal `false` was added
    pub fn is_trivially_false(&self) -> bool {
        self.constraints.iter().any(|c| c.as_bool() == Some(false))
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.constraints.iter()
    }

    /// Constraints as a vector (solver input)
    pub fn to_vec(&self) -> Vec<Expr> {
        self.constraints.iter().cloned().collect()
    }

    /// Single conjunction
    pub fn conjunction(&self) -> Expr {
        Expr::and(self.constraints.iter().cloned())
    }

    /// Number of constraints
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether no constraint was added
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Split into (shared prefix, own suffix, other suffix) against `other`
    pub fn split_common(&self, other: &ConstraintSet) -> (ConstraintSet, Vec<Expr>, Vec<Expr>) {
        let common_len = self
            .constraints
            .iter()
            .zip(other.constraints.iter())
            .take_while(|(a, b)| a.ptr_eq(b) || a == b)
            .count();
        let common = ConstraintSet {
            constraints: self.constraints.take(common_len),
        };
        let mine = self.constraints.iter().skip(common_len).cloned().collect();
        let theirs = other.constraints.iter().skip(common_len).cloned().collect();
        (common, mine, theirs)
    }

    /// Rough footprint used by the memory cap
    pub fn approx_bytes(&self) -> usize {
        self.constraints.iter().map(|e| 16 + e.node_count() * 40).sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Symbolic Inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where and how a symbolic input was introduced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    /// Unique variable name
    pub name: Arc<str>,
    /// Name requested by the program
    pub label: String,
    /// Thread that created it
    pub thread: ThreadId,
    /// Instruction that created it
    pub location: Location,
}

/// Symbolic inputs of a state, shared with forks
#[derive(Debug, Clone, Default)]
pub struct SymbolicInputs {
    inputs: OrdMap<Arc<str>, Arc<InputDescriptor>>,
    next: u32,
}

impl SymbolicInputs {
    /// Register a new input, returning its variable
    pub fn fresh(&mut self, label: &str, thread: ThreadId, location: Location) -> Expr {
        let name: Arc<str> = Arc::from(format!("in_{label}_{}", self.next));
        self.next += 1;
        self.inputs.insert(
            name.clone(),
            Arc::new(InputDescriptor {
                name: name.clone(),
                label: label.to_string(),
                thread,
                location,
            }),
        );
        Expr::int_var(name)
    }

    /// Look up an input by variable name
    pub fn get(&self, name: &str) -> Option<&Arc<InputDescriptor>> {
        self.inputs.get(name)
    }

    /// All input variable names in order
    pub fn names(&self) -> Vec<Arc<str>> {
        self.inputs.keys().cloned().collect()
    }

    /// Whether both sets contain exactly the same inputs
    pub fn same_inputs(&self, other: &SymbolicInputs) -> bool {
        self.inputs.len() == other.inputs.len()
            && self.inputs.keys().zip(other.inputs.keys()).all(|(a, b)| a == b)
    }

    /// Number of inputs
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether there are no inputs
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::program::ProgramBuilder;
    use crate::domain::types::FunctionId;

    fn program() -> Program {
        let mut p = ProgramBuilder::new();
        p.global("x", 7);
        p.constant("limit", 3);
        let main = p.declare("main", 0);
        p.define(main, |f| f.ret(None));
        p.build(main).unwrap()
    }

    #[test]
    fn test_address_space_fork_isolation() {
        let program = program();
        let mut parent = AddressSpace::from_program(&program);
        let child = parent.clone();
        parent.write(GlobalId(0), Expr::int(8));

        assert_eq!(parent.read(GlobalId(0)).and_then(Expr::as_int), Some(8));
        assert_eq!(child.read(GlobalId(0)).and_then(Expr::as_int), Some(7));
        assert!(parent.written().contains(&GlobalId(0)));
        assert!(child.written().is_empty());
        assert!(parent.is_read_only(GlobalId(1)));
        assert!(!parent.contains(GlobalId(9)));
    }

    #[test]
    fn test_constraint_set_drops_true() {
        let mut cs = ConstraintSet::new();
        cs.add(Expr::tt());
        assert!(cs.is_empty());
        cs.add(Expr::lt(&Expr::int_var("a"), &Expr::int(3)));
        assert_eq!(cs.len(), 1);
        assert!(!cs.is_trivially_false());
        cs.add(Expr::ff());
        assert!(cs.is_trivially_false());
    }

    #[test]
    fn test_split_common() {
        let a = Expr::lt(&Expr::int_var("a"), &Expr::int(3));
        let b = Expr::gt(&Expr::int_var("b"), &Expr::int(0));
        let mut left = ConstraintSet::new();
        left.add(a.clone());
        let mut right = left.clone();
        left.add(b.clone());
        right.add(Expr::not(&b));

        let (common, mine, theirs) = left.split_common(&right);
        assert_eq!(common.len(), 1);
        assert_eq!(mine, vec![b.clone()]);
        assert_eq!(theirs, vec![Expr::not(&b)]);
    }

    #[test]
    fn test_inputs_are_unique() {
        let mut inputs = SymbolicInputs::default();
        let loc = Location::new(FunctionId(0), 0);
        let a = inputs.fresh("n", ThreadId(0), loc);
        let b = inputs.fresh("n", ThreadId(0), loc);
        assert_ne!(a, b);
        assert_eq!(inputs.len(), 2);
        let copy = inputs.clone();
        assert!(copy.same_inputs(&inputs));
        assert_eq!(inputs.get("in_n_0").map(|d| d.label.as_str()), Some("n"));
    }
}
