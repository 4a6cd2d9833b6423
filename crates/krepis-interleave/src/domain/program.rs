//! Program Representation
//!
//! # Overview
//!
//! A small register-machine IR that plays the role of the instruction-stream
//! collaborator. Each [`Function`] is an instruction array addressed by a
//! program counter. The engine only ever asks for "the instruction at this
//! location", advances the counter, and pushes or pops frames.
//!
//! Shared memory is a flat set of named integer [`Global`]s. Synchronization
//! primitives are intercepted calls ([`SyncCall`]) named by a [`SyncKey`].
//!
//! # Example
//!
//! ```rust
//! use krepis_interleave::domain::program::{ComputeOp, Operand, ProgramBuilder};
//! use krepis_interleave::domain::types::SyncKey;
//!
//! let mut p = ProgramBuilder::new();
//! let counter = p.global("counter", 0);
//! let worker = p.declare("worker", 1);
//! let main = p.declare("main", 0);
//! let m = SyncKey(0x10);
//!
//! p.define(worker, |f| {
//!     f.lock(m);
//!     let v = f.load(counter);
//!     let v1 = f.compute(ComputeOp::Add, Operand::Reg(v), Operand::Const(1));
//!     f.store(counter, Operand::Reg(v1));
//!     f.unlock(m);
//!     f.ret(None);
//! });
//! p.define(main, |f| {
//!     let t = f.spawn(worker, Operand::Const(0));
//!     f.join(Operand::Reg(t));
//!     f.ret(None);
//! });
//! let program = p.build(main).unwrap();
//! assert_eq!(program.functions().len(), 2);
//! ```

use crate::domain::error::ProgramError;
use crate::domain::expr::{BinaryOp, CmpOp};
use crate::domain::types::{FunctionId, GlobalId, Location, SyncKey};
use std::collections::BTreeSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operands and Operators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Frame-local register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u16);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Immediate integer
    Const(i64),
    /// Register of the current frame
    Reg(Reg),
    /// Argument slot of the current frame
    Arg(u16),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "{v}"),
            Self::Reg(r) => write!(f, "{r}"),
            Self::Arg(i) => write!(f, "a{i}"),
        }
    }
}

/// Operation handled by the [`Evaluator`](crate::domain::evaluator::Evaluator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeOp {
    /// Integer arithmetic or bitwise operation
    Binary(BinaryOp),
    /// Integer comparison producing a boolean
    Compare(CmpOp),
    /// Logical conjunction of two truth values
    LogicalAnd,
    /// Logical disjunction of two truth values
    LogicalOr,
}

#[allow(non_upper_case_globals)]
impl ComputeOp {
    /// `+`
    pub const Add: Self = Self::Binary(BinaryOp::Add);
    /// `-`
    pub const Sub: Self = Self::Binary(BinaryOp::Sub);
    /// `*`
    pub const Mul: Self = Self::Binary(BinaryOp::Mul);
    /// `/`
    pub const Div: Self = Self::Binary(BinaryOp::Div);
    /// `%`
    pub const Rem: Self = Self::Binary(BinaryOp::Rem);
    /// `==`
    pub const Eq: Self = Self::Compare(CmpOp::Eq);
    /// `!=`
    pub const Ne: Self = Self::Compare(CmpOp::Ne);
    /// `<`
    pub const Lt: Self = Self::Compare(CmpOp::Lt);
    /// `<=`
    pub const Le: Self = Self::Compare(CmpOp::Le);
    /// `>`
    pub const Gt: Self = Self::Compare(CmpOp::Gt);
    /// `>=`
    pub const Ge: Self = Self::Compare(CmpOp::Ge);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Instructions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Intercepted synchronization call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCall {
    /// Spawn a thread running `entry(arg)`; the child id lands in `dst`
    ThreadCreate {
        /// Thread entry function (at most one parameter)
        entry: FunctionId,
        /// Argument passed to the entry function
        arg: Operand,
        /// Register receiving the child id
        dst: Option<Reg>,
    },
    /// Wait for a thread to terminate
    ThreadJoin {
        /// Operand holding the thread id
        thread: Operand,
    },
    /// Acquire a mutex
    MutexLock(SyncKey),
    /// Release a mutex
    MutexUnlock(SyncKey),
    /// Wait on a condition, releasing `mutex`
    CondWait {
        /// Condition variable
        cond: SyncKey,
        /// Associated mutex (must be held)
        mutex: SyncKey,
    },
    /// Wake one waiter
    CondSignal(SyncKey),
    /// Wake every waiter
    CondBroadcast(SyncKey),
    /// Configure a barrier for `count` participants
    BarrierInit {
        /// Barrier name
        barrier: SyncKey,
        /// Participants per release
        count: u32,
    },
    /// Arrive at a barrier
    BarrierWait(SyncKey),
}

impl SyncCall {
    /// Short mnemonic for logs
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::ThreadCreate { .. } => "thread_create",
            Self::ThreadJoin { .. } => "thread_join",
            Self::MutexLock(_) => "mutex_lock",
            Self::MutexUnlock(_) => "mutex_unlock",
            Self::CondWait { .. } => "cond_wait",
            Self::CondSignal(_) => "cond_signal",
            Self::CondBroadcast(_) => "cond_broadcast",
            Self::BarrierInit { .. } => "barrier_init",
            Self::BarrierWait(_) => "barrier_wait",
        }
    }
}

/// One instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `dst = src`
    Move {
        /// Destination register
        dst: Reg,
        /// Source operand
        src: Operand,
    },
    /// `dst = lhs op rhs`
    Compute {
        /// Destination register
        dst: Reg,
        /// Operation
        op: ComputeOp,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
    /// Read a shared global
    Load {
        /// Destination register
        dst: Reg,
        /// Global read
        global: GlobalId,
    },
    /// Write a shared global
    Store {
        /// Global written
        global: GlobalId,
        /// Value stored
        src: Operand,
    },
    /// Introduce a fresh symbolic input
    MakeSymbolic {
        /// Destination register
        dst: Reg,
        /// Input name (made unique per state)
        name: String,
    },
    /// Conditional branch on a non-zero / true operand
    Branch {
        /// Condition operand
        cond: Operand,
        /// Target when the condition holds
        then_pc: usize,
        /// Target otherwise
        else_pc: usize,
    },
    /// Unconditional jump
    Jump {
        /// Target pc
        target: usize,
    },
    /// Check a condition; failure is a runtime error
    Assert {
        /// Condition operand
        cond: Operand,
        /// Message reported on failure
        message: String,
    },
    /// Call a function
    Call {
        /// Callee
        function: FunctionId,
        /// Arguments
        args: Vec<Operand>,
        /// Register receiving the return value
        dst: Option<Reg>,
    },
    /// Return from the current frame
    Return {
        /// Returned value
        value: Option<Operand>,
    },
    /// Intercepted synchronization call
    Sync(SyncCall),
}

impl Instruction {
    fn registers(&self) -> Vec<Reg> {
        let (operands, dst): (Vec<&Operand>, Option<Reg>) = match self {
            Self::Move { dst, src } => (vec![src], Some(*dst)),
            Self::Compute { dst, lhs, rhs, .. } => (vec![lhs, rhs], Some(*dst)),
            Self::Load { dst, .. } | Self::MakeSymbolic { dst, .. } => (Vec::new(), Some(*dst)),
            Self::Store { src, .. } => (vec![src], None),
            Self::Branch { cond, .. } | Self::Assert { cond, .. } => (vec![cond], None),
            Self::Jump { .. } | Self::Return { value: None } => (Vec::new(), None),
            Self::Call { args, dst, .. } => (args.iter().collect(), *dst),
            Self::Return { value: Some(v) } => (vec![v], None),
            Self::Sync(SyncCall::ThreadCreate { arg, dst, .. }) => (vec![arg], *dst),
            Self::Sync(SyncCall::ThreadJoin { thread }) => (vec![thread], None),
            Self::Sync(_) => (Vec::new(), None),
        };
        operands
            .into_iter()
            .filter_map(|o| match o {
                Operand::Reg(r) => Some(*r),
                _ => None,
            })
            .chain(dst)
            .collect()
    }

    fn targets(&self) -> Vec<usize> {
        match self {
            Self::Branch { then_pc, else_pc, .. } => vec![*then_pc, *else_pc],
            Self::Jump { target } => vec![*target],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { dst, src } => write!(f, "{dst} = {src}"),
            Self::Compute { dst, op, lhs, rhs } => write!(f, "{dst} = {op:?} {lhs}, {rhs}"),
            Self::Load { dst, global } => write!(f, "{dst} = load {global}"),
            Self::Store { global, src } => write!(f, "store {global}, {src}"),
            Self::MakeSymbolic { dst, name } => write!(f, "{dst} = symbolic {name}"),
            Self::Branch { cond, then_pc, else_pc } => {
                write!(f, "br {cond}, {then_pc}, {else_pc}")
            }
            Self::Jump { target } => write!(f, "jmp {target}"),
            Self::Assert { cond, message } => write!(f, "assert {cond} \"{message}\""),
            Self::Call { function, args, .. } => write!(f, "call {function}({} args)", args.len()),
            Self::Return { value: Some(v) } => write!(f, "ret {v}"),
            Self::Return { value: None } => write!(f, "ret"),
            Self::Sync(call) => write!(f, "{}", call.mnemonic()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Functions, Globals, Programs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A function body
#[derive(Debug, Clone)]
pub struct Function {
    /// Function identity
    pub id: FunctionId,
    /// Human-readable name
    pub name: String,
    /// Declared parameter count
    pub params: usize,
    /// Register file size per frame
    pub registers: usize,
    /// Instruction array
    pub body: Vec<Instruction>,
}

/// A shared global variable
#[derive(Debug, Clone)]
pub struct Global {
    /// Global identity
    pub id: GlobalId,
    /// Name (used in trace dumps and encoder variable names)
    pub name: String,
    /// Initial value
    pub initial: i64,
    /// Stores are runtime errors
    pub read_only: bool,
}

/// A complete program
#[derive(Debug, Clone)]
pub struct Program {
    functions: Vec<Function>,
    globals: Vec<Global>,
    entry: FunctionId,
}

impl Program {
    /// Entry function of the initial thread
    pub fn entry(&self) -> FunctionId {
        self.entry
    }

    /// All functions
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// All globals
    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Look up a function
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.as_index())
    }

    /// Look up a global
    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.as_index())
    }

    /// Name of a global, or its id when unknown
    pub fn global_name(&self, id: GlobalId) -> String {
        self.global(id).map_or_else(|| id.to_string(), |g| g.name.clone())
    }

    /// Instruction at a location (`None` past the end of the body)
    pub fn instruction(&self, at: Location) -> Option<&Instruction> {
        self.function(at.function).and_then(|f| f.body.get(at.pc))
    }

    /// Name of a function, or its id when unknown
    pub fn function_name(&self, id: FunctionId) -> String {
        self.function(id).map_or_else(|| id.to_string(), |f| f.name.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Incremental program builder
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    functions: Vec<Option<Function>>,
    names: Vec<(String, usize)>,
    globals: Vec<Global>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a writable global
    pub fn global(&mut self, name: &str, initial: i64) -> GlobalId {
        self.push_global(name, initial, false)
    }

    /// Add a read-only global
    pub fn constant(&mut self, name: &str, value: i64) -> GlobalId {
        self.push_global(name, value, true)
    }

    fn push_global(&mut self, name: &str, initial: i64, read_only: bool) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            id,
            name: name.to_string(),
            initial,
            read_only,
        });
        id
    }

    /// Reserve a function id so bodies can reference each other
    pub fn declare(&mut self, name: &str, params: usize) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(None);
        self.names.push((name.to_string(), params));
        id
    }

    /// Give a declared function its body
    pub fn define(&mut self, id: FunctionId, body: impl FnOnce(&mut FunctionBuilder)) {
        let (name, params) = self.names[id.as_index()].clone();
        let mut fb = FunctionBuilder::new(params);
        body(&mut fb);
        self.functions[id.as_index()] = Some(fb.finish(id, name));
    }

    /// Validate and produce the program
    pub fn build(self, entry: FunctionId) -> Result<Program, ProgramError> {
        let mut seen = BTreeSet::new();
        for g in &self.globals {
            if !seen.insert(g.name.clone()) {
                return Err(ProgramError::DuplicateGlobal(g.name.clone()));
            }
        }

        let mut functions = Vec::with_capacity(self.functions.len());
        for (slot, (name, _)) in self.functions.into_iter().zip(&self.names) {
            let f = slot.ok_or_else(|| ProgramError::UndefinedFunction(name.clone()))?;
            validate_function(&f)?;
            functions.push(f);
        }
        if functions.get(entry.as_index()).is_none() {
            return Err(ProgramError::MissingEntry(entry));
        }

        Ok(Program {
            functions,
            globals: self.globals,
            entry,
        })
    }
}

fn validate_function(f: &Function) -> Result<(), ProgramError> {
    for (pc, instr) in f.body.iter().enumerate() {
        for target in instr.targets() {
            if target > f.body.len() {
                return Err(ProgramError::TargetOutOfRange {
                    function: f.name.clone(),
                    pc,
                    target,
                });
            }
        }
        for reg in instr.registers() {
            if usize::from(reg.0) >= f.registers {
                return Err(ProgramError::RegisterOutOfRange {
                    function: f.name.clone(),
                    pc,
                    register: reg.0,
                });
            }
        }
    }
    Ok(())
}

/// Builder for one function body
///
/// Registers are allocated on demand. Forward branches are emitted with a
/// placeholder target and patched once the target pc is known.
#[derive(Debug)]
pub struct FunctionBuilder {
    params: usize,
    next_reg: u16,
    body: Vec<Instruction>,
}

impl FunctionBuilder {
    fn new(params: usize) -> Self {
        Self {
            params,
            next_reg: 0,
            body: Vec::new(),
        }
    }

    fn finish(self, id: FunctionId, name: String) -> Function {
        Function {
            id,
            name,
            params: self.params,
            registers: usize::from(self.next_reg),
            body: self.body,
        }
    }

    /// Allocate a fresh register
    pub fn reg(&mut self) -> Reg {
        let r = Reg(self.next_reg);
        self.next_reg += 1;
        r
    }

    /// Current pc (the index the next instruction will get)
    pub fn here(&self) -> usize {
        self.body.len()
    }

    /// Emit a raw instruction and return its pc
    pub fn emit(&mut self, instr: Instruction) -> usize {
        self.body.push(instr);
        self.body.len() - 1
    }

    /// `r = value`
    pub fn constant(&mut self, value: i64) -> Reg {
        let dst = self.reg();
        self.emit(Instruction::Move {
            dst,
            src: Operand::Const(value),
        });
        dst
    }

    /// `dst = src` into an existing register
    pub fn assign(&mut self, dst: Reg, src: Operand) {
        self.emit(Instruction::Move { dst, src });
    }

    /// `r = lhs op rhs`
    pub fn compute(&mut self, op: ComputeOp, lhs: Operand, rhs: Operand) -> Reg {
        let dst = self.reg();
        self.emit(Instruction::Compute { dst, op, lhs, rhs });
        dst
    }

    /// `dst = lhs op rhs` into an existing register
    pub fn compute_into(&mut self, dst: Reg, op: ComputeOp, lhs: Operand, rhs: Operand) {
        self.emit(Instruction::Compute { dst, op, lhs, rhs });
    }

    /// `r = load global`
    pub fn load(&mut self, global: GlobalId) -> Reg {
        let dst = self.reg();
        self.emit(Instruction::Load { dst, global });
        dst
    }

    /// `store global, src`
    pub fn store(&mut self, global: GlobalId, src: Operand) {
        self.emit(Instruction::Store { global, src });
    }

    /// Fresh symbolic input
    pub fn symbolic(&mut self, name: &str) -> Reg {
        let dst = self.reg();
        self.emit(Instruction::MakeSymbolic {
            dst,
            name: name.to_string(),
        });
        dst
    }

    /// Branch with targets to be patched; returns its pc
    pub fn branch(&mut self, cond: Operand) -> usize {
        self.emit(Instruction::Branch {
            cond,
            then_pc: usize::MAX,
            else_pc: usize::MAX,
        })
    }

    /// Jump with a target to be patched; returns its pc
    pub fn jump(&mut self) -> usize {
        self.emit(Instruction::Jump { target: usize::MAX })
    }

    /// Jump to a known pc
    pub fn jump_to(&mut self, target: usize) {
        self.emit(Instruction::Jump { target });
    }

    /// Fill in the targets of a previously emitted branch
    pub fn patch_branch(&mut self, at: usize, then_pc: usize, else_pc: usize) {
        if let Some(Instruction::Branch {
            then_pc: t,
            else_pc: e,
            ..
        }) = self.body.get_mut(at)
        {
            *t = then_pc;
            *e = else_pc;
        }
    }

    /// Fill in the target of a previously emitted jump
    pub fn patch_jump(&mut self, at: usize, to: usize) {
        if let Some(Instruction::Jump { target }) = self.body.get_mut(at) {
            *target = to;
        }
    }

    /// `assert cond`
    pub fn assert(&mut self, cond: Operand, message: &str) {
        self.emit(Instruction::Assert {
            cond,
            message: message.to_string(),
        });
    }

    /// Call a function, optionally capturing its return value
    pub fn call(&mut self, function: FunctionId, args: Vec<Operand>, capture: bool) -> Option<Reg> {
        let dst = capture.then(|| self.reg());
        self.emit(Instruction::Call {
            function,
            args,
            dst,
        });
        dst
    }

    /// `ret [value]`
    pub fn ret(&mut self, value: Option<Operand>) {
        self.emit(Instruction::Return { value });
    }

    /// Any synchronization call
    pub fn sync(&mut self, call: SyncCall) -> usize {
        self.emit(Instruction::Sync(call))
    }

    /// `r = thread_create(entry, arg)`
    pub fn spawn(&mut self, entry: FunctionId, arg: Operand) -> Reg {
        let dst = self.reg();
        self.sync(SyncCall::ThreadCreate {
            entry,
            arg,
            dst: Some(dst),
        });
        dst
    }

    /// `thread_join(thread)`
    pub fn join(&mut self, thread: Operand) {
        self.sync(SyncCall::ThreadJoin { thread });
    }

    /// `mutex_lock(m)`
    pub fn lock(&mut self, mutex: SyncKey) {
        self.sync(SyncCall::MutexLock(mutex));
    }

    /// `mutex_unlock(m)`
    pub fn unlock(&mut self, mutex: SyncKey) {
        self.sync(SyncCall::MutexUnlock(mutex));
    }

    /// `cond_wait(c, m)`
    pub fn wait(&mut self, cond: SyncKey, mutex: SyncKey) {
        self.sync(SyncCall::CondWait { cond, mutex });
    }

    /// `cond_signal(c)`
    pub fn signal(&mut self, cond: SyncKey) {
        self.sync(SyncCall::CondSignal(cond));
    }

    /// `cond_broadcast(c)`
    pub fn broadcast(&mut self, cond: SyncKey) {
        self.sync(SyncCall::CondBroadcast(cond));
    }

    /// `barrier_init(b, count)`
    pub fn barrier_init(&mut self, barrier: SyncKey, count: u32) {
        self.sync(SyncCall::BarrierInit { barrier, count });
    }

    /// `barrier_wait(b)`
    pub fn barrier_wait(&mut self, barrier: SyncKey) {
        self.sync(SyncCall::BarrierWait(barrier));
    }
}
