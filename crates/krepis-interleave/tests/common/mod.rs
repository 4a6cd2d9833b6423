//! Programs shared by the integration scenarios

#![allow(dead_code)]

use krepis_interleave::domain::expr::BinaryOp;
use krepis_interleave::domain::program::{ComputeOp, Operand, Program, ProgramBuilder};
use krepis_interleave::domain::types::SyncKey;
use krepis_interleave::{Engine, EngineConfig, ExplorationReport, SchedulerKind};

pub const M: SyncKey = SyncKey(0x10);
pub const C: SyncKey = SyncKey(0x20);
pub const B: SyncKey = SyncKey(0x30);

/// Every base scheduling policy
pub const SCHEDULERS: [SchedulerKind; 2] = [SchedulerKind::ArrivalOrder, SchedulerKind::Preemptive];

/// Explore `program` to the end under `scheduler`
pub fn explore(program: Program, scheduler: SchedulerKind) -> (Engine, ExplorationReport) {
    let config = EngineConfig {
        scheduler,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(program, config).unwrap();
    let report = engine.explore().unwrap();
    (engine, report)
}

/// `threads` workers each add 1 to `x` `increments` times; main joins them
/// and asserts the total
pub fn counter(threads: usize, increments: usize, locked: bool) -> Program {
    let mut p = ProgramBuilder::new();
    let x = p.global("x", 0);
    let main = p.declare("main", 0);
    let worker = p.declare("worker", 0);
    p.define(worker, |f| {
        for _ in 0..increments {
            if locked {
                f.lock(M);
            }
            let v = f.load(x);
            let n = f.compute(ComputeOp::Add, Operand::Reg(v), Operand::Const(1));
            f.store(x, Operand::Reg(n));
            if locked {
                f.unlock(M);
            }
        }
        f.ret(None);
    });
    let expected = i64::try_from(threads * increments).unwrap();
    p.define(main, |f| {
        let workers: Vec<_> = (0..threads).map(|_| f.spawn(worker, Operand::Const(0))).collect();
        for w in workers {
            f.join(Operand::Reg(w));
        }
        let v = f.load(x);
        let ok = f.compute(ComputeOp::Eq, Operand::Reg(v), Operand::Const(expected));
        f.assert(Operand::Reg(ok), "counter total");
        f.ret(None);
    });
    p.build(main).unwrap()
}

/// The child signals before main waits; the signal is lost
pub fn signal_then_wait() -> Program {
    let mut p = ProgramBuilder::new();
    let main = p.declare("main", 0);
    let signaller = p.declare("signaller", 0);
    p.define(signaller, |f| {
        f.lock(M);
        f.signal(C);
        f.unlock(M);
        f.ret(None);
    });
    p.define(main, |f| {
        let t = f.spawn(signaller, Operand::Const(0));
        f.join(Operand::Reg(t));
        f.lock(M);
        f.wait(C, M);
        f.unlock(M);
        f.ret(None);
    });
    p.build(main).unwrap()
}

/// main spawns `count` workers that return immediately
pub fn spawner(count: usize) -> Program {
    let mut p = ProgramBuilder::new();
    let main = p.declare("main", 0);
    let worker = p.declare("worker", 0);
    p.define(worker, |f| f.ret(None));
    p.define(main, |f| {
        for _ in 0..count {
            f.spawn(worker, Operand::Const(0));
        }
        f.ret(None);
    });
    p.build(main).unwrap()
}

/// main and `workers` threads meet at a barrier sized for all of them
pub fn barrier(workers: u32) -> Program {
    let mut p = ProgramBuilder::new();
    let main = p.declare("main", 0);
    let worker = p.declare("worker", 0);
    p.define(worker, |f| {
        f.barrier_wait(B);
        f.ret(None);
    });
    p.define(main, |f| {
        f.barrier_init(B, workers + 1);
        let spawned: Vec<_> = (0..workers).map(|_| f.spawn(worker, Operand::Const(0))).collect();
        f.barrier_wait(B);
        for t in spawned {
            f.join(Operand::Reg(t));
        }
        f.ret(None);
    });
    p.build(main).unwrap()
}

/// Branch on `op(n, rhs) == target` for a symbolic `n`, where a missing
/// `rhs` means `n` itself; each arm returns from its own location
pub fn input_branch(op: BinaryOp, rhs: Option<i64>, target: i64) -> Program {
    let mut p = ProgramBuilder::new();
    let main = p.declare("main", 0);
    p.define(main, |f| {
        let n = f.symbolic("n");
        let rhs = rhs.map_or(Operand::Reg(n), Operand::Const);
        let v = f.compute(ComputeOp::Binary(op), Operand::Reg(n), rhs);
        let c = f.compute(ComputeOp::Eq, Operand::Reg(v), Operand::Const(target));
        let br = f.branch(Operand::Reg(c));
        let then_pc = f.here();
        f.ret(None);
        let else_pc = f.here();
        f.ret(None);
        f.patch_branch(br, then_pc, else_pc);
    });
    p.build(main).unwrap()
}

/// A worker branches on the low bit of `x` while main stores 1 into it;
/// reading the initial 0 reaches a failing assertion
pub fn parity_race() -> Program {
    let mut p = ProgramBuilder::new();
    let x = p.global("x", 0);
    let main = p.declare("main", 0);
    let worker = p.declare("worker", 0);
    p.define(worker, |f| {
        let v = f.load(x);
        let bit = f.compute(ComputeOp::Binary(BinaryOp::BitAnd), Operand::Reg(v), Operand::Const(1));
        let odd = f.compute(ComputeOp::Eq, Operand::Reg(bit), Operand::Const(1));
        let br = f.branch(Operand::Reg(odd));
        let then_pc = f.here();
        f.ret(None);
        let else_pc = f.here();
        f.assert(Operand::Const(0), "worker saw an even value");
        f.ret(None);
        f.patch_branch(br, then_pc, else_pc);
    });
    p.define(main, |f| {
        let t = f.spawn(worker, Operand::Const(0));
        f.store(x, Operand::Const(1));
        f.join(Operand::Reg(t));
        f.ret(None);
    });
    p.build(main).unwrap()
}
