//! Encoder Benchmark Suite
//!
//! # Scenarios
//!
//! 1. **Encoding**: full constraint system of a counter trace
//!    - N workers x 2 increments, with and without the mutex
//!    - Measures index build, taint analysis and constraint generation
//!
//! 2. **Flip search**: every candidate branch of the same traces
//!    - Locked: every query is UNSAT
//!    - Racy: the final assertion is flippable
//!
//! 3. **Taint pruning**: racy flip search with pruning on and off

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use krepis_interleave::domain::encoder::TraceEncoder;
use krepis_interleave::domain::executor::{Executor, RetiredState};
use krepis_interleave::domain::program::{ComputeOp, Operand, Program, ProgramBuilder};
use krepis_interleave::domain::session::Session;
use krepis_interleave::domain::solver::SolverQuery;
use krepis_interleave::domain::types::SyncKey;
use krepis_interleave::{EngineConfig, Z3Solver};

// ============================================================================
// Helper Functions
// ============================================================================

fn counter(threads: usize, locked: bool) -> Program {
    let m = SyncKey(0x10);
    let mut p = ProgramBuilder::new();
    let x = p.global("x", 0);
    let main = p.declare("main", 0);
    let worker = p.declare("worker", 0);
    p.define(worker, |f| {
        for _ in 0..2 {
            if locked {
                f.lock(m);
            }
            let v = f.load(x);
            let n = f.compute(ComputeOp::Add, Operand::Reg(v), Operand::Const(1));
            f.store(x, Operand::Reg(n));
            if locked {
                f.unlock(m);
            }
        }
        f.ret(None);
    });
    let expected = i64::try_from(threads * 2).unwrap_or(i64::MAX);
    p.define(main, |f| {
        let spawned: Vec<_> = (0..threads).map(|_| f.spawn(worker, Operand::Const(0))).collect();
        for t in spawned {
            f.join(Operand::Reg(t));
        }
        let v = f.load(x);
        let ok = f.compute(ComputeOp::Eq, Operand::Reg(v), Operand::Const(expected));
        f.assert(Operand::Reg(ok), "total");
        f.ret(None);
    });
    p.build(main).unwrap()
}

/// Record the trace of one run
fn record(program: &Program) -> RetiredState {
    let session = Session::new(EngineConfig::default());
    let solver = Z3Solver::new();
    let mut outcome = Executor::new(program, &session, &solver).run(None).unwrap();
    outcome.retired.remove(0)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for threads in [2usize, 3, 4] {
        for locked in [true, false] {
            let program = counter(threads, locked);
            let state = record(&program);
            let id = format!("{}-{threads}", if locked { "locked" } else { "racy" });
            group.bench_with_input(BenchmarkId::from_parameter(id), &state, |b, state| {
                b.iter(|| {
                    let encoder = TraceEncoder::new(&program, &state.trace, &state.inputs, true);
                    black_box(encoder.encode(None))
                });
            });
        }
    }
    group.finish();
}

fn bench_flip_search(c: &mut Criterion) {
    let session = Session::new(EngineConfig::default());
    let solver = Z3Solver::new();
    let mut group = c.benchmark_group("flip_search");
    group.sample_size(20);
    for threads in [2usize, 3] {
        for locked in [true, false] {
            let program = counter(threads, locked);
            let state = record(&program);
            let id = format!("{}-{threads}", if locked { "locked" } else { "racy" });
            group.bench_with_input(BenchmarkId::from_parameter(id), &state, |b, state| {
                let encoder = TraceEncoder::new(&program, &state.trace, &state.inputs, true);
                let query = SolverQuery::new(&solver, &session);
                b.iter(|| black_box(encoder.search(&query, true)));
            });
        }
    }
    group.finish();
}

fn bench_taint_pruning(c: &mut Criterion) {
    let session = Session::new(EngineConfig::default());
    let solver = Z3Solver::new();
    let program = counter(3, false);
    let state = record(&program);
    let mut group = c.benchmark_group("taint_pruning");
    group.sample_size(20);
    for pruning in [true, false] {
        group.bench_with_input(BenchmarkId::from_parameter(pruning), &pruning, |b, &pruning| {
            let encoder = TraceEncoder::new(&program, &state.trace, &state.inputs, pruning);
            let query = SolverQuery::new(&solver, &session);
            b.iter(|| black_box(encoder.search(&query, true)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_flip_search, bench_taint_pruning);
criterion_main!(benches);
