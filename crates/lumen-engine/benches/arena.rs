// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Arena and emitter benchmarks
//!
//! Run with: `cargo bench -p lumen-engine arena`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lumen_engine::arena::{ArenaBuf, ArenaPool, FreeList};
use lumen_engine::ast::Program;
use lumen_engine::{CompileOptions, Compiler};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

/// Small allocations followed by a release back to the mark
fn allocate_release_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_allocate");
    let free = Arc::new(FreeList::new());

    for size in [16usize, 64, 512].iter() {
        group.bench_with_input(BenchmarkId::new("bytes", size), size, |b, &size| {
            let mut pool = ArenaPool::with_free_list("bench", 1024, 0, free.clone());
            b.iter(|| {
                let mark = pool.mark();
                for _ in 0..100 {
                    black_box(pool.allocate(size).ok());
                }
                pool.release(mark);
            });
        });
    }

    group.finish();
}

/// Growing a buffer one byte at a time, the way bytecode is emitted
fn buffer_growth_benchmark(c: &mut Criterion) {
    let free = Arc::new(FreeList::new());
    c.bench_function("arena_buf_push_4096", |b| {
        b.iter(|| {
            let mut pool = ArenaPool::with_free_list("code", 1024, 0, free.clone());
            let mut buf = ArenaBuf::new(256);
            for i in 0..4096u32 {
                let _ = buf.push(&mut pool, i as u8);
            }
            black_box(buf.len());
            pool.free_pool();
        });
    });
}

/// Compiling a loop body of `n` calls
fn compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_loop");

    for n in [10usize, 100, 1000].iter() {
        let body: Vec<_> = (0..*n)
            .map(|i| {
                json!({
                    "type": "ExpressionStatement",
                    "expression": {
                        "type": "CallExpression",
                        "callee": { "type": "Identifier", "name": "f" },
                        "arguments": [{ "type": "NumericLiteral", "value": i as f64 }]
                    }
                })
            })
            .collect();
        let program: Program = serde_json::from_value(json!({ "body": [{
            "type": "WhileStatement",
            "test": { "type": "Identifier", "name": "x" },
            "body": { "type": "BlockStatement", "body": body }
        }] }))
        .expect("valid AST");

        group.bench_with_input(BenchmarkId::new("statements", n), &program, |b, program| {
            b.iter(|| {
                let compiled = Compiler::new(CompileOptions::default()).compile(program);
                black_box(compiled.map(|c| c.script.code.len()).ok())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, allocate_release_benchmark, buffer_growth_benchmark, compile_benchmark);
criterion_main!(benches);
