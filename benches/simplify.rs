//! Benchmarks for the fixed-point simplifier.
//!
//! Measures end-to-end simplification of synthetic obfuscated methods:
//! - A flattened state machine dispatching through a `switch` on a local
//! - A chain of opaque predicates over an unknown argument

extern crate dotflow;

use criterion::{criterion_group, criterion_main, Criterion};
use dotflow::prelude::*;
use std::hint::black_box;

/// Builds a flattened method with `states` cases, each moving to the next state.
///
/// ```text
/// state = 0
/// loop: switch (state) { case i: state = i + 1; goto loop; ... }
/// return
/// ```
fn flattened_method(states: usize) -> MethodDesc {
    let states_i32 = i32::try_from(states).unwrap();
    let mut code = vec![Instruction::ldc_i4(0), Instruction::stloc(0)];
    let dispatcher = code.len();
    let first_case = dispatcher + 3;
    code.push(Instruction::ldloc(0));
    code.push(Instruction::switch((0..states).map(|i| first_case + i * 3).collect()));
    code.push(Instruction::simple(OpCode::Ret));
    for state in 1..=states_i32 {
        code.push(Instruction::ldc_i4(state));
        code.push(Instruction::stloc(0));
        code.push(Instruction::br(dispatcher));
    }

    MethodDesc::new(
        Token::new(0x0600_0001),
        "Flattened",
        Token::new(0x0200_0002),
        MethodSignature::new_static(vec![], ElementType::Void),
    )
    .with_locals(vec![ElementType::I4])
    .with_init_locals(true)
    .with_body(MethodBody::new(code))
}

/// Builds a method guarded by `count` opaque predicates of the form `(x << 1) & 1`.
fn opaque_method(count: usize) -> MethodDesc {
    let mut code = Vec::new();
    for _ in 0..count {
        let next = code.len() + 8;
        code.push(Instruction::ldarg(0));
        code.push(Instruction::ldc_i4(1));
        code.push(Instruction::simple(OpCode::Shl));
        code.push(Instruction::ldc_i4(1));
        code.push(Instruction::simple(OpCode::And));
        code.push(Instruction::branch(OpCode::Brfalse, next));
        code.push(Instruction::ldc_i4(-1));
        code.push(Instruction::simple(OpCode::Ret));
    }
    code.push(Instruction::ldc_i4(0));
    code.push(Instruction::simple(OpCode::Ret));

    MethodDesc::new(
        Token::new(0x0600_0002),
        "Guarded",
        Token::new(0x0200_0002),
        MethodSignature::new_static(vec![ElementType::I4], ElementType::I4),
    )
    .with_body(MethodBody::new(code))
}

/// Benchmark unflattening a 16-state dispatcher.
fn bench_flattened_16(c: &mut Criterion) {
    let store = MetadataStore::new();
    let method = flattened_method(16);

    c.bench_function("simplify_flattened_16", |b| {
        b.iter(|| {
            let result = Simplifier::new(&store).simplify_method(black_box(&method)).unwrap();
            black_box(result)
        });
    });
}

/// Benchmark unflattening a 128-state dispatcher.
fn bench_flattened_128(c: &mut Criterion) {
    let store = MetadataStore::new();
    let method = flattened_method(128);

    c.bench_function("simplify_flattened_128", |b| {
        b.iter(|| {
            let result = Simplifier::new(&store).simplify_method(black_box(&method)).unwrap();
            black_box(result)
        });
    });
}

/// Benchmark removing a chain of 64 opaque predicates.
fn bench_opaque_64(c: &mut Criterion) {
    let store = MetadataStore::new();
    let method = opaque_method(64);

    c.bench_function("simplify_opaque_64", |b| {
        b.iter(|| {
            let result = Simplifier::new(&store).simplify_method(black_box(&method)).unwrap();
            black_box(result)
        });
    });
}

criterion_group!(benches, bench_flattened_16, bench_flattened_128, bench_opaque_64);
criterion_main!(benches);
