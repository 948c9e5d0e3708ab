//! Compilation and execution benchmarks.
//!
//! Run with: cargo bench -p kestrel-engine

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use kestrel_engine::ast::builder::*;
use kestrel_engine::ast::{BinaryOperator as B, Program};
use kestrel_engine::{Engine, Value};

/// function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
fn fib(n: f64) -> Program {
    program(vec![
        function_decl(
            "fib",
            &["n"],
            vec![
                if_stmt(
                    binary(B::LessThan, ident("n"), num(2.0)),
                    return_stmt(Some(ident("n"))),
                    None,
                ),
                return_stmt(Some(binary(
                    B::Add,
                    call(ident("fib"), vec![binary(B::Subtract, ident("n"), num(1.0))]),
                    call(ident("fib"), vec![binary(B::Subtract, ident("n"), num(2.0))]),
                ))),
            ],
        ),
        expr_stmt(call(ident("fib"), vec![num(n)])),
    ])
}

/// Many small functions with captured variables, arrows and a class
/// hierarchy, to stress scope analysis rather than execution.
fn wide_program(functions: usize) -> Program {
    let mut body = Vec::with_capacity(functions + 2);
    for i in 0..functions {
        body.push(function_decl(
            &format!("f{i}"),
            &["a", "b"],
            vec![
                var("local", Some(binary(B::Add, ident("a"), ident("b")))),
                return_stmt(Some(arrow(&["c"], binary(B::Multiply, ident("local"), ident("c"))))),
            ],
        ));
    }
    body.push(class_decl(
        "Base",
        None,
        vec![method("m", &[], vec![return_stmt(Some(num(1.0)))])],
    ));
    body.push(class_decl(
        "Derived",
        Some(ident("Base")),
        vec![method(
            "m",
            &[],
            vec![return_stmt(Some(call(super_member("m"), vec![])))],
        )],
    ));
    program(body)
}

fn bench_compile(c: &mut Criterion) {
    let engine = Engine::new();
    let program = wide_program(200);
    c.bench_function("compile_wide_program", |b| {
        b.iter(|| engine.compile(black_box(&program)).map(|script| script.byte_code.len()))
    });
}

fn bench_execute(c: &mut Criterion) {
    let program = fib(15.0);
    c.bench_function("run_fib_15", |b| {
        b.iter(|| {
            let mut engine = Engine::new();
            let result = engine.run(black_box(&program));
            assert_eq!(result.ok(), Some(Value::Number(610.0)));
        })
    });
}

criterion_group!(benches, bench_compile, bench_execute);
criterion_main!(benches);
