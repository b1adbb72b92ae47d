//! Resolver hot-path benchmarks.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use sable::{Call, Environment, Type};

fn bench_operator_resolution(c: &mut Criterion) {
    let env = Environment::with_builtins();
    let plus = env.callable("+").unwrap();

    c.bench_function("resolve_plus_int_float", |b| {
        b.iter(|| {
            let mut call = Call::new();
            call.add_callable(plus);
            black_box(call.resolve(&[Type::integer(), Type::float()]))
        })
    });

    c.bench_function("resolve_plus_any_fallback", |b| {
        b.iter(|| {
            let mut call = Call::new();
            call.add_callable(plus);
            black_box(call.resolve(&[Type::string(), Type::int_array()]))
        })
    });
}

criterion_group!(benches, bench_operator_resolution);
criterion_main!(benches);
