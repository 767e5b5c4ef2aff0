//! Benchmarks for hosts section rendering and rewriting.

use blockd::hosts::{insert, remove, render, section_matches};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

/// Generate distinct domain names for benchmarking
fn generate_domains(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("site{}.example{}.com", i, i % 7)).collect()
}

/// A hosts file of `lines` unrelated entries
fn generate_hosts(lines: usize) -> String {
    let mut content = String::from("127.0.0.1 localhost\n::1 localhost\n");
    for i in 0..lines {
        content.push_str(&format!("10.0.{}.{} host{}.lan\n", i / 256 % 256, i % 256, i));
    }
    content
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for size in [10, 100, 1000] {
        let domains = generate_domains(size);
        group.bench_with_input(BenchmarkId::new("domains", size), &domains, |b, domains| {
            b.iter(|| render(black_box(domains)))
        });
    }

    group.finish();
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite");
    let section = render(&generate_domains(100));

    for lines in [10, 1000, 10000] {
        let base = generate_hosts(lines);
        let blocked = insert(&base, &section);

        group.bench_with_input(BenchmarkId::new("insert", lines), &base, |b, base| {
            b.iter(|| insert(black_box(base), black_box(&section)))
        });
        group.bench_with_input(BenchmarkId::new("remove", lines), &blocked, |b, blocked| {
            b.iter(|| remove(black_box(blocked)))
        });
        group.bench_with_input(BenchmarkId::new("matches", lines), &blocked, |b, blocked| {
            b.iter(|| section_matches(black_box(blocked), black_box(&section)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render, bench_rewrite);
criterion_main!(benches);
