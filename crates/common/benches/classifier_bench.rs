//! Classification benchmarks
//!
//! Classification runs once per failed call, so it should stay cheap next to
//! the network round trip. These cover the body-parsing paths.
//!
//! Run with: `cargo bench --bench classifier_bench -p apiguard-common --features
//! apiguard-common/foundation`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use apiguard_common::error::classifier::parse_retry_after_ms;
use apiguard_common::{classify_exception, classify_response, ExceptionHint};

fn bench_classify_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_response");
    let headers: Vec<(String, String)> = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Retry-After".to_string(), "2".to_string()),
        ("X-Request-Id".to_string(), "req-123".to_string()),
    ];

    let bodies = [
        ("empty", ""),
        ("text", "upstream connect error or disconnect/reset before headers"),
        ("json", r#"{"code":"rate_limited","message":"Too many requests","retry":true}"#),
    ];

    for (name, body) in bodies {
        group.bench_with_input(BenchmarkId::new("429", name), &body, |b, body| {
            b.iter(|| classify_response(429, black_box("Too Many Requests"), black_box(body), &headers));
        });
    }

    group.bench_function("401_refined", |b| {
        b.iter(|| {
            classify_response(401, "Unauthorized", black_box(r#"{"code":"token_expired"}"#), &headers)
        });
    });

    group.finish();
}

fn bench_classify_exception(c: &mut Criterion) {
    c.bench_function("classify_exception_network", |b| {
        b.iter(|| classify_exception(black_box("connection refused"), ExceptionHint::Network));
    });
}

fn bench_parse_retry_after(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_retry_after");

    group.bench_function("seconds", |b| b.iter(|| parse_retry_after_ms(black_box("1.5"))));
    group.bench_function("http_date", |b| {
        b.iter(|| parse_retry_after_ms(black_box("Wed, 21 Oct 2015 07:28:00 GMT")));
    });

    group.finish();
}

criterion_group!(benches, bench_classify_response, bench_classify_exception, bench_parse_retry_after);
criterion_main!(benches);
