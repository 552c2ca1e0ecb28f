//! Benchmarks for the per-request work done before a request reaches the backend

use api_bridge::classify::status_for_description;
use api_bridge::headers::{request_cookies, sanitize_request_headers};
use api_bridge::rewrite::rewrite_path;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hyper::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use http::uri::Authority;

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite");

    group.bench_function("matched_prefix", |b| {
        b.iter(|| {
            let rewrite = rewrite_path(black_box("/api/users/42/orders"), "/api/", "/v1/");
            black_box(rewrite);
        });
    });

    group.bench_function("unmatched_path", |b| {
        b.iter(|| {
            let rewrite = rewrite_path(black_box("/static/app.js"), "/api/", "/v1/");
            black_box(rewrite);
        });
    });

    group.finish();
}

fn sample_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
    headers.insert("x-forwarded-host", HeaderValue::from_static("public.example.com"));
    headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
    headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
    headers.insert(USER_AGENT, HeaderValue::from_static("bench/1.0"));
    headers.insert(COOKIE, HeaderValue::from_static("session=abc123; theme=dark; lang=en"));
    headers
}

fn bench_headers(c: &mut Criterion) {
    let mut group = c.benchmark_group("headers");
    let authority = Authority::from_static("backend.internal:8443");

    group.bench_function("sanitize", |b| {
        b.iter(|| {
            let mut headers = sample_headers();
            sanitize_request_headers(&mut headers, &authority);
            black_box(headers);
        });
    });

    let headers = sample_headers();
    group.bench_function("request_cookies", |b| {
        b.iter(|| {
            black_box(request_cookies(black_box(&headers)));
        });
    });

    group.finish();
}

fn bench_classification(c: &mut Criterion) {
    c.bench_function("status_for_description", |b| {
        b.iter(|| {
            black_box(status_for_description(black_box(
                "error trying to connect: tcp connect error: Connection refused (os error 111)",
            )));
        });
    });
}

criterion_group!(benches, bench_rewrite, bench_headers, bench_classification);
criterion_main!(benches);
