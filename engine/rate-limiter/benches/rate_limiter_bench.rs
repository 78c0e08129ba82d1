use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rate_limiter::{FixedWindowRateLimiter, RateLimiter, RateLimiterConfig};

fn bench_hot_key(c: &mut Criterion) {
    let limiter = FixedWindowRateLimiter::new(RateLimiterConfig::default());

    c.bench_function("try_acquire_hot_key", |b| {
        b.iter(|| {
            let admitted = limiter.try_acquire(black_box("chat:42"), black_box(u32::MAX), 60);
            black_box(admitted)
        })
    });
}

fn bench_many_keys(c: &mut Criterion) {
    let limiter = FixedWindowRateLimiter::new(RateLimiterConfig::default());
    let keys: Vec<String> = (0..1024).map(|i| format!("chat:{i}")).collect();
    let mut next = 0usize;

    c.bench_function("try_acquire_1024_keys", |b| {
        b.iter(|| {
            let key = &keys[next % keys.len()];
            next += 1;
            black_box(limiter.try_acquire(black_box(key), 30, 1))
        })
    });
}

fn bench_eviction_pressure(c: &mut Criterion) {
    let limiter = FixedWindowRateLimiter::new(RateLimiterConfig::with_max_keys(256));
    let mut next = 0u64;

    c.bench_function("try_acquire_bounded_churn", |b| {
        b.iter(|| {
            let key = format!("user:{next}");
            next += 1;
            black_box(limiter.try_acquire(&key, 1, 60))
        })
    });
}

criterion_group!(benches, bench_hot_key, bench_many_keys, bench_eviction_pressure);
criterion_main!(benches);
